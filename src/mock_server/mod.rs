//! All bits and pieces concerning the HTTP mock server are in this module.
//!
//! `server::MockServer` is the "front-end" to drive behaviour for the `hyper` HTTP
//! server running in the background, defined in the `hyper` sub-module.
//!
//! `MockServer` is not exposed directly: crate users only get to interact with
//! [`MockProvider`](crate::MockProvider), which owns exactly one `MockServer` between
//! `setup` and `finalize`.
mod hyper;
mod server;
mod state;

pub(crate) use server::MockServer;
pub(crate) use state::RequestRecording;
