//! `pactmock` is a consumer-driven contract-testing harness.
//!
//! A consumer declares the HTTP interactions it expects from a provider, runs its real client
//! code against a local mock provider that enforces those expectations, and verifies afterwards
//! that every declared interaction was invoked.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Matchers](#matchers)
//! 3. [Test isolation](#test-isolation)
//! 4. [Contracts](#contracts)
//!
//! ## Getting started
//! ```rust
//! use pactmock::{Interaction, MockProvider};
//! use serde_json::json;
//!
//! #[async_std::main]
//! async fn main() {
//!     // Start the mock provider on a random local port, once per suite.
//!     let mut provider = MockProvider::new("ClientsConsumer", "ClientsService");
//!     provider.setup().await.unwrap();
//!
//!     // Before the request under test: declare what the consumer will send and what
//!     // the provider answers.
//!     let interaction = Interaction::from_json(json!({
//!         "state": "I have a list of clients",
//!         "uponReceiving": "A request for all clients",
//!         "withRequest": { "method": "GET", "path": "/clients" },
//!         "willRespondWith": {
//!             "status": 200,
//!             "body": [{ "firstName": "Anakin", "lastName": "Skywalker", "id": 1 }]
//!         }
//!     }))
//!     .unwrap();
//!     provider.add_interaction(interaction).await.unwrap();
//!
//!     // Exercise the consumer against the mock provider.
//!     let status = reqwest::get(format!("{}/clients", provider.uri()))
//!         .await
//!         .unwrap()
//!         .status();
//!     assert_eq!(status.as_u16(), 200);
//!
//!     // After the request under test: every interaction must have been invoked.
//!     provider.verify().await.unwrap();
//!
//!     // Once the suite is over.
//!     provider.finalize().await.unwrap();
//! }
//! ```
//!
//! If a request matches no registered interaction the mock provider answers with a `500`
//! whose body explains, path by path, how the request diverged from the interactions
//! registered on the same route. The request is also reported by the next [`verify`].
//!
//! ## Matchers
//!
//! Bodies, headers and query parameters are [`MatchSpec`]s: literals must match exactly, while
//! matcher nodes only constrain the shape of the value. Check the [`matchers`] module for the
//! details.
//!
//! ## Test isolation
//!
//! A [`MockProvider`] owns exactly one mock server, from [`setup`] to [`finalize`]. Interactions
//! only live until the next [`verify`], which clears them whether it succeeds or not: an
//! interaction registered in one test can never be used to answer a request of another.
//!
//! ## Contracts
//!
//! Interactions that pass verification are collected in a [`Contract`]. When a pact directory
//! is configured with [`ProviderBuilder::pact_dir`], [`finalize`] writes it as a Pact v2 JSON
//! file.
//!
//! [`setup`]: MockProvider::setup
//! [`verify`]: MockProvider::verify
//! [`finalize`]: MockProvider::finalize
mod contract;
mod error;
pub mod http;
mod interaction;
pub mod matchers;
mod mock_server;
mod provider;
mod registry;
mod request;
mod verification;

pub use contract::Contract;
pub use error::PactError;
pub use interaction::{Interaction, RequestSpec, ResponseSpec};
pub use matchers::{MatchResult, MatchSpec, Mismatch, MismatchReason};
pub use provider::{LifecycleState, MockProvider, ProviderBuilder};
pub use registry::{InteractionHandle, InteractionRegistry};
pub use request::{BodyPrintLimit, Request};
pub use verification::{InteractionDiff, MissingInteraction, UnmatchedRequest, VerificationReport};
