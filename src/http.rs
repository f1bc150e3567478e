//! Convenient re-exports of http types that are part of `pactmock`'s public API.
pub use http::{HeaderMap, HeaderName, HeaderValue, Method};
pub use url::Url;
