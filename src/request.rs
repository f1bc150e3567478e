use std::fmt;

use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

pub const BODY_PRINT_LIMIT: usize = 10_000;

pub(crate) type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Specifies limitations on printing request bodies when reporting requests. For some consumers
/// the bodies may be too large to reasonably print and it may be desirable to limit them.
#[derive(Debug, Copy, Clone)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

/// An incoming request to the mock server, as sent by the consumer under test.
///
/// The body is read once when the request arrives; matching works on an immutable reference
/// to the decoded request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// All the values of a header, comma-joined, or `None` if the header is absent.
    pub fn header_value(&self, name: &str) -> Option<String> {
        let values = self
            .headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// The query parameter `key`: a string if it was given once, an array of strings if
    /// it was repeated, `None` if it is missing.
    pub fn query_value(&self, key: &str) -> Option<Value> {
        let mut values = self
            .url
            .query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| Value::String(v.into_owned()))
            .collect::<Vec<_>>();
        match values.len() {
            0 => None,
            1 => values.pop(),
            _ => Some(Value::Array(values)),
        }
    }

    /// The body as the matcher engine sees it.
    ///
    /// JSON bodies (judging by `Content-Type`) are parsed, anything else is read as a string.
    /// An empty body, or a JSON body that does not parse, is returned as such so that the
    /// mismatch shows up in the diagnostics.
    pub fn body_value(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        let is_json = self
            .header_value(http::header::CONTENT_TYPE.as_str())
            .map(|content_type| content_type.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if is_json {
            if let Ok(value) = self.body_json::<Value>() {
                return Some(value);
            }
        }
        Some(Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }

    pub(crate) async fn from_hyper(
        request: hyper::Request<hyper::body::Incoming>,
    ) -> Result<Request, DynError> {
        let (parts, body) = request.into_parts();
        let url: Url = match parts.uri.authority() {
            Some(_) => parts.uri.to_string(),
            None => format!("http://localhost{}", parts.uri),
        }
        .parse()?;

        let body = body.collect().await?.to_bytes();

        Ok(Self {
            url,
            method: parts.method,
            headers: parts.headers,
            body: body.to_vec(),
        })
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        writeln!(buffer, "{} {}", self.method, self.url)?;
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>();
            let values = values.join(",");
            writeln!(buffer, "{}: {}", name, values)?;
        }

        match body_print_limit {
            BodyPrintLimit::Limited(limit) if self.body.len() > limit => {
                // A code point cut in half by the limit is dropped, anything else invalid is binary.
                let end = match std::str::from_utf8(&self.body[..limit]) {
                    Ok(_) => limit,
                    Err(e) if e.error_len().is_none() => e.valid_up_to(),
                    Err(_) => 0,
                };
                if end == 0 {
                    writeln!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    )
                } else {
                    let truncated = String::from_utf8_lossy(&self.body[..end]);
                    writeln!(buffer, "{}", truncated)?;
                    writeln!(
                        buffer,
                        "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                        self.body.len(),
                        limit
                    )?;
                    writeln!(
                        buffer,
                        "Increase this limit by setting `PACTMOCK_BODY_PRINT_LIMIT`, or calling `ProviderBuilder::body_print_limit` when building your MockProvider"
                    )
                }
            }
            _ => {
                if let Ok(body) = std::str::from_utf8(&self.body) {
                    writeln!(buffer, "{}", body)
                } else {
                    writeln!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    )
                }
            }
        }
    }

    /// A one-line summary, e.g. `GET /clients?page=2`.
    pub(crate) fn summary(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{} {}?{}", self.method, self.url.path(), query),
            None => format!("{} {}", self.method, self.url.path()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::Unlimited)
    }
}
