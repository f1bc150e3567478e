use crate::matchers::{key_path, MatchResult, MatchSpec, Mismatch, MismatchReason};
use crate::{PactError, Request};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// The content type used for bodies that do not declare one.
pub(crate) const DEFAULT_JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One expectation of the consumer: when the provider is in `state` and receives a request
/// matching `request`, it answers with `response`.
///
/// An `Interaction` is a plain data literal. It can be written as a Rust struct literal or
/// deserialized from the JSON declaration format with [`Interaction::from_json`]:
///
/// ```rust
/// use pactmock::Interaction;
/// use serde_json::json;
///
/// let interaction = Interaction::from_json(json!({
///     "state": "I have a list of clients",
///     "uponReceiving": "A request for all clients",
///     "withRequest": {
///         "method": "GET",
///         "path": "/clients",
///         "headers": { "Accept": "application/json, text/plain, */*" }
///     },
///     "willRespondWith": {
///         "status": 200,
///         "headers": { "Content-Type": "application/json; charset=utf-8" },
///         "body": [{ "rule": "like", "example": { "firstName": "Anakin", "id": 1 } }]
///     }
/// }))
/// .unwrap();
///
/// assert_eq!(interaction.description, "A request for all clients");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// The provider state this interaction assumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "uponReceiving")]
    pub description: String,
    #[serde(rename = "withRequest")]
    pub request: RequestSpec,
    #[serde(rename = "willRespondWith")]
    pub response: ResponseSpec,
}

/// What the consumer is expected to send. `method` and `path` must match exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, MatchSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, MatchSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MatchSpec>,
}

/// What the mock provider answers with. Matchers are resolved to their examples before
/// anything is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, MatchSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MatchSpec>,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            method: "GET".into(),
            path: "/".into(),
            headers: None,
            query: None,
            body: None,
        }
    }
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            status: 200,
            headers: None,
            body: None,
        }
    }
}

impl Interaction {
    /// Parse and validate an interaction written in the JSON declaration format.
    pub fn from_json(value: Value) -> Result<Self, PactError> {
        let description = value
            .get("uponReceiving")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_owned();
        let interaction: Interaction =
            serde_json::from_value(value).map_err(|e| PactError::InvalidInteraction {
                description,
                reason: e.to_string(),
            })?;
        interaction.validate()?;
        Ok(interaction)
    }

    /// Reject interactions the mock server could not honour.
    pub fn validate(&self) -> Result<(), PactError> {
        let invalid = |reason: String| PactError::InvalidInteraction {
            description: self.description.clone(),
            reason,
        };

        if self.description.trim().is_empty() {
            return Err(invalid("the description cannot be empty".into()));
        }
        let specs = self
            .request
            .headers
            .iter()
            .chain(&self.request.query)
            .chain(&self.response.headers)
            .flat_map(BTreeMap::values)
            .chain(&self.request.body)
            .chain(&self.response.body);
        for spec in specs {
            spec.check_bounds().map_err(|e| invalid(e.to_string()))?;
        }
        if Method::from_bytes(self.request.method.to_ascii_uppercase().as_bytes()).is_err() {
            return Err(invalid(format!(
                "`{}` is not a valid HTTP method",
                self.request.method
            )));
        }
        if !self.request.path.starts_with('/') {
            return Err(invalid(format!(
                "the path `{}` must start with `/`",
                self.request.path
            )));
        }
        for (name, spec) in self.request.headers.iter().flatten() {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(invalid(format!("`{}` is not a valid header name", name)));
            }
            if !spec.resolve().is_string() {
                return Err(invalid(format!("the `{}` request header must be a string", name)));
            }
        }
        for (key, spec) in self.request.query.iter().flatten() {
            let is_valid = match spec.resolve() {
                Value::String(_) => true,
                Value::Array(values) => values.iter().all(Value::is_string),
                _ => false,
            };
            if !is_valid {
                return Err(invalid(format!(
                    "the `{}` query parameter must be a string or a list of strings",
                    key
                )));
            }
        }
        if StatusCode::from_u16(self.response.status).is_err() {
            return Err(invalid(format!(
                "{} is not a valid status code",
                self.response.status
            )));
        }
        for (name, spec) in self.response.headers.iter().flatten() {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(invalid(format!("`{}` is not a valid header name", name)));
            }
            match spec.resolve() {
                Value::String(value) if HeaderValue::from_str(&value).is_ok() => {}
                other => {
                    return Err(invalid(format!(
                        "{} is not a valid value for the `{}` response header",
                        other, name
                    )))
                }
            }
        }
        Ok(())
    }

    /// `(state, description)` identifies an interaction within a test run.
    pub(crate) fn key(&self) -> (Option<&str>, &str) {
        (self.state.as_deref(), self.description.as_str())
    }

    /// e.g. `A request for all clients (given I have a list of clients)`.
    pub(crate) fn label(&self) -> String {
        match &self.state {
            Some(state) => format!("{} (given {})", self.description, state),
            None => self.description.clone(),
        }
    }
}

impl RequestSpec {
    /// Compare an incoming request against this spec.
    ///
    /// Every divergence is reported, including method and path, so that the result doubles
    /// as a diagnostic when nothing matched.
    pub fn match_request(&self, request: &Request) -> MatchResult {
        let mut result = MatchResult::default();

        if !self.method.eq_ignore_ascii_case(request.method.as_str()) {
            result.push(Mismatch::new(
                "$.method",
                Value::String(self.method.to_ascii_uppercase()),
                &Value::String(request.method.to_string()),
                MismatchReason::ValueMismatch,
            ));
        }
        if encoded_path(&self.path) != request.path() {
            result.push(Mismatch::new(
                "$.path",
                Value::String(self.path.clone()),
                &Value::String(request.path().to_owned()),
                MismatchReason::ValueMismatch,
            ));
        }

        for (key, spec) in self.query.iter().flatten() {
            let path = key_path("$.query", key);
            match request.query_value(key) {
                Some(actual) => result.merge(spec.matches(&actual, &path)),
                None => result.push(missing(&path, spec)),
            }
        }

        for (name, spec) in self.headers.iter().flatten() {
            let path = key_path("$.headers", name);
            match request.header_value(name) {
                Some(actual) => result.merge(match_header(spec, &actual, &path)),
                None => result.push(missing(&path, spec)),
            }
        }

        if let Some(spec) = &self.body {
            match request.body_value() {
                Some(actual) => result.merge(spec.matches(&actual, "$.body")),
                None => result.push(Mismatch::new(
                    "$.body",
                    spec.resolve(),
                    &Value::Null,
                    MismatchReason::MissingBody,
                )),
            }
        }

        result
    }

    pub(crate) fn same_route(&self, request: &Request) -> bool {
        self.method.eq_ignore_ascii_case(request.method.as_str())
            && encoded_path(&self.path) == request.path()
    }
}

/// The declared path percent-encoded the way incoming request paths are.
fn encoded_path(path: &str) -> String {
    match Url::parse("http://localhost/") {
        Ok(mut url) => {
            url.set_path(path);
            url.path().to_owned()
        }
        Err(_) => path.to_owned(),
    }
}

fn missing(path: &str, spec: &MatchSpec) -> Mismatch {
    Mismatch::new(path, spec.resolve(), &Value::Null, MismatchReason::MissingKey)
}

/// Literal header values are compared item by item, ignoring whitespace around commas.
fn match_header(spec: &MatchSpec, actual: &str, path: &str) -> MatchResult {
    match spec {
        MatchSpec::Literal(Value::String(expected)) => {
            fn normalize(value: &str) -> Vec<&str> {
                value.split(',').map(str::trim).collect()
            }
            let mut result = MatchResult::default();
            if normalize(expected) != normalize(actual) {
                result.push(Mismatch::new(
                    path,
                    Value::String(expected.clone()),
                    &Value::String(actual.to_owned()),
                    MismatchReason::ValueMismatch,
                ));
            }
            result
        }
        spec => spec.matches(&Value::String(actual.to_owned()), path),
    }
}

impl ResponseSpec {
    /// The body to transmit, with every matcher replaced by its example.
    pub fn resolved_body(&self) -> Option<Value> {
        self.body.as_ref().map(MatchSpec::resolve)
    }

    /// Generate the HTTP response for this spec.
    pub(crate) fn generate_response(&self) -> Response<Full<Bytes>> {
        let mut headers = HeaderMap::new();
        for (name, spec) in self.headers.iter().flatten() {
            let Value::String(value) = spec.resolve() else {
                continue;
            };
            // Both were checked when the interaction was registered.
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }

        let body = match self.resolved_body() {
            None => Vec::new(),
            Some(body) => {
                if !headers.contains_key(http::header::CONTENT_TYPE) {
                    headers.insert(
                        http::header::CONTENT_TYPE,
                        HeaderValue::from_static(DEFAULT_JSON_CONTENT_TYPE),
                    );
                }
                let is_json = headers
                    .get(http::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.to_ascii_lowercase().contains("json"))
                    .unwrap_or(false);
                match body {
                    Value::String(text) if !is_json => text.into_bytes(),
                    body => serde_json::to_vec(&body).unwrap_or_default(),
                }
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *response.headers_mut() = headers;
        response
    }
}
