//! The contract produced by a test suite: every interaction that was verified, in the
//! Pact v2 JSON format.
use crate::matchers::{key_path, MatchSpec};
use crate::{Interaction, PactError};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const PACT_SPECIFICATION_VERSION: &str = "2.0.0";

/// The verified interactions between a consumer and a provider.
#[derive(Debug, Clone)]
pub struct Contract {
    consumer: String,
    provider: String,
    interactions: Vec<Interaction>,
}

impl Contract {
    pub fn new(consumer: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            provider: provider.into(),
            interactions: Vec::new(),
        }
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Add the interactions verified by one test.
    ///
    /// Verifying the same interaction in several tests records it once. If any of them
    /// conflicts with a recorded interaction sharing its provider state and description,
    /// none of them is recorded.
    pub(crate) fn record_all(&mut self, interactions: Vec<Interaction>) -> Result<(), PactError> {
        if let Some(conflict) = interactions.iter().find(|i| self.conflicts_with(i)) {
            return Err(PactError::ConflictingInteraction {
                state: conflict.state.clone(),
                description: conflict.description.clone(),
            });
        }
        for interaction in interactions {
            if !self.interactions.contains(&interaction) {
                self.interactions.push(interaction);
            }
        }
        Ok(())
    }

    fn conflicts_with(&self, interaction: &Interaction) -> bool {
        self.interactions
            .iter()
            .any(|recorded| recorded.key() == interaction.key() && recorded != interaction)
    }

    /// e.g. `clientsconsumer-clientsservice.json`.
    pub fn file_name(&self) -> String {
        let slug = |name: &str| name.trim().to_lowercase().replace(char::is_whitespace, "-");
        format!("{}-{}.json", slug(&self.consumer), slug(&self.provider))
    }

    /// The pact document, with example values in place of matchers and the matchers
    /// themselves listed under `matchingRules`.
    pub fn to_json(&self) -> Value {
        let interactions: Vec<Value> = self.interactions.iter().map(interaction_to_json).collect();
        json!({
            "consumer": { "name": self.consumer },
            "provider": { "name": self.provider },
            "interactions": interactions,
            "metadata": {
                "pactSpecification": { "version": PACT_SPECIFICATION_VERSION }
            }
        })
    }

    /// Write the pact document into `dir`, creating it if needed, and return the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, PactError> {
        fs::create_dir_all(dir).map_err(PactError::ContractWrite)?;
        let path = dir.join(self.file_name());
        let document = serde_json::to_vec_pretty(&self.to_json())?;
        fs::write(&path, document).map_err(PactError::ContractWrite)?;
        Ok(path)
    }
}

fn interaction_to_json(interaction: &Interaction) -> Value {
    let mut document = Map::new();
    document.insert("description".into(), json!(interaction.description));
    if let Some(state) = &interaction.state {
        document.insert("providerState".into(), json!(state));
    }

    let request = &interaction.request;
    let mut request_json = Map::new();
    let mut request_rules = Map::new();
    request_json.insert("method".into(), json!(request.method.to_ascii_uppercase()));
    request_json.insert("path".into(), json!(request.path));
    if let Some(query) = &request.query {
        request_json.insert("query".into(), json!(query_string(query)));
        for (key, spec) in query {
            request_rules.extend(spec.matching_rules(&key_path("$.query", key)));
        }
    }
    if let Some(headers) = &request.headers {
        request_json.insert("headers".into(), resolve_map(headers));
        for (name, spec) in headers {
            request_rules.extend(spec.matching_rules(&key_path("$.headers", name)));
        }
    }
    if let Some(body) = &request.body {
        request_json.insert("body".into(), body.resolve());
        request_rules.extend(body.matching_rules("$.body"));
    }
    if !request_rules.is_empty() {
        request_json.insert("matchingRules".into(), Value::Object(request_rules));
    }
    document.insert("request".into(), Value::Object(request_json));

    let response = &interaction.response;
    let mut response_json = Map::new();
    let mut response_rules = Map::new();
    response_json.insert("status".into(), json!(response.status));
    if let Some(headers) = &response.headers {
        response_json.insert("headers".into(), resolve_map(headers));
        for (name, spec) in headers {
            response_rules.extend(spec.matching_rules(&key_path("$.headers", name)));
        }
    }
    if let Some(body) = &response.body {
        response_json.insert("body".into(), body.resolve());
        response_rules.extend(body.matching_rules("$.body"));
    }
    if !response_rules.is_empty() {
        response_json.insert("matchingRules".into(), Value::Object(response_rules));
    }
    document.insert("response".into(), Value::Object(response_json));

    Value::Object(document)
}

fn resolve_map(specs: &BTreeMap<String, MatchSpec>) -> Value {
    Value::Object(
        specs
            .iter()
            .map(|(key, spec)| (key.clone(), spec.resolve()))
            .collect(),
    )
}

/// Pact v2 stores the query as a url-encoded string.
fn query_string(query: &BTreeMap<String, MatchSpec>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, spec) in query {
        match spec.resolve() {
            Value::Array(values) => {
                for value in values.iter().filter_map(Value::as_str) {
                    serializer.append_pair(key, value);
                }
            }
            Value::String(value) => {
                serializer.append_pair(key, &value);
            }
            _ => {}
        }
    }
    serializer.finish()
}
