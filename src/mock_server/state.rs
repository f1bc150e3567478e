use crate::interaction::DEFAULT_JSON_CONTENT_TYPE;
use crate::registry::{InteractionHandle, InteractionRegistry};
use crate::request::BodyPrintLimit;
use crate::verification::{MissingInteraction, UnmatchedRequest, VerificationReport};
use crate::{Interaction, PactError, Request};
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use log::{debug, warn};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestRecording {
    Enabled,
    Disabled,
}

/// Everything the running server knows about the current test.
///
/// It is shared between the hyper request handler and the [`MockProvider`] behind a
/// single lock: matching a request and marking its interaction as satisfied happen in
/// one critical section.
///
/// [`MockProvider`]: crate::MockProvider
pub(super) struct MockServerState {
    registry: InteractionRegistry,
    received_requests: Option<Vec<Request>>,
    body_print_limit: BodyPrintLimit,
}

impl MockServerState {
    pub(super) fn new(recording: RequestRecording, body_print_limit: BodyPrintLimit) -> Self {
        let received_requests = match recording {
            RequestRecording::Enabled => Some(Vec::new()),
            RequestRecording::Disabled => None,
        };
        Self {
            registry: InteractionRegistry::new(),
            received_requests,
            body_print_limit,
        }
    }

    pub(super) fn handle_request(&mut self, request: Request) -> Response<Full<Bytes>> {
        debug!("Handling request: {}", request.summary());
        if let Some(received_requests) = &mut self.received_requests {
            received_requests.push(request.clone());
        }

        if let Some(interaction) = self.registry.find_match(&request) {
            debug!("Matched interaction: {}", interaction.label());
            return interaction.response.generate_response();
        }

        let unmatched = self.registry.record_unmatched(&request);
        warn!(
            "No interaction found for {} ({} candidate(s) on the same route)",
            unmatched.request.summary(),
            unmatched.diffs.len()
        );
        unmatched_response(unmatched)
    }

    pub(super) fn register(
        &mut self,
        interaction: Interaction,
    ) -> Result<InteractionHandle, PactError> {
        self.registry.add(interaction)
    }

    pub(super) fn is_satisfied(&self, handle: InteractionHandle) -> Option<bool> {
        self.registry.is_satisfied(handle)
    }

    pub(super) fn received_requests(&self) -> Option<Vec<Request>> {
        self.received_requests.clone()
    }

    /// Build the verification report for the current test, then start afresh.
    ///
    /// The satisfied interactions are handed back so that they can be added to the contract.
    pub(super) fn verify_and_reset(&mut self) -> (VerificationReport, Vec<Interaction>) {
        let report = VerificationReport {
            missing: self
                .registry
                .unsatisfied()
                .into_iter()
                .map(|interaction| MissingInteraction {
                    state: interaction.state.clone(),
                    description: interaction.description.clone(),
                })
                .collect(),
            unexpected: self.registry.unmatched_requests().to_vec(),
            received_requests: self.received_requests.clone(),
            body_print_limit: self.body_print_limit,
        };
        let satisfied = self
            .registry
            .satisfied()
            .into_iter()
            .cloned()
            .collect();
        self.reset();
        (report, satisfied)
    }

    pub(super) fn reset(&mut self) {
        self.registry.clear();
        if let Some(received_requests) = &mut self.received_requests {
            received_requests.clear();
        }
    }
}

/// The diagnostic returned to the consumer when nothing matched its request.
fn unmatched_response(unmatched: &UnmatchedRequest) -> Response<Full<Bytes>> {
    let body = json!({
        "message": format!("No interaction found for {}", unmatched.request.summary()),
        "interaction_diffs": unmatched.diffs,
    });
    let body = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static(DEFAULT_JSON_CONTENT_TYPE),
    );
    response
}
