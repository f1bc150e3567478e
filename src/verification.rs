use crate::matchers::Mismatch;
use crate::request::BodyPrintLimit;
use crate::Request;
use serde::Serialize;
use std::fmt;

/// An interaction that was registered but never invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInteraction {
    pub state: Option<String>,
    pub description: String,
}

/// How a request diverged from one of the interactions it could have been meant for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionDiff {
    pub description: String,
    #[serde(rename = "providerState", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub mismatches: Vec<Mismatch>,
}

/// A request that matched no registered, unsatisfied interaction.
///
/// The consumer received a `500` for it; it is kept around to fail the next verification.
#[derive(Debug, Clone)]
pub struct UnmatchedRequest {
    pub request: Request,
    /// Mismatches against the unsatisfied interactions sharing the request's method and path.
    pub diffs: Vec<InteractionDiff>,
}

/// The outcome of verifying the interactions of one test.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Interactions that were never invoked, in registration order.
    pub missing: Vec<MissingInteraction>,
    /// Requests that matched no interaction.
    pub unexpected: Vec<UnmatchedRequest>,
    /// Every request received during the test, if request recording is enabled.
    pub received_requests: Option<Vec<Request>>,
    pub(crate) body_print_limit: BodyPrintLimit,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Verifications failed:")?;
        for missing in &self.missing {
            match &missing.state {
                Some(state) => writeln!(
                    f,
                    "- Missing interaction: {} (given {})",
                    missing.description, state
                )?,
                None => writeln!(f, "- Missing interaction: {}", missing.description)?,
            }
        }
        for unexpected in &self.unexpected {
            writeln!(f, "- Unexpected request: {}", unexpected.request.summary())?;
            for diff in &unexpected.diffs {
                writeln!(f, "\tCompared with `{}`:", diff.description)?;
                for mismatch in &diff.mismatches {
                    writeln!(f, "\t\t{}", mismatch)?;
                }
            }
        }
        writeln!(f)?;

        match &self.received_requests {
            None => write!(
                f,
                "Enable request recording on the mock provider to get the list of incoming requests as part of the error message."
            ),
            Some(received_requests) if received_requests.is_empty() => {
                write!(f, "The server did not receive any request.")
            }
            Some(received_requests) => {
                writeln!(f, "Received requests:")?;
                for (index, request) in received_requests.iter().enumerate() {
                    writeln!(f, "- Request #{}", index + 1)?;
                    let mut printed = String::new();
                    request.print_with_limit(&mut printed, self.body_print_limit)?;
                    for line in printed.lines() {
                        writeln!(f, "\t{}", line)?;
                    }
                }
                Ok(())
            }
        }
    }
}
