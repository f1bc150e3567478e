use crate::provider::LifecycleState;
use crate::verification::VerificationReport;

/// Everything that can go wrong while driving a [`MockProvider`](crate::MockProvider).
///
/// A request that matches no interaction is not an error on the test side: the mock server
/// answers it with a diagnostic `500` and reports it again when [`verify`] is called.
///
/// [`verify`]: crate::MockProvider::verify
#[derive(Debug, thiserror::Error)]
pub enum PactError {
    #[error("{0}")]
    VerificationFailed(VerificationReport),
    #[error("`{operation}` cannot be called while the mock provider is {state}")]
    LifecycleMisuse {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("failed to start the mock server")]
    SetupFailure(#[source] std::io::Error),
    #[error("invalid interaction `{description}`: {reason}")]
    InvalidInteraction { description: String, reason: String },
    #[error("invalid matcher: {0}")]
    InvalidMatchSpec(String),
    #[error(
        "an interaction with provider state {state:?} and description `{description}` \
         but different content has already been registered"
    )]
    ConflictingInteraction {
        state: Option<String>,
        description: String,
    },
    #[error("failed to write the contract file")]
    ContractWrite(#[source] std::io::Error),
    #[error("failed to serialize the contract")]
    Serialization(#[from] serde_json::Error),
}
