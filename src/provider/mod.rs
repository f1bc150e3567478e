//! The lifecycle controller: one [`MockProvider`] per test suite.
mod builder;

pub use builder::ProviderBuilder;

use crate::contract::Contract;
use crate::mock_server::{MockServer, RequestRecording};
use crate::registry::InteractionHandle;
use crate::{Interaction, PactError, Request};
use builder::ProviderConfig;
use log::{debug, warn};
use std::fmt;
use std::net::{SocketAddr, TcpListener};

/// Where a [`MockProvider`] is in its lifecycle.
///
/// ```text
/// Uninitialized -> Running -> (per test: Registering -> Verified) -> Finalized
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// `setup` has not been called yet.
    Uninitialized,
    /// The mock server is listening and no interaction has been registered yet.
    Running,
    /// Interactions have been registered for the current test.
    Registering,
    /// The last test has been verified; the registry is empty.
    Verified,
    /// The mock server has been stopped. It cannot be started again.
    Finalized,
}

impl LifecycleState {
    fn is_running(self) -> bool {
        matches!(
            self,
            LifecycleState::Running | LifecycleState::Registering | LifecycleState::Verified
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Running => "running",
            LifecycleState::Registering => "registering",
            LifecycleState::Verified => "verified",
            LifecycleState::Finalized => "finalized",
        };
        f.write_str(state)
    }
}

/// A mock provider standing in for the real API during a consumer test suite.
///
/// Its four operations mirror the phases of a test suite:
/// - [`setup`] once, before all tests: starts the mock server on a local port;
/// - [`add_interaction`] before each request under test;
/// - [`verify`] after each test: fails if a registered interaction was never invoked or if
///   the consumer sent a request nothing matched. The registry is cleared either way;
/// - [`finalize`] once, after all tests: stops the server and writes the contract.
///
/// ### Example:
/// ```rust
/// use pactmock::{Interaction, MockProvider, RequestSpec, ResponseSpec};
/// use serde_json::json;
///
/// #[async_std::main]
/// async fn main() {
///     let mut provider = MockProvider::new("ClientsConsumer", "ClientsService");
///     provider.setup().await.unwrap();
///
///     provider
///         .add_interaction(Interaction {
///             state: Some("I have a list of clients".into()),
///             description: "A request for all clients".into(),
///             request: RequestSpec {
///                 method: "GET".into(),
///                 path: "/clients".into(),
///                 ..Default::default()
///             },
///             response: ResponseSpec {
///                 status: 200,
///                 body: Some(json!([{"firstName": "Anakin", "id": 1}]).into()),
///                 ..Default::default()
///             },
///         })
///         .await
///         .unwrap();
///
///     // The consumer under test talks to `provider.uri()`.
///     let body: serde_json::Value = reqwest::get(format!("{}/clients", provider.uri()))
///         .await
///         .unwrap()
///         .json()
///         .await
///         .unwrap();
///     assert_eq!(body[0]["id"], 1);
///
///     provider.verify().await.unwrap();
///     provider.finalize().await.unwrap();
/// }
/// ```
///
/// [`setup`]: MockProvider::setup
/// [`add_interaction`]: MockProvider::add_interaction
/// [`verify`]: MockProvider::verify
/// [`finalize`]: MockProvider::finalize
pub struct MockProvider {
    config: ProviderConfig,
    state: LifecycleState,
    server: Option<MockServer>,
    server_address: Option<SocketAddr>,
    contract: Contract,
}

impl MockProvider {
    /// A mock provider with the default configuration: random port, request recording
    /// enabled, no contract file.
    pub fn new(consumer: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::builder(consumer, provider).build()
    }

    /// Use `MockProvider::builder` to pick a port, a directory for the contract file, etc.
    pub fn builder(consumer: impl Into<String>, provider: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder::new(consumer.into(), provider.into())
    }

    pub(crate) fn from_config(config: ProviderConfig) -> Self {
        let contract = Contract::new(&config.consumer, &config.provider);
        Self {
            config,
            state: LifecycleState::Uninitialized,
            server: None,
            server_address: None,
            contract,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Start the mock server.
    ///
    /// Calling `setup` on a running provider does nothing. Calling it after [`finalize`]
    /// fails: a suite's mock server is never re-bound.
    ///
    /// [`finalize`]: MockProvider::finalize
    pub async fn setup(&mut self) -> Result<(), PactError> {
        match self.state {
            LifecycleState::Uninitialized => {}
            state if state.is_running() => {
                debug!("The mock provider is already running.");
                return Ok(());
            }
            state => return Err(misuse("setup", state)),
        }

        let listener = match self.config.listener.take() {
            Some(listener) => listener,
            None => TcpListener::bind(("127.0.0.1", self.config.port))
                .map_err(PactError::SetupFailure)?,
        };
        let recording = if self.config.record_incoming_requests {
            RequestRecording::Enabled
        } else {
            RequestRecording::Disabled
        };
        let server = MockServer::start(listener, recording, self.config.body_print_limit)?;

        debug!(
            "Mock provider `{}` for `{}` started on {}",
            self.config.provider,
            self.config.consumer,
            server.uri()
        );
        self.server_address = Some(*server.address());
        self.server = Some(server);
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Register an interaction the consumer is expected to invoke during the current test.
    pub async fn add_interaction(
        &mut self,
        interaction: Interaction,
    ) -> Result<InteractionHandle, PactError> {
        let server = self.running_server("add_interaction")?;
        let handle = server.register(interaction).await?;
        self.state = LifecycleState::Registering;
        Ok(handle)
    }

    /// Check that every interaction registered since the last verification was invoked,
    /// and that no request went unmatched.
    ///
    /// The registry is cleared whatever the outcome, so the next test starts clean.
    /// On success the verified interactions are added to the [`Contract`].
    pub async fn verify(&mut self) -> Result<(), PactError> {
        debug!("Verify interactions.");
        let server = self.running_server("verify")?;
        let (report, satisfied) = server.verify_and_reset().await;
        self.state = LifecycleState::Verified;

        if !report.is_success() {
            return Err(PactError::VerificationFailed(report));
        }
        self.contract.record_all(satisfied)
    }

    /// Stop the mock server and, if a pact directory was configured, write the contract.
    ///
    /// It is a no-op if the provider was never set up, and it can be called more than once.
    pub async fn finalize(&mut self) -> Result<(), PactError> {
        if !self.state.is_running() {
            debug!("Nothing to finalize: the mock provider is {}.", self.state);
            return Ok(());
        }

        if let Some(mut server) = self.server.take() {
            server.shutdown();
        }
        self.state = LifecycleState::Finalized;

        if let Some(pact_dir) = &self.config.pact_dir {
            if !self.contract.interactions().is_empty() {
                let path = self.contract.write_to(pact_dir)?;
                debug!("Contract written to {}", path.display());
            }
        }
        Ok(())
    }

    /// Whether the interaction behind `handle` has been invoked.
    ///
    /// `None` once the interaction has been cleared by [`verify`](MockProvider::verify), or
    /// if the provider is not running.
    pub async fn is_satisfied(&self, handle: InteractionHandle) -> Option<bool> {
        match &self.server {
            Some(server) => server.is_satisfied(handle).await,
            None => None,
        }
    }

    /// Return the base uri of the mock server, e.g. `http://127.0.0.1:4372`.
    ///
    /// ### Panics
    /// If the provider has never been set up.
    pub fn uri(&self) -> String {
        let address = self
            .server_address
            .expect("The mock provider has no address: call `setup` first.");
        format!("http://{}", address)
    }

    /// The socket address of the mock server, once it has been set up.
    pub fn address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// The requests received since the last verification.
    ///
    /// `None` if request recording has been disabled or the provider is not running.
    pub async fn received_requests(&self) -> Option<Vec<Request>> {
        match &self.server {
            Some(server) => server.received_requests().await,
            None => None,
        }
    }

    /// The interactions verified so far in this suite.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    fn running_server(&self, operation: &'static str) -> Result<&MockServer, PactError> {
        match &self.server {
            Some(server) if self.state.is_running() => Ok(server),
            _ => Err(misuse(operation, self.state)),
        }
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        if self.state != LifecycleState::Registering || std::thread::panicking() {
            return;
        }
        if let Some(server) = &self.server {
            let (report, _) = futures::executor::block_on(server.verify_and_reset());
            if !report.is_success() {
                warn!(
                    "The mock provider was dropped before its last test was verified.\n{}",
                    report
                );
            }
        }
    }
}

fn misuse(operation: &'static str, state: LifecycleState) -> PactError {
    PactError::LifecycleMisuse { operation, state }
}
