use crate::provider::MockProvider;
use crate::request::{BodyPrintLimit, BODY_PRINT_LIMIT};
use std::env;
use std::net::TcpListener;
use std::path::PathBuf;

/// A builder providing a fluent API to assemble a [`MockProvider`] step-by-step.
/// Use [`MockProvider::builder`] to get started.
pub struct ProviderBuilder {
    config: ProviderConfig,
}

/// The settings a [`MockProvider`] is started with.
pub(crate) struct ProviderConfig {
    pub(crate) consumer: String,
    pub(crate) provider: String,
    pub(crate) listener: Option<TcpListener>,
    pub(crate) port: u16,
    pub(crate) pact_dir: Option<PathBuf>,
    pub(crate) record_incoming_requests: bool,
    pub(crate) body_print_limit: BodyPrintLimit,
}

impl ProviderBuilder {
    pub(super) fn new(consumer: String, provider: String) -> Self {
        let body_print_limit = match env::var("PACTMOCK_BODY_PRINT_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            Some(limit) => BodyPrintLimit::Limited(limit),
            None => BodyPrintLimit::Limited(BODY_PRINT_LIMIT),
        };
        Self {
            config: ProviderConfig {
                consumer,
                provider,
                listener: None,
                port: 0,
                pact_dir: None,
                record_incoming_requests: true,
                body_print_limit,
            },
        }
    }

    /// The mock server binds a random free port on `127.0.0.1` by default.
    /// With `ProviderBuilder::listener` you can choose to run it on a listener you have
    /// already bound.
    ///
    /// ### Example:
    /// ```rust
    /// use pactmock::MockProvider;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    ///     let expected_address = listener.local_addr().unwrap();
    ///     let mut provider = MockProvider::builder("ClientsConsumer", "ClientsService")
    ///         .listener(listener)
    ///         .build();
    ///
    ///     // Act
    ///     provider.setup().await.unwrap();
    ///
    ///     // Assert
    ///     assert_eq!(provider.address(), Some(expected_address));
    ///     provider.finalize().await.unwrap();
    /// }
    /// ```
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.config.listener = Some(listener);
        self
    }

    /// Bind `127.0.0.1:<port>` at setup instead of a random port.
    /// Ignored if a [`listener`](ProviderBuilder::listener) was provided.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Write the contract to `<dir>/<consumer>-<provider>.json` when the provider is finalized.
    pub fn pact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pact_dir = Some(dir.into());
        self
    }

    /// By default, the mock server records all incoming requests to display
    /// more meaningful error messages when verification fails.
    ///
    /// You can disable request recording using `ProviderBuilder::disable_request_recording`.
    pub fn disable_request_recording(mut self) -> Self {
        self.config.record_incoming_requests = false;
        self
    }

    /// The mock provider prints the requests it received when verification fails.
    /// By default, the size of the printed body is limited.
    ///
    /// The default can also be changed with the `PACTMOCK_BODY_PRINT_LIMIT` environment
    /// variable.
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.config.body_print_limit = limit;
        self
    }

    /// Finalise the builder. The mock server is not started until [`MockProvider::setup`].
    pub fn build(self) -> MockProvider {
        MockProvider::from_config(self.config)
    }
}
