use crate::mock_server::hyper::run_server;
use crate::mock_server::state::{MockServerState, RequestRecording};
use crate::registry::InteractionHandle;
use crate::request::BodyPrintLimit;
use crate::verification::VerificationReport;
use crate::{Interaction, PactError, Request};
use log::debug;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::RwLock;

/// An HTTP web-server running in the background to behave as the provider, using the
/// registered [`Interaction`]s.
///
/// The server runs on its own thread, driven by a dedicated single-threaded tokio runtime:
/// tests can use whatever async runtime they like.
pub(crate) struct MockServer {
    state: Arc<RwLock<MockServerState>>,
    server_address: SocketAddr,
    // When `shutdown_trigger` gets dropped the listening server terminates gracefully.
    shutdown_trigger: Option<tokio::sync::oneshot::Sender<()>>,
    server_thread: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Start serving on an already bound `listener`.
    pub(crate) fn start(
        listener: TcpListener,
        recording: RequestRecording,
        body_print_limit: BodyPrintLimit,
    ) -> Result<Self, PactError> {
        let server_address = listener.local_addr().map_err(PactError::SetupFailure)?;
        listener
            .set_nonblocking(true)
            .map_err(PactError::SetupFailure)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(PactError::SetupFailure)?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener).map_err(PactError::SetupFailure)?
        };

        let state = Arc::new(RwLock::new(MockServerState::new(
            recording,
            body_print_limit,
        )));
        let (shutdown_trigger, shutdown_receiver) = tokio::sync::oneshot::channel();

        let server_state = state.clone();
        let server_thread = std::thread::Builder::new()
            .name(format!("pactmock-{}", server_address))
            .spawn(move || {
                runtime.block_on(run_server(listener, server_state, shutdown_receiver));
                // Dropping the runtime here cancels in-flight connections.
            })
            .map_err(PactError::SetupFailure)?;

        debug!("Mock server listening on {}", server_address);
        Ok(Self {
            state,
            server_address,
            shutdown_trigger: Some(shutdown_trigger),
            server_thread: Some(server_thread),
        })
    }

    pub(crate) async fn register(
        &self,
        interaction: Interaction,
    ) -> Result<InteractionHandle, PactError> {
        self.state.write().await.register(interaction)
    }

    pub(crate) async fn is_satisfied(&self, handle: InteractionHandle) -> Option<bool> {
        self.state.read().await.is_satisfied(handle)
    }

    pub(crate) async fn received_requests(&self) -> Option<Vec<Request>> {
        self.state.read().await.received_requests()
    }

    pub(crate) async fn verify_and_reset(&self) -> (VerificationReport, Vec<Interaction>) {
        self.state.write().await.verify_and_reset()
    }

    /// Return the base uri of this running instance of `MockServer`, e.g. `http://127.0.0.1:4372`.
    pub(crate) fn uri(&self) -> String {
        format!("http://{}", self.server_address)
    }

    pub(crate) fn address(&self) -> &SocketAddr {
        &self.server_address
    }

    /// Stop accepting connections and wait for the server thread to wind down.
    ///
    /// Requests still in flight are not waited for: their connections are dropped.
    pub(crate) fn shutdown(&mut self) {
        if let Some(shutdown_trigger) = self.shutdown_trigger.take() {
            debug!("Shutting down the mock server on {}", self.server_address);
            let _ = shutdown_trigger.send(());
        }
        if let Some(server_thread) = self.server_thread.take() {
            if server_thread.join().is_err() {
                debug!("The mock server thread panicked.");
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
