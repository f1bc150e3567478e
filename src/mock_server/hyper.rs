use crate::mock_server::state::MockServerState;
use http::{Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use log::debug;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The actual HTTP server responding to incoming requests according to the registered interactions.
pub(super) async fn run_server(
    listener: tokio::net::TcpListener,
    server_state: Arc<RwLock<MockServerState>>,
    mut shutdown_signal: tokio::sync::oneshot::Receiver<()>,
) {
    let request_handler = move |request: hyper::Request<hyper::body::Incoming>| {
        let server_state = server_state.clone();
        async move {
            let response = match crate::Request::from_hyper(request).await {
                // The write lock makes "find a match, mark it satisfied" a single step.
                Ok(request) => server_state.write().await.handle_request(request),
                Err(e) => {
                    debug!("Failed to read the incoming request: {}", e);
                    let mut response =
                        Response::new(Full::new(Bytes::from(format!("Malformed request: {}", e))));
                    *response.status_mut() = StatusCode::BAD_REQUEST;
                    response
                }
            };
            Ok::<_, Infallible>(response)
        }
    };

    loop {
        let (stream, _) = tokio::select! {
            biased;
            // Resolves when either:
            // - the sender half of the channel gets dropped (i.e. the MockServer is dropped)
            // - the sender is used, therefore sending a poison pill willingly as a shutdown signal
            _ = &mut shutdown_signal => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    debug!("Failed to accept a connection: {}", e);
                    continue;
                }
            },
        };
        let io = TokioIo::new(stream);
        let request_handler = request_handler.clone();
        tokio::task::spawn(async move {
            let server_builder = auto::Builder::new(TokioExecutor::new());
            if let Err(e) = server_builder
                .serve_connection(io, hyper::service::service_fn(request_handler))
                .await
            {
                debug!("Error serving connection: {}", e);
            }
        });
    }
    debug!("Mock server stopped accepting connections.");
}
