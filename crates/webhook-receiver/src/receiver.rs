// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use batcher::{BatcherHandle, EngineState, SubmitError};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ReceiverError;
use crate::http_utils::{
    create_json_response, create_text_response, log_and_create_http_response,
    verify_request_content_length, HttpResponse,
};
use crate::payload::Payload;

const LOG_ENDPOINT_PATH: &str = "/log";
const HEALTH_ENDPOINT_PATH: &str = "/healthz";

/// Binds the receiver's listening socket on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener, ReceiverError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ReceiverError::Bind { addr, source })
}

/// HTTP ingress in front of the batcher.
///
/// `POST /log` validates a [`Payload`] and submits it, `GET /healthz` reports the engine state.
#[derive(Clone)]
pub struct Receiver {
    handle: BatcherHandle<Payload>,
    max_content_length: usize,
}

impl Receiver {
    #[must_use]
    pub fn new(handle: BatcherHandle<Payload>, max_content_length: usize) -> Self {
        Receiver {
            handle,
            max_content_length,
        }
    }

    /// Serves requests from `listener` until `cancel_token` is cancelled.
    ///
    /// On cancellation the listener is dropped, idle connections are closed and in-flight
    /// requests are allowed to finish before this returns.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel_token: CancellationToken,
    ) -> Result<(), ReceiverError> {
        if let Ok(addr) = listener.local_addr() {
            info!("Receiver listening on {addr}");
        }

        let service = service_fn(move |req: Request<Incoming>| {
            let receiver = self.clone();
            async move { receiver.logged_handler(req).await }
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("Receiver shutdown requested");
                    break;
                }
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {e:?}");
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            let cancel_token = cancel_token.clone();
            joinset.spawn(async move {
                let connection = server.serve_connection(conn, service);
                tokio::pin!(connection);
                let result = tokio::select! {
                    result = connection.as_mut() => result,
                    () = cancel_token.cancelled() => {
                        connection.as_mut().graceful_shutdown();
                        connection.await
                    }
                };
                if let Err(e) = result {
                    error!("Connection error: {e}");
                }
            });
        }

        drop(listener);
        while joinset.join_next().await.is_some() {}
        info!("Receiver stopped");
        Ok(())
    }

    /// Routes the request and logs one line per request with its outcome.
    async fn logged_handler(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = self.endpoint_handler(req).await;

        match &response {
            Ok(res) => info!(
                "{method} {path} {} {:?}",
                res.status().as_u16(),
                start.elapsed()
            ),
            Err(e) => error!("{method} {path} failed to build response: {e}"),
        }
        response
    }

    async fn endpoint_handler(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, LOG_ENDPOINT_PATH) => self.log_handler(req).await,
            (&Method::GET, HEALTH_ENDPOINT_PATH) => self.health_handler(),
            _ => create_text_response("Not Found", StatusCode::NOT_FOUND),
        }
    }

    async fn log_handler(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        if let Some(response) = verify_request_content_length(
            req.headers(),
            self.max_content_length,
            "Error processing payload",
        ) {
            return response;
        }

        // Chunked bodies carry no Content-Length, so the limit is enforced while reading too
        let body = match Limited::new(req.into_body(), self.max_content_length)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_http_response(
                    "Error processing payload: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                );
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let payload: Payload = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Invalid payload: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        self.submit(payload)
    }

    /// Hands a validated payload to the batcher. Rejections are backpressure, not faults.
    fn submit(&self, payload: Payload) -> http::Result<HttpResponse> {
        let message = match self.handle.submit(payload) {
            Ok(()) => return create_text_response("", StatusCode::ACCEPTED),
            Err(SubmitError::QueueFull(_)) => "queue full",
            Err(SubmitError::Stopped(_)) => "batcher stopped",
        };
        warn!("Rejected payload: {message}");
        create_json_response(message, StatusCode::SERVICE_UNAVAILABLE)
    }

    fn health_handler(&self) -> http::Result<HttpResponse> {
        match self.handle.state() {
            EngineState::Running => create_text_response("OK", StatusCode::OK),
            state => create_text_response(state.to_string(), StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}
