// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming HTTP transport for the instance tool server
//!
//! `POST /mcp` answers JSON (single or batch) or, when the client accepts
//! `text/event-stream`, streams the responses as SSE events. `GET /mcp`
//! opens the server-to-client stream carrying resource-update notifications
//! with periodic heartbeat comments. `DELETE /mcp` ends the session.

use crate::dispatch::ServerCore;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use brum_core::{ErrorKind, Event};
use brum_wire::{JsonRpcMessage, JsonRpcResponse, SESSION_HEADER};
use futures_util::stream::Stream;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from transport startup.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to bind tool server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// The instance tool server bound to a loopback port.
pub struct McpHttpServer {
    pub addr: SocketAddr,
}

impl McpHttpServer {
    /// Bind `127.0.0.1:<port>` and serve until the token fires.
    ///
    /// A bind failure is fatal for the caller (startup exit 1).
    pub async fn start(
        core: Arc<ServerCore>,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<Self, ServeError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| ServeError::Bind { port, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { port, source })?;

        let app = Router::new()
            .route("/mcp", get(get_stream).post(post_message).delete(delete_session))
            .with_state(core);

        let token = cancel.child_token();
        tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = server.await {
                warn!(error = %e, "tool server ended");
            }
        });

        info!(%addr, "tool server listening");
        Ok(Self { addr })
    }
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// `POST /mcp`: request/response (JSON) or request-initiated stream (SSE).
async fn post_message(
    State(core): State<Arc<ServerCore>>,
    req: Request<Body>,
) -> Response<Body> {
    let headers = req.headers().clone();
    let session_id = core.sessions.resolve(session_header(&headers));

    let bytes = match axum::body::to_bytes(req.into_body(), 8 << 20).await {
        Ok(bytes) => bytes,
        Err(_) => return status_only(StatusCode::PAYLOAD_TOO_LARGE),
    };
    let message: JsonRpcMessage = match serde_json::from_slice(&bytes) {
        Ok(message) => message,
        Err(e) => {
            let resp = JsonRpcResponse::error(
                None,
                ErrorKind::ProtocolError,
                format!("unparseable payload: {e}"),
            );
            return json_response(StatusCode::BAD_REQUEST, &session_id, &serde_json::json!(resp));
        }
    };

    let batch = message.is_batch();
    let requests = message.requests();

    if wants_sse(&headers) {
        // Stream each response as its own SSE message event.
        let (tx, rx) = tokio::sync::mpsc::channel::<JsonRpcResponse>(16);
        let stream_core = Arc::clone(&core);
        let stream_session = session_id.clone();
        tokio::spawn(async move {
            for request in requests {
                if let Some(resp) = stream_core.handle(&stream_session, request).await {
                    if tx.send(resp).await.is_err() {
                        return;
                    }
                }
            }
        });
        let stream = async_stream_from(rx);
        let sse = Sse::new(stream).keep_alive(
            KeepAlive::new().interval(Duration::from_secs(30)).text("ping"),
        );
        let mut resp = sse.into_response();
        attach_session(&mut resp, &session_id);
        return resp;
    }

    let mut responses = Vec::new();
    for request in requests {
        if let Some(resp) = core.handle(&session_id, request).await {
            responses.push(resp);
        }
    }
    let body = if batch {
        serde_json::json!(responses)
    } else if let Some(first) = responses.into_iter().next() {
        serde_json::json!(first)
    } else {
        // All notifications: acknowledge with no content.
        let mut resp = status_only(StatusCode::ACCEPTED);
        attach_session(&mut resp, &session_id);
        return resp;
    };
    json_response(StatusCode::OK, &session_id, &body)
}

/// `GET /mcp`: long-lived server-to-client SSE stream.
async fn get_stream(
    State(core): State<Arc<ServerCore>>,
    req: Request<Body>,
) -> Response<Body> {
    if !wants_sse(req.headers()) {
        return status_only(StatusCode::NOT_ACCEPTABLE);
    }
    let session_id = core.sessions.resolve(session_header(req.headers()));
    core.bus.publish(Event::McpConnected { session_id: session_id.clone() });

    let rx = core.sessions.attach_stream(&session_id);
    let stream = notification_stream(rx);
    let sse = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping"));
    let mut resp = sse.into_response();
    attach_session(&mut resp, &session_id);
    resp
}

/// `DELETE /mcp`: explicit session termination.
async fn delete_session(
    State(core): State<Arc<ServerCore>>,
    headers: HeaderMap,
) -> StatusCode {
    match session_header(&headers) {
        Some(id) if core.sessions.remove(id) => {
            core.bus.publish(Event::McpDisconnected { session_id: id.to_string() });
            StatusCode::NO_CONTENT
        }
        Some(_) => StatusCode::NOT_FOUND,
        None => StatusCode::BAD_REQUEST,
    }
}

fn notification_stream(
    mut rx: tokio::sync::mpsc::Receiver<brum_wire::JsonRpcRequest>,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    futures_util::stream::poll_fn(move |cx| {
        rx.poll_recv(cx).map(|opt| {
            opt.map(|note| {
                let data = serde_json::to_string(&note).unwrap_or_else(|_| "{}".to_string());
                Ok(SseEvent::default().event("message").data(data))
            })
        })
    })
}

fn async_stream_from(
    mut rx: tokio::sync::mpsc::Receiver<JsonRpcResponse>,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    futures_util::stream::poll_fn(move |cx| {
        rx.poll_recv(cx).map(|opt| {
            opt.map(|resp| {
                let data = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
                Ok(SseEvent::default().event("message").data(data))
            })
        })
    })
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

fn json_response(status: StatusCode, session_id: &str, body: &serde_json::Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/json"),
    );
    attach_session(&mut resp, session_id);
    resp
}

fn attach_session(resp: &mut Response<Body>, session_id: &str) {
    if let Ok(value) = axum::http::HeaderValue::from_str(session_id) {
        resp.headers_mut().insert(SESSION_HEADER, value);
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
