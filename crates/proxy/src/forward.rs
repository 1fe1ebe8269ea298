// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forward proxy mode
//!
//! A single port accepting three shapes of traffic: absolute-URI plain-HTTP
//! requests (forwarded upstream with capture and injection), CONNECT
//! tunnels (bytes relayed, never inspected), and origin-form requests to
//! the proxy itself (PAC file and telemetry sink).

use crate::inject::{PAC_PATH, TELEMETRY_PATH};
use crate::server::{forward_exchange, telemetry_sink, ProxyInner};
use crate::ProxyError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) async fn serve(inner: Arc<ProxyInner>, port: u16) -> Result<(), ProxyError> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|source| ProxyError::Listen { port, source })?;

    let ctx = Arc::new(ForwardCtx { inner: Arc::clone(&inner), port });
    let app = Router::new().fallback(forward_handler).with_state(ctx);
    let cancel = inner.cancel_token();
    tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await });
        if let Err(e) = server.await {
            warn!(port, error = %e, "forward proxy server ended");
        }
    });
    Ok(())
}

struct ForwardCtx {
    inner: Arc<ProxyInner>,
    port: u16,
}

async fn forward_handler(
    State(ctx): State<Arc<ForwardCtx>>,
    req: Request<Body>,
) -> Response<Body> {
    if req.method() == Method::CONNECT {
        return tunnel(req).await;
    }

    // Absolute-form URI: a browser configured to use us as its proxy.
    if req.uri().scheme().is_some() {
        let upstream = req.uri().to_string();
        return forward_exchange(&ctx.inner, upstream, req).await;
    }

    // Origin-form: a request addressed to the proxy itself.
    let path = req.uri().path();
    if req.method() == Method::GET && path == PAC_PATH {
        return pac_response(ctx.port);
    }
    if req.method() == Method::POST && path == TELEMETRY_PATH {
        let origin = format!("http://127.0.0.1:{}", ctx.port);
        return telemetry_sink(&ctx.inner.ledger, &origin, req).await;
    }
    let mut resp = Response::new(Body::from("brummer forward proxy"));
    *resp.status_mut() = StatusCode::BAD_REQUEST;
    resp
}

/// CONNECT tunnel: upgrade the connection and relay bytes both ways.
/// HTTPS traffic is never inspected.
async fn tunnel(req: Request<Body>) -> Response<Body> {
    let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
        let mut resp = Response::new(Body::from("CONNECT requires authority"));
        *resp.status_mut() = StatusCode::BAD_REQUEST;
        return resp;
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let mut upgraded = hyper_util_io(upgraded);
                match tokio::net::TcpStream::connect(&authority).await {
                    Ok(mut upstream) => {
                        if let Err(e) =
                            tokio::io::copy_bidirectional(&mut upgraded, &mut upstream).await
                        {
                            debug!(%authority, error = %e, "tunnel closed");
                        }
                    }
                    Err(e) => warn!(%authority, error = %e, "tunnel connect failed"),
                }
            }
            Err(e) => warn!(error = %e, "connect upgrade failed"),
        }
    });

    Response::new(Body::empty())
}

/// Adapt hyper's upgraded connection to tokio I/O.
fn hyper_util_io(upgraded: hyper::upgrade::Upgraded) -> impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin {
    hyper_util::rt::TokioIo::new(upgraded)
}

fn pac_response(port: u16) -> Response<Body> {
    let pac = format!(
        "function FindProxyForURL(url, host) {{\n  if (host === 'localhost' || host === '127.0.0.1') {{\n    return 'PROXY 127.0.0.1:{port}';\n  }}\n  return 'DIRECT';\n}}\n"
    );
    let mut resp = Response::new(Body::from(pac));
    resp.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/x-ns-proxy-autoconfig"),
    );
    resp
}
