// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy orchestration: port allocation, per-mapping servers, forwarding
//!
//! A single control task owns the mapping table. Registrations arrive on a
//! channel (from the bus handler or direct calls) so bus callbacks stay
//! synchronous and no lock is held across an accept or an upstream call.

use crate::capture::{origin_of, CaptureInput, RequestLedger};
use crate::forward;
use crate::inject::{classify, inject_html, should_inject, RequestFacts, TELEMETRY_PATH};
use crate::ProxyError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use axum::Router;
use brum_bus::EventBus;
use brum_core::{Config, Event, EventKind, ProcessId, ProxyMapping, ProxyRequest, RequestKind};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How far above the base port allocation scans before giving up.
const PORT_SCAN_RANGE: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// One loopback port per registered target origin.
    Reverse,
    /// A single shared port accepting absolute-URI requests and CONNECT.
    Forward,
}

pub(crate) enum Control {
    Register {
        target: String,
        label: Option<String>,
        process_id: ProcessId,
        reply: Option<oneshot::Sender<Result<u16, ProxyError>>>,
    },
    RemoveProcess(ProcessId),
}

pub(crate) struct ProxyInner {
    pub client: reqwest::Client,
    pub ledger: Arc<RequestLedger>,
    /// Written only by the control task.
    mappings: Mutex<Vec<ProxyMapping>>,
    servers: Mutex<HashMap<u16, CancellationToken>>,
    allocated: Mutex<HashSet<u16>>,
    base_port: u16,
    cancel: CancellationToken,
}

impl ProxyInner {
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Handle to a running proxy. Cloneable; the proxy stops when the root
/// cancellation token fires.
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<ProxyInner>,
    control: mpsc::UnboundedSender<Control>,
    mode: ProxyMode,
}

/// Constructor facade for both modes.
pub struct ProxyServer;

impl ProxyServer {
    /// Start the proxy and wire it to the bus: `url:detected` registers
    /// reverse mappings, `process:exited` removes them.
    pub async fn start(
        config: &Config,
        bus: EventBus,
        cancel: &CancellationToken,
    ) -> Result<ProxyHandle, ProxyError> {
        let mode = if config.proxy_forward_mode { ProxyMode::Forward } else { ProxyMode::Reverse };
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;

        let inner = Arc::new(ProxyInner {
            client,
            ledger: Arc::new(RequestLedger::new(config.proxy_ring_capacity, bus.clone())),
            mappings: Mutex::new(Vec::new()),
            servers: Mutex::new(HashMap::new()),
            allocated: Mutex::new(HashSet::new()),
            base_port: config.proxy_port,
            cancel: cancel.child_token(),
        });

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ProxyHandle { inner: Arc::clone(&inner), control: control_tx, mode };

        if mode == ProxyMode::Forward {
            forward::serve(Arc::clone(&inner), config.proxy_port).await?;
        }

        tokio::spawn(control_loop(Arc::clone(&inner), control_rx));

        // Reverse mode reacts to URLs observed in process output.
        if mode == ProxyMode::Reverse {
            let register = handle.clone();
            bus.subscribe(
                EventKind::UrlDetected,
                Arc::new(move |event| {
                    if let Event::UrlDetected { process_id, url, label } = event {
                        register.register_url(url, label.clone(), process_id.clone());
                    }
                }),
            );
        }
        let remover = handle.clone();
        bus.subscribe(
            EventKind::ProcessExited,
            Arc::new(move |event| {
                if let Event::ProcessExited { id, .. } = event {
                    let _ = remover.control.send(Control::RemoveProcess(id.clone()));
                }
            }),
        );

        Ok(handle)
    }
}

impl ProxyHandle {
    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    /// Queue a reverse registration (fire-and-forget, dedup by target).
    pub fn register_url(&self, target: &str, label: Option<String>, process_id: ProcessId) {
        if self.mode != ProxyMode::Reverse {
            return;
        }
        let _ = self.control.send(Control::Register {
            target: normalize_target(target),
            label,
            process_id,
            reply: None,
        });
    }

    /// Register and wait for the allocated port.
    pub async fn register_url_wait(
        &self,
        target: &str,
        label: Option<String>,
        process_id: ProcessId,
    ) -> Result<u16, ProxyError> {
        let (tx, rx) = oneshot::channel();
        let _ = self.control.send(Control::Register {
            target: normalize_target(target),
            label,
            process_id,
            reply: Some(tx),
        });
        rx.await
            .map_err(|_| ProxyError::InvalidTarget("proxy control task gone".to_string()))?
    }

    pub fn mappings(&self) -> Vec<ProxyMapping> {
        self.inner.mappings.lock().clone()
    }

    pub fn requests(&self) -> Vec<ProxyRequest> {
        self.inner.ledger.requests()
    }

    pub fn ledger(&self) -> Arc<RequestLedger> {
        Arc::clone(&self.inner.ledger)
    }
}

/// Strip a path from a detected URL; mappings are per-origin.
fn normalize_target(url: &str) -> String {
    origin_of(url).unwrap_or_else(|| url.trim_end_matches('/').to_string())
}

async fn control_loop(inner: Arc<ProxyInner>, mut rx: mpsc::UnboundedReceiver<Control>) {
    loop {
        let msg = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        match msg {
            Control::Register { target, label, process_id, reply } => {
                let result = register(&inner, target, label, process_id).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Control::RemoveProcess(process_id) => remove_process(&inner, &process_id),
        }
    }
    // Shutdown: stop every per-mapping server.
    for (_, token) in inner.servers.lock().drain() {
        token.cancel();
    }
}

async fn register(
    inner: &Arc<ProxyInner>,
    target: String,
    label: Option<String>,
    process_id: ProcessId,
) -> Result<u16, ProxyError> {
    if !target.starts_with("http://") && !target.starts_with("https://") {
        return Err(ProxyError::InvalidTarget(target));
    }
    // Same target keeps its port for the mapping's lifetime.
    if let Some(existing) = inner.mappings.lock().iter().find(|m| m.target_url == target) {
        return Ok(existing.port);
    }

    let (port, listener) = allocate_port(inner).await?;
    let ctx = Arc::new(RouteCtx {
        target: target.clone(),
        inner: Arc::clone(inner),
    });
    let app = Router::new().fallback(reverse_handler).with_state(ctx);
    let token = inner.cancel.child_token();
    let shutdown = token.clone();
    tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
        if let Err(e) = server.await {
            warn!(port, error = %e, "reverse proxy server ended");
        }
    });

    inner.servers.lock().insert(port, token);
    inner.mappings.lock().push(ProxyMapping {
        target_url: target.clone(),
        port,
        label,
        process_id,
    });
    info!(%target, port, "reverse mapping registered");
    Ok(port)
}

async fn allocate_port(
    inner: &ProxyInner,
) -> Result<(u16, tokio::net::TcpListener), ProxyError> {
    let base = inner.base_port;
    let end = base.saturating_add(PORT_SCAN_RANGE);
    for port in base..end {
        if inner.allocated.lock().contains(&port) {
            continue;
        }
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                inner.allocated.lock().insert(port);
                return Ok((port, listener));
            }
            Err(_) => continue,
        }
    }
    Err(ProxyError::NoFreePort { base, end })
}

fn remove_process(inner: &Arc<ProxyInner>, process_id: &ProcessId) {
    let removed: Vec<ProxyMapping> = {
        let mut mappings = inner.mappings.lock();
        let (gone, keep) = mappings.drain(..).partition(|m| m.process_id == *process_id);
        *mappings = keep;
        gone
    };
    for mapping in removed {
        if let Some(token) = inner.servers.lock().remove(&mapping.port) {
            token.cancel();
        }
        // Release is idempotent.
        inner.allocated.lock().remove(&mapping.port);
        debug!(target = %mapping.target_url, port = mapping.port, "reverse mapping removed");
    }
}

struct RouteCtx {
    target: String,
    inner: Arc<ProxyInner>,
}

async fn reverse_handler(
    State(ctx): State<Arc<RouteCtx>>,
    req: Request<Body>,
) -> Response<Body> {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    if req.method() == axum::http::Method::POST && req.uri().path() == TELEMETRY_PATH {
        return telemetry_sink(&ctx.inner.ledger, &ctx.target, req).await;
    }

    let upstream = format!("{}{}", ctx.target, path);
    forward_exchange(&ctx.inner, upstream, req).await
}

/// Accept a telemetry post from the injected script; 204 on success.
pub(crate) async fn telemetry_sink(
    ledger: &RequestLedger,
    origin: &str,
    req: Request<Body>,
) -> Response<Body> {
    let bytes = match axum::body::to_bytes(req.into_body(), 1 << 20).await {
        Ok(bytes) => bytes,
        Err(_) => return empty_status(StatusCode::BAD_REQUEST),
    };
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return empty_status(StatusCode::BAD_REQUEST);
    };
    if let Some(session) = payload.get("session").and_then(|s| s.as_str()) {
        ledger.correlate(origin, session);
    }
    empty_status(StatusCode::NO_CONTENT)
}

fn empty_status(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

/// Forward one exchange upstream, applying capture and injection.
/// Shared by the reverse handler and the forward-mode absolute-URI path.
pub(crate) async fn forward_exchange(
    inner: &Arc<ProxyInner>,
    upstream: String,
    req: Request<Body>,
) -> Response<Body> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();

    let facts = RequestFacts {
        accept: header_str(&parts.headers, header::ACCEPT),
        x_requested_with: header_str_named(&parts.headers, "x-requested-with"),
        sec_fetch_mode: header_str_named(&parts.headers, "sec-fetch-mode"),
    };
    let kind = classify(
        method.as_str(),
        parts.uri.path(),
        facts.accept.as_deref(),
        facts.x_requested_with.as_deref(),
    );
    let captured_headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let body_bytes = match axum::body::to_bytes(body, 64 << 20).await {
        Ok(bytes) => bytes,
        Err(_) => return empty_status(StatusCode::PAYLOAD_TOO_LARGE),
    };
    let request_size = body_bytes.len() as u64;

    let mut upstream_req = inner
        .client
        .request(method.clone(), &upstream)
        .body(body_bytes);
    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        upstream_req = upstream_req.header(name, value);
    }

    let resp = match upstream_req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            // Upstream failure: 502 to the browser, capture with Error kind.
            warn!(%upstream, error = %e, "upstream request failed");
            inner.ledger.record(CaptureInput {
                method: method.to_string(),
                url: upstream,
                status: 502,
                duration_ms: started.elapsed().as_millis() as u64,
                request_size,
                response_size: 0,
                headers: captured_headers,
                body_excerpt: Some(e.to_string()),
                kind: RequestKind::Error,
            });
            let mut out = Response::new(Body::from(format!("upstream error: {e}")));
            *out.status_mut() = StatusCode::BAD_GATEWAY;
            return out;
        }
    };

    let status = resp.status();
    let resp_headers = resp.headers().clone();
    let content_type = header_str(&resp_headers, header::CONTENT_TYPE);

    let mut builder = Response::builder().status(status);
    for (name, value) in resp_headers.iter() {
        if is_hop_by_hop(name.as_str()) || name == header::CONTENT_LENGTH {
            continue;
        }
        builder = builder.header(name, value);
    }

    let inject = should_inject(&facts, content_type.as_deref());
    let (out, response_size) = if inject {
        // HTML navigations are buffered so the script can land in <head>.
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(%upstream, error = %e, "upstream body read failed");
                String::new()
            }
        };
        let injected = inject_html(&text);
        let size = injected.len() as u64;
        (builder.body(Body::from(injected)), size)
    } else {
        // Everything else streams through without buffering.
        let size = resp.content_length().unwrap_or(0);
        (builder.body(Body::from_stream(resp.bytes_stream())), size)
    };

    inner.ledger.record(CaptureInput {
        method: method.to_string(),
        url: upstream,
        status: status.as_u16(),
        duration_ms: started.elapsed().as_millis() as u64,
        request_size,
        response_size,
        headers: captured_headers,
        body_excerpt: None,
        kind,
    });

    match out {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "response build failed");
            empty_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn header_str_named(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
