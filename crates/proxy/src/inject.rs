// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry script injection and request classification

use brum_core::RequestKind;

/// Reserved path on every proxy port for telemetry posts from the injected
/// script, and the PAC file in forward mode.
pub const TELEMETRY_PATH: &str = "/__brummer__/telemetry";
pub const PAC_PATH: &str = "/__brummer__/proxy.pac";

/// The injected script. Checks a global sentinel before doing anything so a
/// double injection stays inert.
const TELEMETRY_SCRIPT: &str = r#"<script>(function(){
if (window.__brummerTelemetry) return;
window.__brummerTelemetry = { session: (crypto.randomUUID ? crypto.randomUUID() : String(Date.now())), events: [] };
var t = window.__brummerTelemetry;
function push(type, data) {
  t.events.push({ type: type, ts: Date.now(), data: data || {} });
}
window.addEventListener('error', function(e) {
  push('error', { message: e.message, source: e.filename, line: e.lineno });
});
window.addEventListener('load', function() {
  var nav = performance.getEntriesByType('navigation')[0];
  push('load', nav ? { duration: nav.duration } : {});
  flush();
});
function flush() {
  if (!t.events.length) return;
  var body = JSON.stringify({ session: t.session, events: t.events.splice(0) });
  if (navigator.sendBeacon) { navigator.sendBeacon('/__brummer__/telemetry', body); }
  else { fetch('/__brummer__/telemetry', { method: 'POST', body: body, keepalive: true }); }
}
window.addEventListener('pagehide', flush);
})();</script>"#;

/// Request-side facts needed by the injection rule.
#[derive(Debug, Default, Clone)]
pub struct RequestFacts {
    pub accept: Option<String>,
    pub x_requested_with: Option<String>,
    pub sec_fetch_mode: Option<String>,
}

/// Injection rule: only top-level HTML navigations get the script.
///
/// All must hold: the response Content-Type begins with `text/html`, the
/// request does not carry `X-Requested-With: XMLHttpRequest`, its
/// `Sec-Fetch-Mode` is absent or `navigate`, and its `Accept` includes
/// `text/html`.
pub fn should_inject(facts: &RequestFacts, response_content_type: Option<&str>) -> bool {
    let html_response = response_content_type
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);
    if !html_response {
        return false;
    }
    if facts
        .x_requested_with
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    {
        return false;
    }
    if facts
        .sec_fetch_mode
        .as_deref()
        .is_some_and(|v| !v.eq_ignore_ascii_case("navigate"))
    {
        return false;
    }
    facts
        .accept
        .as_deref()
        .is_some_and(|a| a.to_ascii_lowercase().contains("text/html"))
}

/// Insert the script before `</head>`, or right after `<body…>` when there
/// is no head, or prepend as a last resort. Exactly one tag per response.
pub fn inject_html(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    if let Some(pos) = lower.find("</head>") {
        let mut out = String::with_capacity(body.len() + TELEMETRY_SCRIPT.len());
        out.push_str(&body[..pos]);
        out.push_str(TELEMETRY_SCRIPT);
        out.push_str(&body[pos..]);
        return out;
    }
    if let Some(open) = lower.find("<body") {
        if let Some(end) = lower[open..].find('>') {
            let pos = open + end + 1;
            let mut out = String::with_capacity(body.len() + TELEMETRY_SCRIPT.len());
            out.push_str(&body[..pos]);
            out.push_str(TELEMETRY_SCRIPT);
            out.push_str(&body[pos..]);
            return out;
        }
    }
    format!("{TELEMETRY_SCRIPT}{body}")
}

/// Classify an exchange from Accept, method, and URL heuristics.
pub fn classify(method: &str, path: &str, accept: Option<&str>, requested_with: Option<&str>) -> RequestKind {
    let accept = accept.map(|a| a.to_ascii_lowercase()).unwrap_or_default();
    let lower_path = path.to_ascii_lowercase();

    const IMAGE_EXT: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".avif"];
    if accept.starts_with("image/") || IMAGE_EXT.iter().any(|e| lower_path.ends_with(e)) {
        return RequestKind::Image;
    }
    if requested_with.is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        || accept.contains("application/json")
        || lower_path.starts_with("/api/")
        || lower_path.contains("/graphql")
        || !matches!(method, "GET" | "HEAD")
    {
        return RequestKind::Api;
    }
    if accept.contains("text/html") {
        return RequestKind::Page;
    }
    RequestKind::Other
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
