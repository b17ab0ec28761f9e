//! M-Lab Locate API client.
//!
//! The Locate API returns the nearest M-Lab servers with signed WebSocket
//! URLs for running ndt7 tests. With an explicit hostname configured, the
//! same shape of result is synthesized locally and no network I/O happens.

use std::collections::HashMap;

use serde::Deserialize;

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::params;
use crate::settings::Settings;
use crate::util::format_http_params;

/// A single candidate server.
///
/// `urls` maps canonical endpoint keys (e.g. `"wss:///ndt/v7/download"`) to
/// fully qualified URLs, preserving the Locate service's ordering between
/// candidates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Target {
    /// FQDN of the server machine, when known.
    #[serde(default)]
    pub machine: String,
    /// Map of endpoint key to full URL with access token.
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    #[serde(default)]
    results: Option<Vec<Target>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Produce the ordered candidate list, either from the Locate API or, with
/// an explicit hostname, synthesized locally.
pub(crate) async fn query_targets(rep: &Reporter<'_>) -> Result<Vec<Target>> {
    let settings = rep.settings;
    if settings.hostname.is_some() {
        rep.debug("locate: no need to query the locate api; we have a hostname");
        return Ok(vec![static_result(settings)]);
    }

    let mut url = format!(
        "{}{}",
        settings.locate_api_base_url,
        if settings.metadata.contains_key("key") {
            "/v2/priority/nearest/ndt/ndt7"
        } else {
            "/v2/nearest/ndt/ndt7"
        }
    );
    if !settings.metadata.is_empty() {
        url.push('?');
        url.push_str(&format_http_params(&settings.metadata));
    }
    rep.info(&format!("using locate: {url}"));

    let mut builder = reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout);
    if let Some(port) = &settings.socks5h_port {
        let proxy = reqwest::Proxy::all(format!("socks5h://127.0.0.1:{port}")).map_err(|err| {
            rep.warn(&format!("locate: invalid proxy configuration: {err}"));
            ErrorKind::InvalidArgument
        })?;
        builder = builder.proxy(proxy);
    }
    let client = builder.build().map_err(|err| {
        rep.warn(&format!("locate: cannot build HTTP client: {err}"));
        ErrorKind::IoError
    })?;

    let response = client.get(&url).send().await.map_err(|err| {
        let kind = map_http_error(&err);
        rep.warn(&format!("locate: query failed: {err}"));
        kind
    })?;
    let status = response.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        rep.server_busy("M-Lab is out of capacity");
        return Err(ErrorKind::IoError);
    }
    if status != reqwest::StatusCode::OK {
        rep.warn(&format!("locate: unexpected response status: {status}"));
        return Err(ErrorKind::IoError);
    }
    let body = response.text().await.map_err(|err| {
        let kind = map_http_error(&err);
        rep.warn(&format!("locate: cannot read response body: {err}"));
        kind
    })?;
    rep.debug(&format!("locate: reply: {body}"));
    parse_body(rep, &body)
}

fn parse_body(rep: &Reporter<'_>, body: &str) -> Result<Vec<Target>> {
    let parsed: LocateResponse = serde_json::from_str(body).map_err(|err| {
        rep.warn(&format!("locate: cannot parse JSON: {err}"));
        ErrorKind::IoError
    })?;
    let Some(results) = parsed.results else {
        match parsed.error {
            Some(error) => rep.warn(&format!("locate: error response: {error}")),
            None => rep.warn(&format!("locate: no results and no error! {body}")),
        }
        return Err(ErrorKind::IoError);
    };
    let mut targets = Vec::new();
    for target in results {
        if target.urls.is_empty() {
            // This should not occur.
            rep.warn("locate: results object is missing urls");
            continue;
        }
        if let Some(url) = target.urls.values().next() {
            rep.debug(&format!("locate: discovered host: {url}"));
        }
        targets.push(target);
    }
    if targets.is_empty() {
        rep.warn("locate: no usable results");
        return Err(ErrorKind::IoError);
    }
    Ok(targets)
}

fn static_result(settings: &Settings) -> Target {
    let scheme = &settings.scheme;
    let hostname = settings.hostname.as_deref().unwrap_or_default();
    let opts = format_http_params(&settings.metadata);
    let mut urls = HashMap::new();
    for path in [params::DOWNLOAD_URL_PATH, params::UPLOAD_URL_PATH] {
        urls.insert(
            format!("{scheme}://{path}"),
            format!("{scheme}://{hostname}:{}{path}?{opts}", settings.port),
        );
    }
    Target {
        machine: hostname.to_string(),
        urls,
    }
}

fn map_http_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::TimedOut
    } else {
        ErrorKind::IoError
    }
}
