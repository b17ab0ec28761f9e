//! Client façade: candidate iteration, subtest orchestration, summary.

use std::sync::Arc;

use crate::connection;
use crate::download;
use crate::emitter::{EventHandler, LogHandler, Reporter};
use crate::error::{ErrorKind, Result};
use crate::locate;
use crate::params;
use crate::settings::{Settings, SummaryData};
use crate::upload;
use crate::util::{format_speed_from_kbits, parse_ws_url, UrlParts};

/// ndt7 measurement client.
///
/// Construct one with [`Settings`], call [`run`](Client::run), then read the
/// results with [`get_summary`](Client::get_summary). Progress and
/// diagnostics flow through an [`EventHandler`]; the default one writes
/// human-readable lines to stderr.
pub struct Client {
    settings: Settings,
    summary: SummaryData,
    handler: Arc<dyn EventHandler + Send + Sync>,
}

impl Client {
    /// Create a client with the default stderr event handler.
    pub fn new(settings: Settings) -> Self {
        let handler = Arc::new(LogHandler::new(settings.verbosity));
        Client {
            settings,
            summary: SummaryData::default(),
            handler,
        }
    }

    /// Create a client with a custom event handler.
    pub fn with_handler(
        settings: Settings,
        handler: Arc<dyn EventHandler + Send + Sync>,
    ) -> Self {
        Client {
            settings,
            summary: SummaryData::default(),
            handler,
        }
    }

    /// The summary of the last successful run. Zero fields mean "not
    /// measured".
    pub fn get_summary(&self) -> SummaryData {
        self.summary
    }

    /// Run the selected subtests.
    ///
    /// Candidates come from the Locate API (or from the static result when a
    /// hostname is configured) and are tried in order: each subtest opens a
    /// fresh connection per candidate, stops at the first success, and fails
    /// the run only when every candidate has been exhausted.
    pub async fn run(&mut self) -> bool {
        // ndt7 implies WebSocket framing.
        self.settings.websocket = true;
        let rep = Reporter::new(&self.settings, self.handler.as_ref());
        let targets = match locate::query_targets(&rep).await {
            Ok(targets) => targets,
            Err(_) => return false,
        };
        rep.debug("using the ndt7 protocol");
        let scheme = self.settings.ws_scheme();

        if self.settings.download {
            let key = format!("{scheme}:///ndt/v7/download");
            let mut ok = false;
            for target in &targets {
                let Some(service_url) = target.urls.get(&key) else {
                    rep.warn(&format!("ndt7: scheme not found in results: {scheme}"));
                    continue;
                };
                let url = parse_ws_url(service_url);
                rep.info(&format!(
                    "ndt7: starting download test: {}://{}",
                    url.scheme, url.host
                ));
                match run_download(&rep, &url, &mut self.summary).await {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(err) => {
                        rep.warn(&format!("ndt7: download failed: {err}"));
                        // Misconfiguration; another candidate cannot help.
                        if err == ErrorKind::InvalidArgument {
                            break;
                        }
                    }
                }
            }
            if !ok {
                rep.warn("no more hosts to try; failing the test");
                return false;
            }
        }

        if self.settings.upload {
            let key = format!("{scheme}:///ndt/v7/upload");
            let mut ok = false;
            for target in &targets {
                let Some(service_url) = target.urls.get(&key) else {
                    rep.warn(&format!("ndt7: scheme not found in results: {scheme}"));
                    continue;
                };
                let url = parse_ws_url(service_url);
                rep.info(&format!(
                    "ndt7: starting upload test: {}://{}",
                    url.scheme, url.host
                ));
                match run_upload(&rep, &url, &mut self.summary).await {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(err) => {
                        rep.warn(&format!("ndt7: upload failed: {err}"));
                        // Misconfiguration; another candidate cannot help.
                        if err == ErrorKind::InvalidArgument {
                            break;
                        }
                    }
                }
            }
            if !ok {
                rep.warn("no more hosts to try; failing the test");
                return false;
            }
        }

        rep.info("ndt7: test complete");
        emit_summary(&rep, &self.summary);
        true
    }
}

async fn run_download(
    rep: &Reporter<'_>,
    url: &UrlParts,
    summary: &mut SummaryData,
) -> Result<()> {
    let mut conn = connection::establish(rep, url).await?;
    download::run(rep, &mut conn, summary).await
}

async fn run_upload(rep: &Reporter<'_>, url: &UrlParts, summary: &mut SummaryData) -> Result<()> {
    let mut conn = connection::establish(rep, url).await?;
    let handle = socket_handle(&conn);
    upload::run(rep, &mut conn, summary, handle, params::MAX_UPLOAD_TIME).await
}

#[cfg(unix)]
fn socket_handle(conn: &connection::Connection) -> Option<upload::SocketHandle> {
    use std::os::fd::AsRawFd;
    Some(conn.get_ref().tcp().as_raw_fd())
}

#[cfg(not(unix))]
fn socket_handle(_conn: &connection::Connection) -> Option<upload::SocketHandle> {
    None
}

fn emit_summary(rep: &Reporter<'_>, summary: &SummaryData) {
    rep.info("[Test results]");
    if summary.download_speed != 0.0 {
        rep.info(&format!(
            "Download speed: {}",
            format_speed_from_kbits(summary.download_speed)
        ));
    }
    if summary.upload_speed != 0.0 {
        rep.info(&format!(
            "Upload speed: {}",
            format_speed_from_kbits(summary.upload_speed)
        ));
    }
    if summary.min_rtt != 0 {
        rep.info(&format!("Latency: {:.2} ms", summary.min_rtt as f64 / 1000.0));
    }
    if summary.download_retrans != 0.0 {
        rep.info(&format!(
            "Download retransmission: {:.2}%",
            summary.download_retrans * 100.0
        ));
    }
    if summary.upload_retrans != 0.0 {
        rep.info(&format!(
            "Upload retransmission: {:.2}%",
            summary.upload_retrans * 100.0
        ));
    }
}
