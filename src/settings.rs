//! Client settings and the summary produced by a test run.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::params;

/// Logging verbosity of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Do not emit any log message.
    Quiet,
    /// Emit only warning messages.
    Warning,
    /// Emit warning and informational messages.
    Info,
    /// Emit all log messages.
    Debug,
}

/// NDT client settings. The defaults below match a plain `Settings::default()`.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL used to query the Locate API service. Ignored when an
    /// explicit hostname is set. MUST NOT end with a final slash.
    pub locate_api_base_url: String,

    /// Timeout applied to individual I/O operations.
    pub timeout: Duration,

    /// Host name of the ndt7 server to use. When `None` (the default) the
    /// Locate API discovers a nearby server.
    pub hostname: Option<String>,

    /// Port of the ndt7 server to use with an explicit hostname.
    pub port: String,

    /// Scheme (`ws` or `wss`) used when synthesizing a static Locate result
    /// for an explicit hostname.
    pub scheme: String,

    /// Whether to run the download subtest.
    pub download: bool,

    /// Whether to run the upload subtest.
    pub upload: bool,

    /// Whether to wrap connections in TLS.
    pub tls: bool,

    /// Whether to use WebSocket framing. ndt7 requires it, so `run()` forces
    /// this on regardless of the value configured here.
    pub websocket: bool,

    /// Verbosity of the client.
    pub verbosity: Verbosity,

    /// Metadata forwarded to the Locate API (and to the server logs) as
    /// URL-encoded query parameters, in key order.
    pub metadata: BTreeMap<String, String>,

    /// User agent sent with Locate API requests.
    pub user_agent: String,

    /// Maximum time for which a subtest is allowed to run. A safeguard
    /// against buffering or changing network conditions keeping the test
    /// alive for much longer than anticipated.
    pub max_runtime: Duration,

    /// SOCKSv5h port for tunnelling all DNS and TCP traffic, e.g. over Tor.
    pub socks5h_port: Option<String>,

    /// CA bundle path used to verify TLS connections. When unset on a
    /// UNIX-like host, a few well-known locations are probed; without any
    /// usable bundle a verified run fails.
    pub ca_bundle_path: Option<String>,

    /// Whether to verify the TLS peer. Enabled by default; disabling it is
    /// insecure and only meant for testing.
    pub tls_verify_peer: bool,

    /// Hide periodic progress output and only report the final summary.
    pub summary_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "client_library_name".to_string(),
            "libndt7-rs".to_string(),
        );
        metadata.insert(
            "client_library_version".to_string(),
            format!("v{}", env!("CARGO_PKG_VERSION")),
        );
        Settings {
            locate_api_base_url: params::LOCATE_BASE_URL.to_string(),
            timeout: params::DEFAULT_IO_TIMEOUT,
            hostname: None,
            port: "443".to_string(),
            scheme: "wss".to_string(),
            download: true,
            upload: false,
            tls: false,
            websocket: false,
            verbosity: Verbosity::Quiet,
            metadata,
            user_agent: format!("libndt7-rs-agent/v{}", env!("CARGO_PKG_VERSION")),
            max_runtime: params::DEFAULT_MAX_RUNTIME,
            socks5h_port: None,
            ca_bundle_path: None,
            tls_verify_peer: true,
            summary_only: false,
        }
    }
}

impl Settings {
    /// The URL scheme implied by the configured protocol flags.
    pub(crate) fn ws_scheme(&self) -> &'static str {
        if self.tls {
            "wss"
        } else {
            "ws"
        }
    }
}

/// Fields that summarize a completed test. Zero means "not measured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryData {
    /// Download speed in kbit/s.
    pub download_speed: f64,

    /// Upload speed in kbit/s.
    pub upload_speed: f64,

    /// Download retransmission rate (bytes_retrans / bytes_sent).
    pub download_retrans: f64,

    /// Upload retransmission rate (bytes_retrans / bytes_sent).
    pub upload_retrans: f64,

    /// TCPInfo's MinRTT (microseconds).
    pub min_rtt: u32,
}
