//! ndt7 protocol data types.
//!
//! These structs match the JSON measurement messages defined in the
//! [ndt7 specification](https://github.com/m-lab/ndt-server/blob/master/spec/ndt7-protocol.md).

use serde::{Deserialize, Serialize};

/// Which subtest is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Download (server-to-client) test.
    Download,
    /// Upload (client-to-server) test.
    Upload,
}

/// Application-level throughput counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Microseconds elapsed since the start of the test.
    #[serde(rename = "ElapsedTime")]
    pub elapsed_time: i64,
    /// Total bytes transferred so far.
    #[serde(rename = "NumBytes")]
    pub num_bytes: i64,
}

/// Endpoint addresses and connection metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Client address as `ip:port`.
    #[serde(rename = "Client", default)]
    pub client: String,
    /// Server address as `ip:port`.
    #[serde(rename = "Server", default)]
    pub server: String,
    /// Unique identifier for the test assigned by the server.
    #[serde(rename = "UUID", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Start time of the test in RFC 3339 format.
    #[serde(rename = "StartTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

/// TCP connection metrics reported by the server's kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TCPInfo {
    /// Time (microseconds) the connection has been actively sending data.
    #[serde(rename = "BusyTime", skip_serializing_if = "Option::is_none")]
    pub busy_time: Option<i64>,
    /// Bytes acknowledged by the peer.
    #[serde(rename = "BytesAcked", skip_serializing_if = "Option::is_none")]
    pub bytes_acked: Option<i64>,
    /// Bytes received from the peer.
    #[serde(rename = "BytesReceived", skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<i64>,
    /// Bytes sent to the peer.
    #[serde(rename = "BytesSent", skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<i64>,
    /// Bytes retransmitted.
    #[serde(rename = "BytesRetrans", skip_serializing_if = "Option::is_none")]
    pub bytes_retrans: Option<i64>,
    /// Microseconds elapsed since the TCP connection was established.
    #[serde(rename = "ElapsedTime", skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<i64>,
    /// Minimum round-trip time observed (microseconds).
    #[serde(rename = "MinRTT", skip_serializing_if = "Option::is_none")]
    pub min_rtt: Option<i64>,
    /// Smoothed round-trip time (microseconds).
    #[serde(rename = "RTT", skip_serializing_if = "Option::is_none")]
    pub rtt: Option<i64>,
    /// Round-trip time variance (microseconds).
    #[serde(rename = "RTTVar", skip_serializing_if = "Option::is_none")]
    pub rtt_var: Option<i64>,
    /// Time (microseconds) limited by the receive window.
    #[serde(rename = "RWndLimited", skip_serializing_if = "Option::is_none")]
    pub rwnd_limited: Option<i64>,
    /// Time (microseconds) limited by the send buffer.
    #[serde(rename = "SndBufLimited", skip_serializing_if = "Option::is_none")]
    pub snd_buf_limited: Option<i64>,
}

/// A single measurement message received from an ndt7 server.
///
/// All members are optional: servers are free to extend the schema, and
/// messages missing a section simply leave it `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Application-level throughput counters.
    #[serde(rename = "AppInfo", skip_serializing_if = "Option::is_none")]
    pub app_info: Option<AppInfo>,
    /// Connection endpoint addresses.
    #[serde(rename = "ConnectionInfo", skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<ConnectionInfo>,
    /// TCP-level metrics from the server's kernel.
    #[serde(rename = "TCPInfo", skip_serializing_if = "Option::is_none")]
    pub tcp_info: Option<TCPInfo>,
}
