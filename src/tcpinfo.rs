//! Kernel TCP statistics for the upload measurement (Linux only).
//!
//! The kernel fills as much of the struct as it knows about and reports the
//! filled length; fields beyond that stay zero. Serialized field names are
//! the UpperCamelCase of the kernel's `tcp_info` member names, e.g.
//! `tcpi_bytes_sent` becomes `TcpiBytesSent`.

use std::mem;
use std::os::fd::RawFd;

use serde::Serialize;

// Mirror of `struct tcp_info` from linux/tcp.h. The two bitfield bytes
// (wscale and app-limited flags) are kept as raw bytes and split in
// `TcpInfo::from_raw`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct RawTcpInfo {
    tcpi_state: u8,
    tcpi_ca_state: u8,
    tcpi_retransmits: u8,
    tcpi_probes: u8,
    tcpi_backoff: u8,
    tcpi_options: u8,
    wscale: u8,
    app_limited: u8,
    tcpi_rto: u32,
    tcpi_ato: u32,
    tcpi_snd_mss: u32,
    tcpi_rcv_mss: u32,
    tcpi_unacked: u32,
    tcpi_sacked: u32,
    tcpi_lost: u32,
    tcpi_retrans: u32,
    tcpi_fackets: u32,
    tcpi_last_data_sent: u32,
    tcpi_last_ack_sent: u32,
    tcpi_last_data_recv: u32,
    tcpi_last_ack_recv: u32,
    tcpi_pmtu: u32,
    tcpi_rcv_ssthresh: u32,
    tcpi_rtt: u32,
    tcpi_rttvar: u32,
    tcpi_snd_ssthresh: u32,
    tcpi_snd_cwnd: u32,
    tcpi_advmss: u32,
    tcpi_reordering: u32,
    tcpi_rcv_rtt: u32,
    tcpi_rcv_space: u32,
    tcpi_total_retrans: u32,
    tcpi_pacing_rate: u64,
    tcpi_max_pacing_rate: u64,
    tcpi_bytes_acked: u64,
    tcpi_bytes_received: u64,
    tcpi_segs_out: u32,
    tcpi_segs_in: u32,
    tcpi_notsent_bytes: u32,
    tcpi_min_rtt: u32,
    tcpi_data_segs_in: u32,
    tcpi_data_segs_out: u32,
    tcpi_delivery_rate: u64,
    tcpi_busy_time: u64,
    tcpi_rwnd_limited: u64,
    tcpi_sndbuf_limited: u64,
    tcpi_delivered: u32,
    tcpi_delivered_ce: u32,
    tcpi_bytes_sent: u64,
    tcpi_bytes_retrans: u64,
    tcpi_dsack_dups: u32,
    tcpi_reord_seen: u32,
}

/// One snapshot of the kernel's view of a TCP connection, ready to embed in
/// a client measurement message. The `tcpi_*` fields mirror the kernel's
/// `tcp_info` members one-to-one.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TcpInfo {
    /// Microseconds elapsed since the start of the subtest; stamped by the
    /// caller, not by the kernel.
    pub elapsed_time: u64,
    pub tcpi_state: u64,
    pub tcpi_ca_state: u64,
    pub tcpi_retransmits: u64,
    pub tcpi_probes: u64,
    pub tcpi_backoff: u64,
    pub tcpi_options: u64,
    pub tcpi_snd_wscale: u64,
    pub tcpi_rcv_wscale: u64,
    pub tcpi_delivery_rate_app_limited: u64,
    pub tcpi_rto: u64,
    pub tcpi_ato: u64,
    pub tcpi_snd_mss: u64,
    pub tcpi_rcv_mss: u64,
    pub tcpi_unacked: u64,
    pub tcpi_sacked: u64,
    pub tcpi_lost: u64,
    pub tcpi_retrans: u64,
    pub tcpi_fackets: u64,
    pub tcpi_last_data_sent: u64,
    pub tcpi_last_ack_sent: u64,
    pub tcpi_last_data_recv: u64,
    pub tcpi_last_ack_recv: u64,
    pub tcpi_pmtu: u64,
    pub tcpi_rcv_ssthresh: u64,
    pub tcpi_rtt: u64,
    pub tcpi_rttvar: u64,
    pub tcpi_snd_ssthresh: u64,
    pub tcpi_snd_cwnd: u64,
    pub tcpi_advmss: u64,
    pub tcpi_reordering: u64,
    pub tcpi_rcv_rtt: u64,
    pub tcpi_rcv_space: u64,
    pub tcpi_total_retrans: u64,
    pub tcpi_pacing_rate: u64,
    pub tcpi_max_pacing_rate: u64,
    pub tcpi_bytes_acked: u64,
    pub tcpi_bytes_received: u64,
    pub tcpi_segs_out: u64,
    pub tcpi_segs_in: u64,
    pub tcpi_notsent_bytes: u64,
    pub tcpi_min_rtt: u64,
    pub tcpi_data_segs_in: u64,
    pub tcpi_data_segs_out: u64,
    pub tcpi_delivery_rate: u64,
    pub tcpi_busy_time: u64,
    pub tcpi_rwnd_limited: u64,
    pub tcpi_sndbuf_limited: u64,
    pub tcpi_delivered: u64,
    pub tcpi_delivered_ce: u64,
    pub tcpi_bytes_sent: u64,
    pub tcpi_bytes_retrans: u64,
    pub tcpi_dsack_dups: u64,
    pub tcpi_reord_seen: u64,
}

impl TcpInfo {
    fn from_raw(raw: &RawTcpInfo, elapsed_time: u64) -> Self {
        TcpInfo {
            elapsed_time,
            tcpi_state: raw.tcpi_state as u64,
            tcpi_ca_state: raw.tcpi_ca_state as u64,
            tcpi_retransmits: raw.tcpi_retransmits as u64,
            tcpi_probes: raw.tcpi_probes as u64,
            tcpi_backoff: raw.tcpi_backoff as u64,
            tcpi_options: raw.tcpi_options as u64,
            tcpi_snd_wscale: (raw.wscale & 0x0f) as u64,
            tcpi_rcv_wscale: (raw.wscale >> 4) as u64,
            tcpi_delivery_rate_app_limited: (raw.app_limited & 0x01) as u64,
            tcpi_rto: raw.tcpi_rto as u64,
            tcpi_ato: raw.tcpi_ato as u64,
            tcpi_snd_mss: raw.tcpi_snd_mss as u64,
            tcpi_rcv_mss: raw.tcpi_rcv_mss as u64,
            tcpi_unacked: raw.tcpi_unacked as u64,
            tcpi_sacked: raw.tcpi_sacked as u64,
            tcpi_lost: raw.tcpi_lost as u64,
            tcpi_retrans: raw.tcpi_retrans as u64,
            tcpi_fackets: raw.tcpi_fackets as u64,
            tcpi_last_data_sent: raw.tcpi_last_data_sent as u64,
            tcpi_last_ack_sent: raw.tcpi_last_ack_sent as u64,
            tcpi_last_data_recv: raw.tcpi_last_data_recv as u64,
            tcpi_last_ack_recv: raw.tcpi_last_ack_recv as u64,
            tcpi_pmtu: raw.tcpi_pmtu as u64,
            tcpi_rcv_ssthresh: raw.tcpi_rcv_ssthresh as u64,
            tcpi_rtt: raw.tcpi_rtt as u64,
            tcpi_rttvar: raw.tcpi_rttvar as u64,
            tcpi_snd_ssthresh: raw.tcpi_snd_ssthresh as u64,
            tcpi_snd_cwnd: raw.tcpi_snd_cwnd as u64,
            tcpi_advmss: raw.tcpi_advmss as u64,
            tcpi_reordering: raw.tcpi_reordering as u64,
            tcpi_rcv_rtt: raw.tcpi_rcv_rtt as u64,
            tcpi_rcv_space: raw.tcpi_rcv_space as u64,
            tcpi_total_retrans: raw.tcpi_total_retrans as u64,
            tcpi_pacing_rate: raw.tcpi_pacing_rate,
            tcpi_max_pacing_rate: raw.tcpi_max_pacing_rate,
            tcpi_bytes_acked: raw.tcpi_bytes_acked,
            tcpi_bytes_received: raw.tcpi_bytes_received,
            tcpi_segs_out: raw.tcpi_segs_out as u64,
            tcpi_segs_in: raw.tcpi_segs_in as u64,
            tcpi_notsent_bytes: raw.tcpi_notsent_bytes as u64,
            tcpi_min_rtt: raw.tcpi_min_rtt as u64,
            tcpi_data_segs_in: raw.tcpi_data_segs_in as u64,
            tcpi_data_segs_out: raw.tcpi_data_segs_out as u64,
            tcpi_delivery_rate: raw.tcpi_delivery_rate,
            tcpi_busy_time: raw.tcpi_busy_time,
            tcpi_rwnd_limited: raw.tcpi_rwnd_limited,
            tcpi_sndbuf_limited: raw.tcpi_sndbuf_limited,
            tcpi_delivered: raw.tcpi_delivered as u64,
            tcpi_delivered_ce: raw.tcpi_delivered_ce as u64,
            tcpi_bytes_sent: raw.tcpi_bytes_sent,
            tcpi_bytes_retrans: raw.tcpi_bytes_retrans,
            tcpi_dsack_dups: raw.tcpi_dsack_dups as u64,
            tcpi_reord_seen: raw.tcpi_reord_seen as u64,
        }
    }
}

/// Read the current TCP statistics of `fd`, stamping `elapsed_time` into the
/// snapshot. Returns `None` when the kernel refuses the query.
pub fn snapshot(fd: RawFd, elapsed_time: u64) -> Option<TcpInfo> {
    let mut raw = RawTcpInfo::default();
    let mut len = mem::size_of::<RawTcpInfo>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            &mut raw as *mut RawTcpInfo as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return None;
    }
    Some(TcpInfo::from_raw(&raw, elapsed_time))
}
