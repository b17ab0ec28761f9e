//! ndt7 download subtest.
//!
//! Receive-only: the client consumes binary bulk messages and TEXT
//! measurement messages until the server closes the connection. A clean
//! close (or CLOSE frame) ends the subtest successfully; running past the
//! configured maximum runtime is a failure, since the server is expected to
//! close first.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::params;
use crate::settings::SummaryData;
use crate::spec::{Measurement, TestKind};
use crate::util::compute_speed_kbits;
use crate::ws::frame::OPCODE_TEXT;
use crate::ws::WsStream;

/// Run the download subtest on an established WebSocket connection.
pub(crate) async fn run<S>(
    rep: &Reporter<'_>,
    ws: &mut WsStream<S>,
    summary: &mut SummaryData,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; params::MAX_MESSAGE_SIZE];
    let begin = Instant::now();
    let mut latest = begin;
    let mut total: u64 = 0;
    let mut elapsed = Duration::ZERO;
    summary.download_speed = 0.0;
    summary.download_retrans = 0.0;
    summary.min_rtt = 0;
    loop {
        let now = Instant::now();
        elapsed = now - begin;
        if elapsed > rep.settings.max_runtime {
            rep.warn("ndt7: download running for too much time");
            return Err(ErrorKind::TimedOut);
        }
        if now - latest > params::MEASUREMENT_INTERVAL {
            rep.performance(
                TestKind::Download,
                1,
                total as f64,
                elapsed.as_secs_f64(),
                rep.settings.max_runtime.as_secs_f64(),
            );
            latest = now;
        }
        let (opcode, count) = match ws.recv_message(&mut buf).await {
            Ok(message) => message,
            Err(ErrorKind::Eof) => break,
            Err(err) => return Err(err),
        };
        if opcode == OPCODE_TEXT {
            absorb_measurement(rep, summary, &buf[..count]);
        }
        total += count as u64;
    }
    summary.download_speed = compute_speed_kbits(total as f64, elapsed.as_secs_f64());
    Ok(())
}

// Update the summary from a server measurement. Parse failures are
// tolerated: the bytes still count toward throughput, which keeps the
// measurement robust to schema additions.
fn absorb_measurement(rep: &Reporter<'_>, summary: &mut SummaryData, payload: &[u8]) {
    let text = String::from_utf8_lossy(payload).into_owned();
    match serde_json::from_slice::<Measurement>(payload) {
        Ok(measurement) => {
            let tcp_info = measurement.tcp_info.unwrap_or_default();
            match (tcp_info.bytes_sent, tcp_info.bytes_retrans) {
                (Some(sent), Some(retrans)) => {
                    summary.download_retrans = if sent != 0 {
                        retrans as f64 / sent as f64
                    } else {
                        0.0
                    };
                }
                _ => rep.warn(
                    "ndt7: TCPInfo not available, cannot get retransmission rate and latency",
                ),
            }
            if let Some(min_rtt) = tcp_info.min_rtt {
                summary.min_rtt = min_rtt as u32;
            }
        }
        Err(_) => {
            rep.debug(&format!("ndt7: unable to parse message as JSON: {text}"));
        }
    }
    rep.result("ndt7", "download", &text);
}
