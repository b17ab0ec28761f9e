//! ndt7 upload subtest.
//!
//! Send-only: a single pre-built masked binary frame is written at line rate
//! for the duration of the transfer, interleaved every measurement interval
//! with a TEXT message carrying the client-side counters (and, on Linux, a
//! kernel TCP statistics snapshot).

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::params;
use crate::settings::SummaryData;
use crate::spec::{AppInfo, TestKind};
use crate::util::{compute_speed_kbits, random_printable_fill};
use crate::ws::frame::{self, FIN_FLAG, OPCODE_BINARY, OPCODE_TEXT};
use crate::ws::WsStream;

/// Socket handle used for kernel TCP statistics, when available.
#[cfg(unix)]
pub(crate) type SocketHandle = std::os::fd::RawFd;
#[cfg(not(unix))]
pub(crate) type SocketHandle = ();

#[derive(Serialize)]
struct ClientMeasurement {
    #[serde(rename = "AppInfo")]
    app_info: AppInfo,
    #[cfg(target_os = "linux")]
    #[serde(rename = "TCPInfo", skip_serializing_if = "Option::is_none")]
    tcp_info: Option<crate::tcpinfo::TcpInfo>,
}

/// Run the upload subtest on an established WebSocket connection.
///
/// `deadline` bounds the transfer; the caller passes
/// [`params::MAX_UPLOAD_TIME`]. `handle` is the socket the connection rides
/// on, used to query kernel TCP statistics on Linux.
pub(crate) async fn run<S>(
    rep: &Reporter<'_>,
    ws: &mut WsStream<S>,
    summary: &mut SummaryData,
    handle: Option<SocketHandle>,
    deadline: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut rng = SmallRng::from_os_rng();
    let mut payload = vec![0u8; params::UPLOAD_MESSAGE_SIZE];
    random_printable_fill(&mut rng, &mut payload);
    // One frame, one mask, reused for the whole run. The payload is fully
    // random, so nothing observable at the server depends on the mask.
    let bulk_frame = frame::prepare_frame(OPCODE_BINARY | FIN_FLAG, ws.next_mask(), &payload);

    let begin = Instant::now();
    let mut latest = begin;
    let mut total: u64 = 0;
    let mut elapsed = Duration::ZERO;
    summary.upload_speed = 0.0;
    summary.upload_retrans = 0.0;
    loop {
        let now = Instant::now();
        elapsed = now - begin;
        if elapsed > deadline {
            rep.debug("ndt7: upload has run for enough time");
            break;
        }
        if now - latest > params::MEASUREMENT_INTERVAL {
            let measurement = client_measurement(rep, summary, elapsed, total, handle);
            rep.performance(
                TestKind::Upload,
                1,
                total as f64,
                elapsed.as_secs_f64(),
                deadline.as_secs_f64(),
            );
            let json = serde_json::to_string(&measurement).map_err(|_| ErrorKind::InvalidArgument)?;
            rep.result("ndt7", "upload", &json);
            ws.send_frame(OPCODE_TEXT | FIN_FLAG, json.as_bytes())
                .await
                .inspect_err(|_| rep.warn("ndt7: cannot send measurement"))?;
            latest = now;
        }
        ws.send_prepared(&bulk_frame)
            .await
            .inspect_err(|_| rep.warn("ndt7: cannot send frame"))?;
        total += payload.len() as u64;
    }
    summary.upload_speed = compute_speed_kbits(total as f64, elapsed.as_secs_f64());
    Ok(())
}

fn client_measurement(
    rep: &Reporter<'_>,
    summary: &mut SummaryData,
    elapsed: Duration,
    total: u64,
    handle: Option<SocketHandle>,
) -> ClientMeasurement {
    let app_info = AppInfo {
        elapsed_time: elapsed.as_micros() as i64,
        num_bytes: total as i64,
    };
    #[cfg(target_os = "linux")]
    {
        let tcp_info =
            handle.and_then(|fd| crate::tcpinfo::snapshot(fd, elapsed.as_micros() as u64));
        match &tcp_info {
            Some(info) => {
                summary.upload_retrans = if info.tcpi_bytes_sent != 0 {
                    info.tcpi_bytes_retrans as f64 / info.tcpi_bytes_sent as f64
                } else {
                    0.0
                };
            }
            None => rep.warn("ndt7: cannot calculate retransmission rate"),
        }
        ClientMeasurement { app_info, tcp_info }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (rep, summary, handle);
        ClientMeasurement { app_info }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::testing::RecordingHandler;
    use crate::settings::{Settings, Verbosity};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn bounded_run_emits_measurements_and_speed() {
        let (client, mut peer) = tokio::io::duplex(1 << 16);
        let mut ws = WsStream::from_upgraded(client, Duration::from_secs(2));
        let handler = RecordingHandler::default();
        let mut settings = Settings::default();
        settings.verbosity = Verbosity::Debug;
        let mut summary = SummaryData::default();

        // Drain whatever the client sends so it never blocks on the pipe.
        let sink = tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            while peer.read(&mut buf).await.map(|n| n > 0).unwrap_or(false) {}
        });

        let rep = Reporter::new(&settings, &handler);
        run(
            &rep,
            &mut ws,
            &mut summary,
            None,
            Duration::from_millis(400),
        )
        .await
        .unwrap();
        drop(ws);
        sink.await.unwrap();

        assert!(summary.upload_speed > 0.0);
        let lines = handler.lines().join("\n");
        assert!(lines.contains("performance: Upload"), "{lines}");
        assert!(lines.contains("\"AppInfo\""), "{lines}");
        assert!(lines.contains("\"NumBytes\""), "{lines}");
    }

    #[tokio::test]
    async fn send_failure_fails_the_subtest() {
        let (client, peer) = tokio::io::duplex(1024);
        drop(peer);
        let mut ws = WsStream::from_upgraded(client, Duration::from_secs(1));
        let handler = RecordingHandler::default();
        let mut settings = Settings::default();
        settings.verbosity = Verbosity::Warning;
        let mut summary = SummaryData::default();
        let rep = Reporter::new(&settings, &handler);
        let err = run(
            &rep,
            &mut ws,
            &mut summary,
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_ne!(err, ErrorKind::TimedOut);
        assert_eq!(summary.upload_speed, 0.0);
        assert!(handler
            .lines()
            .iter()
            .any(|l| l.contains("cannot send frame")));
    }
}
