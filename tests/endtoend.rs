//! End-to-end scenarios against local stub servers.
//!
//! Each test drives the full client through `Client::run`: server discovery
//! (static or via a stub Locate service), the dial pipeline, the WebSocket
//! upgrade, and a subtest loop.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use libndt7::client::Client;
use libndt7::emitter::EventHandler;
use libndt7::settings::{Settings, Verbosity};
use libndt7::spec::TestKind;
use libndt7::ws::handshake::accept_for_key;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn lines(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, line: String) {
        self.events.lock().unwrap().push(line);
    }
}

impl EventHandler for Recorder {
    fn on_warning(&self, msg: &str) {
        self.push(format!("warning: {msg}"));
    }

    fn on_info(&self, msg: &str) {
        self.push(format!("info: {msg}"));
    }

    fn on_debug(&self, msg: &str) {
        self.push(format!("debug: {msg}"));
    }

    fn on_performance(
        &self,
        test: TestKind,
        _nflows: u8,
        _measured_bytes: f64,
        _elapsed_sec: f64,
        _max_runtime: f64,
    ) {
        self.push(format!("performance: {test:?}"));
    }

    fn on_result(&self, scope: &str, name: &str, _value: &str) {
        self.push(format!("result: {scope} {name}"));
    }

    fn on_server_busy(&self, msg: &str) {
        self.push(format!("busy: {msg}"));
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.scheme = "ws".to_string();
    settings.tls = false;
    settings.verbosity = Verbosity::Debug;
    settings
}

// Read an HTTP request head and answer the WebSocket upgrade.
async fn accept_upgrade(stream: &mut TcpStream, correct_accept: bool) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    let key = head
        .lines()
        .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
        .expect("upgrade request must carry a key");
    let accept = if correct_accept {
        accept_for_key(key)
    } else {
        "bm90IHRoZSByaWdodCBhbnN3ZXI=".to_string()
    };
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         Sec-WebSocket-Protocol: net.measurementlab.ndt.v7\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
}

fn unmasked_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![first_byte];
    let n = payload.len() as u64;
    if n < 126 {
        out.push(n as u8);
    } else if n < (1 << 16) {
        out.push(126);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&n.to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

// Serve one download: accept the upgrade, stream `total_bytes`, close.
async fn serve_download_once(listener: TcpListener, total_bytes: usize) {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_upgrade(&mut stream, true).await;
    let chunk = vec![0x55u8; 1 << 20];
    let mut sent = 0;
    while sent < total_bytes {
        let n = chunk.len().min(total_bytes - sent);
        stream
            .write_all(&unmasked_frame(0x82, &chunk[..n]))
            .await
            .unwrap();
        sent += n;
    }
    let measurement =
        br#"{"TCPInfo": {"BytesSent": 1000000, "BytesRetrans": 5000, "MinRTT": 12345}}"#;
    stream
        .write_all(&unmasked_frame(0x81, measurement))
        .await
        .unwrap();
    stream.write_all(&unmasked_frame(0x88, &[])).await.unwrap();
    stream.flush().await.unwrap();
    // Drain the client's CLOSE reply so nothing in flight turns into a
    // reset that could discard buffered download data.
    let mut sink = [0u8; 4096];
    while stream.read(&mut sink).await.map(|n| n > 0).unwrap_or(false) {}
}

// Serve one upload: accept the upgrade, then swallow bytes until the
// client hangs up.
async fn serve_upload_once(listener: TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_upgrade(&mut stream, true).await;
    let mut sink = vec![0u8; 1 << 16];
    while stream.read(&mut sink).await.map(|n| n > 0).unwrap_or(false) {}
}

// Serve one plain HTTP response, Locate-stub style.
async fn serve_http_once(listener: TcpListener, status: &str, body: &str) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

#[tokio::test]
async fn static_host_download_only_succeeds() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    let server = tokio::spawn(serve_download_once(listener, 50 * 1024 * 1024));

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.hostname = Some("localhost".to_string());
    settings.port = port;
    settings.download = true;
    settings.upload = false;
    let mut client = Client::with_handler(settings, recorder.clone());

    assert!(client.run().await, "{:?}", recorder.lines());
    server.await.unwrap();

    let summary = client.get_summary();
    assert!(summary.download_speed > 0.0);
    assert_eq!(summary.download_retrans, 0.005);
    assert_eq!(summary.min_rtt, 12345);
    let lines = recorder.lines().join("\n");
    assert!(lines.contains("info: ndt7: test complete"), "{lines}");
    assert!(lines.contains("info: [Test results]"), "{lines}");
}

#[tokio::test]
async fn locate_204_reports_server_busy_and_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        serve_http_once(listener, "204 No Content", "").await;
    });

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.locate_api_base_url = format!("http://127.0.0.1:{port}");
    let mut client = Client::with_handler(settings, recorder.clone());

    assert!(!client.run().await);
    server.await.unwrap();
    assert!(
        recorder.lines().iter().any(|l| l.starts_with("busy: ")),
        "{:?}",
        recorder.lines()
    );
}

#[tokio::test]
async fn locate_invalid_json_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        serve_http_once(listener, "200 OK", "{{{{").await;
    });

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.locate_api_base_url = format!("http://127.0.0.1:{port}");
    let mut client = Client::with_handler(settings, recorder.clone());

    assert!(!client.run().await);
    server.await.unwrap();
}

#[tokio::test]
async fn candidate_failover_reaches_the_second_server() {
    // First candidate: a port with nothing listening on it.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);
    // Second candidate: a working download stub.
    let good = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let good_port = good.local_addr().unwrap().port();
    let download_server = tokio::spawn(serve_download_once(good, 4 * 1024 * 1024));

    let body = format!(
        r#"{{"results": [
            {{"machine": "dead.example.net",
              "urls": {{"ws:///ndt/v7/download": "ws://127.0.0.1:{dead_port}/ndt/v7/download?tok=1"}}}},
            {{"machine": "good.example.net",
              "urls": {{"ws:///ndt/v7/download": "ws://127.0.0.1:{good_port}/ndt/v7/download?tok=2"}}}}
        ]}}"#
    );
    let locate = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let locate_port = locate.local_addr().unwrap().port();
    let locate_server = tokio::spawn(async move {
        serve_http_once(locate, "200 OK", &body).await;
    });

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.locate_api_base_url = format!("http://127.0.0.1:{locate_port}");
    let mut client = Client::with_handler(settings, recorder.clone());

    assert!(client.run().await, "{:?}", recorder.lines());
    locate_server.await.unwrap();
    download_server.await.unwrap();

    assert!(client.get_summary().download_speed > 0.0);
    let lines = recorder.lines().join("\n");
    assert!(lines.contains(&format!("127.0.0.1:{dead_port}")), "{lines}");
    assert!(lines.contains(&format!("127.0.0.1:{good_port}")), "{lines}");
    assert!(lines.contains("ndt7: download failed"), "{lines}");
}

#[tokio::test]
async fn handshake_without_canonical_accept_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_upgrade(&mut stream, false).await;
        let mut sink = [0u8; 1024];
        while stream.read(&mut sink).await.map(|n| n > 0).unwrap_or(false) {}
    });

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.hostname = Some("127.0.0.1".to_string());
    settings.port = port;
    let mut client = Client::with_handler(settings, recorder.clone());

    assert!(!client.run().await);
    server.await.unwrap();
    let lines = recorder.lines().join("\n");
    assert!(lines.contains("ws_proto"), "{lines}");
}

#[tokio::test]
async fn upload_is_bounded_by_the_transfer_ceiling() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    let server = tokio::spawn(serve_upload_once(listener));

    let recorder = Arc::new(Recorder::default());
    let mut settings = test_settings();
    settings.hostname = Some("127.0.0.1".to_string());
    settings.port = port;
    settings.download = false;
    settings.upload = true;
    let mut client = Client::with_handler(settings, recorder.clone());

    let begin = Instant::now();
    assert!(client.run().await, "{:?}", recorder.lines());
    let elapsed = begin.elapsed();
    server.await.unwrap();

    assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(11_000), "{elapsed:?}");
    assert!(client.get_summary().upload_speed > 0.0);
    assert!(
        recorder
            .lines()
            .iter()
            .any(|l| l.contains("performance: Upload")),
        "{:?}",
        recorder.lines()
    );
}
