use clap::Parser;
use libndt7::client::Client;
use libndt7::params;
use libndt7::settings::{Settings, Verbosity};
use std::time::Duration;

/// ndt7 network measurement client.
///
/// Measures download and upload throughput, retransmission rate, and
/// minimum round-trip time against an M-Lab ndt7 server.
#[derive(Parser, Debug)]
#[command(name = "ndt7-client", version)]
struct Cli {
    /// Run the download subtest
    #[arg(long)]
    download: bool,
    /// Run the upload subtest
    #[arg(long)]
    upload: bool,
    /// ndt7 server hostname; bypasses the Locate API
    #[arg(long)]
    hostname: Option<String>,
    /// Port used with an explicit hostname (defaults to 443, or 80 with --no-tls)
    #[arg(long)]
    port: Option<String>,
    /// Use unencrypted WebSocket (ws://) instead of TLS (wss://)
    #[arg(long)]
    no_tls: bool,
    /// Base URL of the Locate API
    #[arg(long, default_value = params::LOCATE_BASE_URL)]
    locate_url: String,
    /// Locate API key for registered clients
    #[arg(long)]
    locate_api_key: Option<String>,
    /// SOCKSv5h proxy port on 127.0.0.1 carrying all DNS and TCP traffic
    #[arg(long)]
    socks5h_port: Option<String>,
    /// CA bundle path used to verify the TLS peer
    #[arg(long)]
    ca_bundle_path: Option<String>,
    /// Do not verify the TLS peer (insecure)
    #[arg(long)]
    insecure: bool,
    /// I/O timeout in seconds
    #[arg(long, default_value_t = 7)]
    timeout: u64,
    /// Maximum runtime of a subtest in seconds
    #[arg(long, default_value_t = 14)]
    max_runtime: u64,
    /// Emit debug messages
    #[arg(short, long)]
    verbose: bool,
    /// Only print the final summary
    #[arg(long)]
    summary_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if !cli.download && !cli.upload {
        eprintln!("error: you must enable --download and/or --upload");
        std::process::exit(1);
    }

    let mut settings = Settings::default();
    settings.download = cli.download;
    settings.upload = cli.upload;
    settings.tls = !cli.no_tls;
    settings.scheme = if cli.no_tls { "ws" } else { "wss" }.to_string();
    settings.port = match cli.port {
        Some(port) => port,
        None if cli.no_tls => "80".to_string(),
        None => "443".to_string(),
    };
    settings.hostname = cli.hostname;
    settings.locate_api_base_url = cli.locate_url;
    settings.socks5h_port = cli.socks5h_port;
    settings.ca_bundle_path = cli.ca_bundle_path;
    settings.tls_verify_peer = !cli.insecure;
    settings.timeout = Duration::from_secs(cli.timeout);
    settings.max_runtime = Duration::from_secs(cli.max_runtime);
    settings.summary_only = cli.summary_only;
    settings.verbosity = if cli.verbose {
        Verbosity::Debug
    } else {
        Verbosity::Info
    };
    if let Some(key) = cli.locate_api_key {
        settings.metadata.insert("key".to_string(), key);
    }

    let mut client = Client::new(settings);
    let ok = client.run().await;
    std::process::exit(if ok { 0 } else { 1 });
}
