//! An [ndt7](https://github.com/m-lab/ndt-server/blob/master/spec/ndt7-protocol.md)
//! network measurement client library.
//!
//! ndt7 is a network performance measurement protocol developed by
//! [M-Lab](https://www.measurementlab.net/). This crate measures download
//! and upload throughput, retransmission rate, and minimum round-trip time
//! against a remote ndt7 server, carrying its own network I/O core: a
//! composable dial pipeline (TCP, optional SOCKSv5h, optional TLS), a
//! WebSocket framing layer, the download/upload subtest engine, and a
//! Locate API client for server discovery.
//!
//! # Quick start
//!
//! ```no_run
//! use libndt7::client::Client;
//! use libndt7::settings::{Settings, Verbosity};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut settings = Settings::default();
//! settings.tls = true;
//! settings.upload = true;
//! settings.verbosity = Verbosity::Info;
//!
//! let mut client = Client::new(settings);
//! if client.run().await {
//!     let summary = client.get_summary();
//!     println!("download: {} kbit/s", summary.download_speed);
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
mod connection;
mod dialer;
mod download;
pub mod emitter;
pub mod error;
pub mod locate;
pub mod params;
pub mod settings;
mod socks5;
pub mod spec;
mod stream;
#[cfg(target_os = "linux")]
pub mod tcpinfo;
mod tls;
mod upload;
pub mod util;
pub mod ws;
