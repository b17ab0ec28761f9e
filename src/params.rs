//! Protocol constants and tuning parameters.

use std::time::Duration;

/// Value of the Sec-WebSocket-Protocol header.
pub const SEC_WEBSOCKET_PROTOCOL: &str = "net.measurementlab.ndt.v7";

/// URL path for the download test.
pub const DOWNLOAD_URL_PATH: &str = "/ndt/v7/download";

/// URL path for the upload test.
pub const UPLOAD_URL_PATH: &str = "/ndt/v7/upload";

/// Base URL for the M-Lab Locate v2 API.
pub const LOCATE_BASE_URL: &str = "https://locate.measurementlab.net";

/// Maximum amount of bytes a client should be prepared to handle when
/// receiving an ndt7 message (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1 << 24;

/// Size of the binary messages sent during the upload test (8 KiB). Smaller
/// than the protocol maximum, which currently seems a reasonable size for
/// outgoing messages.
pub const UPLOAD_MESSAGE_SIZE: usize = 1 << 13;

/// Expected ndt7 transfer time for the upload subtest.
pub const MAX_UPLOAD_TIME: Duration = Duration::from_secs(10);

/// Interval between client-side measurement updates.
pub const MEASUREMENT_INTERVAL: Duration = Duration::from_millis(250);

/// Default timeout for individual I/O operations.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(7);

/// Default maximum runtime of a single subtest.
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(14);

/// Maximum number of header lines accepted in the WebSocket upgrade reply.
pub const MAX_UPGRADE_HEADERS: usize = 1000;

/// Maximum length of a single header line in the WebSocket upgrade reply.
pub const MAX_HEADER_LINE: usize = 8000;
