//! Error kinds shared by every layer of the client.
//!
//! A single closed enum keeps the dialer, the SOCKSv5h and TLS stages, the
//! WebSocket layer, and the subtest engine speaking the same language: each
//! layer returns an [`ErrorKind`] and the caller decides whether the kind is
//! fatal, recoverable, or (for `Eof` on a download) a normal completion.

use thiserror::Error;

/// The error kinds produced by the client. Variant names follow the OS
/// error, `getaddrinfo(3)`, and TLS conditions they map.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Kinds that map directly onto OS error codes, named after the
    // corresponding `errno` values.
    #[error("broken_pipe")]
    BrokenPipe,
    #[error("connection_aborted")]
    ConnectionAborted,
    #[error("connection_refused")]
    ConnectionRefused,
    #[error("connection_reset")]
    ConnectionReset,
    #[error("function_not_supported")]
    FunctionNotSupported,
    #[error("host_unreachable")]
    HostUnreachable,
    #[error("interrupted")]
    Interrupted,
    #[error("invalid_argument")]
    InvalidArgument,
    #[error("io_error")]
    IoError,
    #[error("message_size")]
    MessageSize,
    #[error("network_down")]
    NetworkDown,
    #[error("network_reset")]
    NetworkReset,
    #[error("network_unreachable")]
    NetworkUnreachable,
    #[error("operation_in_progress")]
    OperationInProgress,
    #[error("operation_would_block")]
    OperationWouldBlock,
    #[error("timed_out")]
    TimedOut,
    #[error("value_too_large")]
    ValueTooLarge,

    // Name-resolution kinds, after getaddrinfo(3).
    #[error("ai_generic")]
    AiGeneric,
    #[error("ai_again")]
    AiAgain,
    #[error("ai_fail")]
    AiFail,
    #[error("ai_noname")]
    AiNoname,

    // TLS kinds. The want_read/want_write pair only surfaces from the
    // non-blocking handshake internals; callers see them already resolved
    // into a retry or a timeout.
    #[error("ssl_generic")]
    SslGeneric,
    #[error("ssl_want_read")]
    SslWantRead,
    #[error("ssl_want_write")]
    SslWantWrite,
    #[error("ssl_syscall")]
    SslSyscall,

    // Protocol kinds.
    #[error("eof")]
    Eof,
    #[error("socks5h")]
    Socks5h,
    #[error("ws_proto")]
    WsProto,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Map an OS error code (`errno`) to its dedicated kind.
///
/// A zero code after a failing syscall violates an invariant of the caller,
/// so it is not accepted here; pass only codes taken from a real failure.
#[cfg(unix)]
pub fn map_os_errno(code: i32) -> ErrorKind {
    debug_assert_ne!(code, 0);
    match code {
        libc::EPIPE => ErrorKind::BrokenPipe,
        libc::ECONNABORTED => ErrorKind::ConnectionAborted,
        libc::ECONNREFUSED => ErrorKind::ConnectionRefused,
        libc::ECONNRESET => ErrorKind::ConnectionReset,
        libc::EHOSTUNREACH => ErrorKind::HostUnreachable,
        libc::EINTR => ErrorKind::Interrupted,
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::EIO => ErrorKind::IoError,
        libc::ENETDOWN => ErrorKind::NetworkDown,
        libc::ENETRESET => ErrorKind::NetworkReset,
        libc::ENETUNREACH => ErrorKind::NetworkUnreachable,
        libc::EINPROGRESS => ErrorKind::OperationInProgress,
        libc::EWOULDBLOCK => ErrorKind::OperationWouldBlock,
        #[allow(unreachable_patterns)] // EAGAIN == EWOULDBLOCK on Linux
        libc::EAGAIN => ErrorKind::OperationWouldBlock,
        libc::ETIMEDOUT => ErrorKind::TimedOut,
        _ => ErrorKind::IoError,
    }
}

/// Map a `getaddrinfo(3)` return code to its dedicated kind.
///
/// `EAI_SYSTEM` defers to the errno mapping, which is why the caller must
/// also provide the OS error code observed alongside the resolver failure.
#[cfg(unix)]
pub fn map_eai(code: i32, os_errno: i32) -> ErrorKind {
    match code {
        libc::EAI_AGAIN => ErrorKind::AiAgain,
        libc::EAI_FAIL => ErrorKind::AiFail,
        libc::EAI_NONAME => ErrorKind::AiNoname,
        libc::EAI_SYSTEM => map_os_errno(os_errno),
        _ => ErrorKind::AiGeneric,
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            return map_os_errno(code);
        }
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::BrokenPipe => ErrorKind::BrokenPipe,
            Io::ConnectionAborted => ErrorKind::ConnectionAborted,
            Io::ConnectionRefused => ErrorKind::ConnectionRefused,
            Io::ConnectionReset => ErrorKind::ConnectionReset,
            Io::Interrupted => ErrorKind::Interrupted,
            Io::InvalidInput => ErrorKind::InvalidArgument,
            Io::TimedOut => ErrorKind::TimedOut,
            Io::UnexpectedEof => ErrorKind::Eof,
            Io::WouldBlock => ErrorKind::OperationWouldBlock,
            _ => ErrorKind::IoError,
        }
    }
}
