//! TCP dialer: resolve a host, try every address, map failures.

use std::net::SocketAddr;

use tokio::net::{self, TcpStream};
use tokio::time;

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::util::strtonum;

/// Connect to `host:port`, trying every resolved address in order.
///
/// Each connect attempt is bounded by the configured I/O timeout. Per-address
/// failures are logged with their mapped error kind and the next address is
/// tried; when every address fails the result is a generic I/O error.
pub(crate) async fn dial(rep: &Reporter<'_>, host: &str, port: &str) -> Result<TcpStream> {
    let port_num = match strtonum(port, 0, u16::MAX as i64) {
        Ok(n) => n as u16,
        Err(reason) => {
            rep.warn(&format!("dial: invalid port number: {reason}"));
            return Err(ErrorKind::InvalidArgument);
        }
    };
    rep.debug(&format!("dial: resolving {host}"));
    let addrs: Vec<SocketAddr> = net::lookup_host((host, port_num))
        .await
        .map_err(|err| {
            let kind = map_resolve_error(err);
            rep.warn(&format!("dial: cannot resolve {host}: {kind}"));
            kind
        })?
        .collect();
    if addrs.is_empty() {
        rep.warn(&format!("dial: no addresses for {host}"));
        return Err(ErrorKind::AiNoname);
    }
    for addr in &addrs {
        rep.debug(&format!("dial: - {addr}"));
    }
    for addr in addrs {
        match time::timeout(rep.settings.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                set_no_sigpipe(rep, &stream);
                rep.debug(&format!("dial: connected to {addr}"));
                return Ok(stream);
            }
            Ok(Err(err)) => {
                let kind = ErrorKind::from(err);
                rep.warn(&format!("dial: connect() to {addr} failed: {kind}"));
            }
            Err(_) => {
                rep.warn(&format!(
                    "dial: connect() to {addr} failed: {}",
                    ErrorKind::TimedOut
                ));
            }
        }
    }
    Err(ErrorKind::IoError)
}

fn map_resolve_error(err: std::io::Error) -> ErrorKind {
    // The std resolver does not expose getaddrinfo codes; an attached OS
    // errno maps through the errno table, anything else is a generic
    // resolution failure.
    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return crate::error::map_os_errno(code);
    }
    let _ = err;
    ErrorKind::AiGeneric
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn set_no_sigpipe(rep: &Reporter<'_>, stream: &TcpStream) {
    if let Err(err) = socket2::SockRef::from(stream).set_nosigpipe(true) {
        rep.warn(&format!("dial: setsockopt(SO_NOSIGPIPE) failed: {err}"));
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn set_no_sigpipe(_rep: &Reporter<'_>, _stream: &TcpStream) {}
