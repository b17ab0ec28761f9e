//! SOCKSv5h CONNECT handshake.
//!
//! The proxy carries both DNS and TCP: the target is always sent as a domain
//! name (address type `0x03`), so name resolution happens remotely. The
//! transport is generic, which lets the tests drive the state machine with
//! scripted byte streams.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::stream::{read_exact_timed, write_all_timed};
use crate::util::strtonum;

const SOCKS_VERSION: u8 = 5;
const METHOD_NO_AUTH: u8 = 0;
const CMD_CONNECT: u8 = 1;
const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// Negotiate a SOCKSv5h tunnel to `hostname:port` on an established proxy
/// connection. On success the stream behaves as if directly connected to the
/// target; on failure the caller must discard the stream.
pub(crate) async fn connect<S>(
    rep: &Reporter<'_>,
    stream: &mut S,
    hostname: &str,
    port: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let timeout = rep.settings.timeout;

    let auth_request = [SOCKS_VERSION, 1, METHOD_NO_AUTH];
    write_all_timed(stream, &auth_request, timeout)
        .await
        .inspect_err(|_| rep.warn("socks5h: cannot send auth request"))?;

    let mut auth_response = [0u8; 2];
    read_exact_timed(stream, &mut auth_response, timeout)
        .await
        .inspect_err(|_| rep.warn("socks5h: cannot recv auth response"))?;
    if auth_response[0] != SOCKS_VERSION {
        rep.warn("socks5h: received unexpected version number");
        return Err(ErrorKind::Socks5h);
    }
    if auth_response[1] != METHOD_NO_AUTH {
        rep.warn("socks5h: received unexpected auth method");
        return Err(ErrorKind::Socks5h);
    }
    rep.debug("socks5h: authenticated with proxy");

    if hostname.len() > u8::MAX as usize {
        rep.warn("socks5h: hostname is too long");
        return Err(ErrorKind::InvalidArgument);
    }
    let port_num = match strtonum(port, 0, u16::MAX as i64) {
        Ok(n) => n as u16,
        Err(reason) => {
            rep.warn(&format!("socks5h: invalid port number: {reason}"));
            return Err(ErrorKind::InvalidArgument);
        }
    };
    let mut connect_request = Vec::with_capacity(7 + hostname.len());
    connect_request.extend_from_slice(&[SOCKS_VERSION, CMD_CONNECT, 0, ATYP_DOMAIN]);
    connect_request.push(hostname.len() as u8);
    connect_request.extend_from_slice(hostname.as_bytes());
    connect_request.extend_from_slice(&port_num.to_be_bytes());
    write_all_timed(stream, &connect_request, timeout)
        .await
        .inspect_err(|_| rep.warn("socks5h: cannot send connect request"))?;
    rep.debug("socks5h: sent connect request");

    let mut header = [0u8; 4];
    read_exact_timed(stream, &mut header, timeout)
        .await
        .inspect_err(|_| rep.warn("socks5h: cannot recv connect response"))?;
    if header[0] != SOCKS_VERSION {
        rep.warn("socks5h: invalid message version");
        return Err(ErrorKind::Socks5h);
    }
    if header[1] != 0 {
        rep.warn(&format!("socks5h: connect() failed: {}", header[1]));
        return Err(ErrorKind::IoError);
    }
    if header[2] != 0 {
        rep.warn("socks5h: invalid reserved field");
        return Err(ErrorKind::Socks5h);
    }
    match header[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            read_exact_timed(stream, &mut addr, timeout)
                .await
                .inspect_err(|_| rep.warn("socks5h: cannot recv ipv4 address"))?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_exact_timed(stream, &mut len, timeout)
                .await
                .inspect_err(|_| rep.warn("socks5h: cannot recv domain length"))?;
            let mut domain = vec![0u8; len[0] as usize];
            read_exact_timed(stream, &mut domain, timeout)
                .await
                .inspect_err(|_| rep.warn("socks5h: cannot recv domain"))?;
            rep.debug(&format!(
                "socks5h: domain: {}",
                String::from_utf8_lossy(&domain)
            ));
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            read_exact_timed(stream, &mut addr, timeout)
                .await
                .inspect_err(|_| rep.warn("socks5h: cannot recv ipv6 address"))?;
        }
        _ => {
            rep.warn("socks5h: invalid address type");
            return Err(ErrorKind::Socks5h);
        }
    }
    let mut bound_port = [0u8; 2];
    read_exact_timed(stream, &mut bound_port, timeout)
        .await
        .inspect_err(|_| rep.warn("socks5h: cannot recv port"))?;
    rep.debug(&format!(
        "socks5h: port number: {}",
        u16::from_be_bytes(bound_port)
    ));
    rep.info("socks5h: the proxy has successfully connected");
    Ok(())
}
