//! HTTP/1.1 to WebSocket upgrade handshake.

use base64::prelude::*;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::params;
use crate::stream::{read_exact_timed, write_all_timed};

// Headers that must all be observed in the upgrade response.
const F_CONNECTION: u8 = 1 << 0;
const F_ACCEPT: u8 = 1 << 1;
const F_PROTOCOL: u8 = 1 << 2;
const F_UPGRADE: u8 = 1 << 3;
const F_ALL: u8 = F_CONNECTION | F_ACCEPT | F_PROTOCOL | F_UPGRADE;

/// Parameters of one upgrade request.
pub(crate) struct UpgradeRequest<'a> {
    pub(crate) host: &'a str,
    pub(crate) port: &'a str,
    pub(crate) secure: bool,
    pub(crate) path: &'a str,
    pub(crate) protocol: &'a str,
}

/// A fresh Sec-WebSocket-Key: sixteen random bytes, base64-encoded.
pub(crate) fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(nonce)
}

/// The Sec-WebSocket-Accept value a compliant server must answer `key`
/// with. Public so server stubs in tests can complete the handshake.
pub fn accept_for_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11"); // magic string
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Drive the upgrade handshake on an established stream.
///
/// The response is read line by line with bounded line length and header
/// count. `Upgrade`, `Connection`, the accept value matching the key we
/// sent, and the echoed subprotocol must all appear before the blank line.
pub(crate) async fn upgrade<S>(
    rep: &Reporter<'_>,
    io: &mut S,
    req: &UpgradeRequest<'_>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let expected_accept = format!("Sec-WebSocket-Accept: {}", accept_for_key(&key));
    let proto_header = format!("Sec-WebSocket-Protocol: {}", req.protocol);

    // RFC 6455 Sect. 4.1: the port is only added when it is not the default
    // for the scheme.
    let default_port = if req.secure { "443" } else { "80" };
    let host_header = if req.port == default_port {
        format!("Host: {}", req.host)
    } else {
        format!("Host: {}:{}", req.host, req.port)
    };

    let lines = [
        format!("GET {} HTTP/1.1", req.path),
        host_header,
        "Upgrade: websocket".to_string(),
        "Connection: Upgrade".to_string(),
        format!("Sec-WebSocket-Key: {key}"),
        proto_header.clone(),
        "Sec-WebSocket-Version: 13".to_string(),
        String::new(),
    ];
    for line in &lines {
        send_line(rep, io, line).await.inspect_err(|_| {
            rep.warn("ws: cannot send HTTP upgrade request");
        })?;
    }
    rep.debug("ws: sent HTTP/1.1 upgrade request");

    let status = recv_line(rep, io).await?;
    if status != "HTTP/1.1 101 Switching Protocols" {
        rep.warn("ws: unexpected response line");
        return Err(ErrorKind::WsProto);
    }
    let mut flags = 0u8;
    for _ in 0..params::MAX_UPGRADE_HEADERS {
        let line = recv_line(rep, io).await?;
        if line == "Upgrade: websocket" {
            flags |= F_UPGRADE;
        } else if line == "Connection: Upgrade" {
            flags |= F_CONNECTION;
        } else if line == expected_accept {
            flags |= F_ACCEPT;
        } else if line == proto_header {
            flags |= F_PROTOCOL;
        } else if line.is_empty() {
            if flags != F_ALL {
                rep.warn("ws: received incorrect handshake");
                return Err(ErrorKind::WsProto);
            }
            rep.debug("ws: handshake complete");
            return Ok(());
        }
    }
    rep.warn("ws: got too many headers");
    Err(ErrorKind::ValueTooLarge)
}

async fn send_line<S>(rep: &Reporter<'_>, io: &mut S, line: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    rep.debug(&format!("> {line}"));
    let mut wire = String::with_capacity(line.len() + 2);
    wire.push_str(line);
    wire.push_str("\r\n");
    write_all_timed(io, wire.as_bytes(), rep.settings.timeout).await
}

async fn recv_line<S>(rep: &Reporter<'_>, io: &mut S) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        let mut ch = [0u8; 1];
        read_exact_timed(io, &mut ch, rep.settings.timeout).await?;
        match ch[0] {
            b'\r' => continue,
            b'\n' => {
                rep.debug(&format!("< {line}"));
                return Ok(line);
            }
            byte => {
                if line.len() >= params::MAX_HEADER_LINE {
                    rep.warn("ws: header line too long");
                    return Err(ErrorKind::ValueTooLarge);
                }
                line.push(byte as char);
            }
        }
    }
}
