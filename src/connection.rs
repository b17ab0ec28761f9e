//! Connection pipeline: dial, then optionally SOCKSv5h, then optionally TLS,
//! then the WebSocket upgrade. Each stage hands an owned stream to the next;
//! a failing stage drops the stream, so no socket outlives its attempt.

use crate::dialer;
use crate::emitter::Reporter;
use crate::error::Result;
use crate::params;
use crate::socks5;
use crate::stream::MaybeTlsStream;
use crate::tls;
use crate::util::UrlParts;
use crate::ws::{UpgradeRequest, WsStream};

/// A fully established, framed ndt7 connection.
pub(crate) type Connection = WsStream<MaybeTlsStream>;

/// Establish a connection to `url` according to the configured layers.
pub(crate) async fn establish(rep: &Reporter<'_>, url: &UrlParts) -> Result<Connection> {
    let tcp = match rep.settings.socks5h_port.clone() {
        Some(proxy_port) => {
            let mut tcp = dialer::dial(rep, "127.0.0.1", &proxy_port).await?;
            rep.info("socks5h: connected to proxy");
            socks5::connect(rep, &mut tcp, &url.host, &url.port).await?;
            tcp
        }
        None => {
            rep.debug("socks5h: not configured, connecting directly");
            dialer::dial(rep, &url.host, &url.port).await?
        }
    };
    let stream = tls::maybe_wrap(rep, &url.host, tcp).await?;
    // ndt7 always runs over WebSocket; run() forces the flag on.
    debug_assert!(rep.settings.websocket);
    let request = UpgradeRequest {
        host: &url.host,
        port: &url.port,
        secure: rep.settings.tls,
        path: &url.path,
        protocol: params::SEC_WEBSOCKET_PROTOCOL,
    };
    let ws = WsStream::handshake(rep, stream, &request).await?;
    rep.debug("ndt7: WebSocket connection established");
    Ok(ws)
}
