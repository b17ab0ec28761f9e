//! WebSocket message transport.
//!
//! [`WsStream`] wraps an established, upgraded connection and exposes a
//! message-level API. Control frames never reach the caller: CLOSE is
//! answered and surfaces as `Eof`, PING is answered with PONG, PONG is
//! ignored. Written from scratch while reading RFC 6455.

pub mod frame;
pub mod handshake;

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::stream::{read_exact_timed, write_all_timed};

pub(crate) use self::handshake::UpgradeRequest;

use self::frame::{
    FIN_FLAG, LEN_MASK, MASK_FLAG, OPCODE_BINARY, OPCODE_CLOSE, OPCODE_CONTINUE, OPCODE_MASK,
    OPCODE_PING, OPCODE_PONG, OPCODE_TEXT, RESERVED_MASK,
};

// One parsed frame: opcode, FIN flag, payload byte count.
struct RawFrame {
    opcode: u8,
    fin: bool,
    count: usize,
}

/// A WebSocket connection carrying ndt7 messages.
///
/// Every read and write is bounded by the I/O timeout the stream was built
/// with; protocol violations surface as [`ErrorKind`] values rather than
/// log lines, and the subtest engine decides what to report.
#[derive(Debug)]
pub struct WsStream<S> {
    io: S,
    timeout: Duration,
    rng: SmallRng,
}

impl<S> WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the upgrade handshake on `io` and wrap it.
    pub(crate) async fn handshake(
        rep: &Reporter<'_>,
        mut io: S,
        request: &UpgradeRequest<'_>,
    ) -> Result<Self> {
        handshake::upgrade(rep, &mut io, request).await?;
        Ok(Self::from_upgraded(io, rep.settings.timeout))
    }

    /// Wrap an already-upgraded stream.
    pub fn from_upgraded(io: S, timeout: Duration) -> Self {
        WsStream {
            io,
            timeout,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Draw a fresh masking key.
    pub fn next_mask(&mut self) -> [u8; 4] {
        let mut mask = [0u8; 4];
        self.rng.fill_bytes(&mut mask);
        mask
    }

    /// Send one frame with a fresh mask.
    pub async fn send_frame(&mut self, first_byte: u8, payload: &[u8]) -> Result<()> {
        let mask = self.next_mask();
        let wire = frame::prepare_frame(first_byte, mask, payload);
        write_all_timed(&mut self.io, &wire, self.timeout).await
    }

    /// Send bytes that already form a complete frame.
    pub async fn send_prepared(&mut self, wire: &[u8]) -> Result<()> {
        write_all_timed(&mut self.io, wire, self.timeout).await
    }

    /// Receive one message (TEXT or BINARY), reassembling continuation
    /// frames into `buf`. Returns the opcode of the first frame and the
    /// total payload length. A peer CLOSE surfaces as [`ErrorKind::Eof`].
    pub async fn recv_message(&mut self, buf: &mut [u8]) -> Result<(u8, usize)> {
        let first = self.recv_data_frame(buf).await?;
        if first.opcode != OPCODE_TEXT && first.opcode != OPCODE_BINARY {
            return Err(ErrorKind::WsProto);
        }
        let mut count = first.count;
        if first.fin {
            return Ok((first.opcode, count));
        }
        while count < buf.len() {
            let next = self.recv_data_frame(&mut buf[count..]).await?;
            if next.opcode != OPCODE_CONTINUE {
                return Err(ErrorKind::WsProto);
            }
            count = count
                .checked_add(next.count)
                .ok_or(ErrorKind::ValueTooLarge)?;
            if next.fin {
                return Ok((first.opcode, count));
            }
        }
        // Buffer exhausted with FIN still unseen.
        Err(ErrorKind::MessageSize)
    }

    // Receive frames until a data frame arrives, handling control frames
    // transparently. Control frames MAY be injected in the middle of a
    // fragmented message and MUST NOT themselves be fragmented (RFC 6455
    // Sect. 5.4/5.5).
    async fn recv_data_frame(&mut self, buf: &mut [u8]) -> Result<RawFrame> {
        loop {
            let f = self.recv_any_frame(buf).await?;
            match f.opcode {
                OPCODE_CLOSE => {
                    // We MUST reply with CLOSE (Sect. 5.5.1) and may then
                    // treat the connection as finished.
                    let _ = self.send_frame(OPCODE_CLOSE | FIN_FLAG, &[]).await;
                    return Err(ErrorKind::Eof);
                }
                OPCODE_PING => {
                    let echo = buf[..f.count].to_vec();
                    self.send_frame(OPCODE_PONG | FIN_FLAG, &echo).await?;
                }
                OPCODE_PONG => {}
                _ => return Ok(f),
            }
        }
    }

    // Receive a single frame of any kind into `buf`.
    async fn recv_any_frame(&mut self, buf: &mut [u8]) -> Result<RawFrame> {
        let mut header = [0u8; 2];
        read_exact_timed(&mut self.io, &mut header, self.timeout).await?;
        let fin = header[0] & FIN_FLAG != 0;
        // Reserved bits only make sense for extensions, which we do not
        // negotiate (Sect. 5.2).
        if header[0] & RESERVED_MASK != 0 {
            return Err(ErrorKind::WsProto);
        }
        let opcode = header[0] & OPCODE_MASK;
        match opcode {
            OPCODE_CONTINUE | OPCODE_TEXT | OPCODE_BINARY | OPCODE_CLOSE | OPCODE_PING
            | OPCODE_PONG => {}
            _ => return Err(ErrorKind::WsProto),
        }
        // A server MUST NOT mask its frames (Sect. 5.1).
        if header[1] & MASK_FLAG != 0 {
            return Err(ErrorKind::InvalidArgument);
        }
        let mut length = (header[1] & LEN_MASK) as u64;
        // Control messages MUST have a payload of 125 bytes or less and
        // MUST NOT be fragmented (Sect. 5.5).
        if matches!(opcode, OPCODE_CLOSE | OPCODE_PING | OPCODE_PONG)
            && (length > 125 || !fin)
        {
            return Err(ErrorKind::WsProto);
        }
        if length == 126 {
            let mut ext = [0u8; 2];
            read_exact_timed(&mut self.io, &mut ext, self.timeout).await?;
            length = u16::from_be_bytes(ext) as u64;
        } else if length == 127 {
            let mut ext = [0u8; 8];
            read_exact_timed(&mut self.io, &mut ext, self.timeout).await?;
            if ext[0] & 0x80 != 0 {
                // "the most significant bit MUST be 0" (Sect. 5.2)
                return Err(ErrorKind::WsProto);
            }
            length = u64::from_be_bytes(ext);
        }
        if length > buf.len() as u64 {
            return Err(ErrorKind::MessageSize);
        }
        let count = length as usize;
        if count > 0 {
            read_exact_timed(&mut self.io, &mut buf[..count], self.timeout).await?;
        }
        Ok(RawFrame { opcode, fin, count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    // Build an unmasked, server-style frame.
    fn server_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
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

    fn fixture() -> (WsStream<DuplexStream>, DuplexStream) {
        let (client, peer) = tokio::io::duplex(4 * 1024 * 1024);
        (
            WsStream::from_upgraded(client, Duration::from_millis(500)),
            peer,
        )
    }

    #[tokio::test]
    async fn receives_single_frame_messages() {
        let (mut ws, mut peer) = fixture();
        for (opcode, payload) in [
            (OPCODE_TEXT, b"{\"x\":1}".to_vec()),
            (OPCODE_BINARY, vec![7u8; 100_000]),
        ] {
            peer.write_all(&server_frame(opcode | FIN_FLAG, &payload))
                .await
                .unwrap();
            let mut buf = vec![0u8; 1 << 20];
            let (op, count) = ws.recv_message(&mut buf).await.unwrap();
            assert_eq!(op, opcode);
            assert_eq!(&buf[..count], &payload[..]);
        }
    }

    #[tokio::test]
    async fn reassembles_fragmented_messages() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_TEXT, b"hello "))
            .await
            .unwrap();
        peer.write_all(&server_frame(OPCODE_CONTINUE, b"wor"))
            .await
            .unwrap();
        peer.write_all(&server_frame(OPCODE_CONTINUE | FIN_FLAG, b"ld"))
            .await
            .unwrap();
        let mut buf = vec![0u8; 64];
        let (op, count) = ws.recv_message(&mut buf).await.unwrap();
        assert_eq!(op, OPCODE_TEXT);
        assert_eq!(&buf[..count], b"hello world");
    }

    #[tokio::test]
    async fn rejects_non_continuation_in_fragment_stream() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_TEXT, b"part"))
            .await
            .unwrap();
        peer.write_all(&server_frame(OPCODE_TEXT | FIN_FLAG, b"again"))
            .await
            .unwrap();
        let mut buf = vec![0u8; 64];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn rejects_reserved_bits() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&[0xD1, 0x00]).await.unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn rejects_unknown_opcode() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&[FIN_FLAG | 0x3, 0]).await.unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn rejects_masked_server_frame() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&[OPCODE_TEXT | FIN_FLAG, MASK_FLAG | 1])
            .await
            .unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::InvalidArgument
        );
    }

    #[tokio::test]
    async fn rejects_oversized_control_frame() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&[OPCODE_PING | FIN_FLAG, 126, 0x00, 0x80])
            .await
            .unwrap();
        let mut buf = vec![0u8; 256];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn rejects_fragmented_control_frame() {
        let (mut ws, mut peer) = fixture();
        // PING without FIN
        peer.write_all(&[OPCODE_PING, 0]).await.unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn rejects_64bit_length_with_top_bit_set() {
        let (mut ws, mut peer) = fixture();
        let mut bytes = vec![OPCODE_BINARY | FIN_FLAG, 127];
        bytes.extend_from_slice(&[0x80, 0, 0, 0, 0, 0, 0, 1]);
        peer.write_all(&bytes).await.unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::WsProto
        );
    }

    #[tokio::test]
    async fn reports_message_size_when_frame_exceeds_buffer() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_BINARY | FIN_FLAG, &[0u8; 64]))
            .await
            .unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::MessageSize
        );
    }

    #[tokio::test]
    async fn close_is_answered_and_surfaces_as_eof() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_CLOSE | FIN_FLAG, &[]))
            .await
            .unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(
            ws.recv_message(&mut buf).await.unwrap_err(),
            ErrorKind::Eof
        );
        // The reply on the wire is a masked CLOSE with FIN.
        let mut reply = [0u8; 6];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], OPCODE_CLOSE | FIN_FLAG);
        assert_eq!(reply[1], MASK_FLAG); // empty payload, mask flag set
    }

    #[tokio::test]
    async fn ping_is_answered_with_echoing_pong() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_PING | FIN_FLAG, b"hi"))
            .await
            .unwrap();
        peer.write_all(&server_frame(OPCODE_TEXT | FIN_FLAG, b"{}"))
            .await
            .unwrap();
        let mut buf = vec![0u8; 64];
        let (op, count) = ws.recv_message(&mut buf).await.unwrap();
        assert_eq!((op, &buf[..count]), (OPCODE_TEXT, &b"{}"[..]));
        // Inspect the PONG the client sent.
        let mut pong = [0u8; 8]; // 2 header + 4 mask + 2 payload
        peer.read_exact(&mut pong).await.unwrap();
        assert_eq!(pong[0], OPCODE_PONG | FIN_FLAG);
        assert_eq!(pong[1], MASK_FLAG | 2);
        let mask: [u8; 4] = pong[2..6].try_into().unwrap();
        let mut payload = [pong[6], pong[7]];
        frame::apply_mask(mask, &mut payload);
        assert_eq!(&payload, b"hi");
    }

    #[tokio::test]
    async fn pong_frames_are_ignored() {
        let (mut ws, mut peer) = fixture();
        peer.write_all(&server_frame(OPCODE_PONG | FIN_FLAG, b"x"))
            .await
            .unwrap();
        peer.write_all(&server_frame(OPCODE_BINARY | FIN_FLAG, b"data"))
            .await
            .unwrap();
        let mut buf = vec![0u8; 64];
        let (op, count) = ws.recv_message(&mut buf).await.unwrap();
        assert_eq!((op, count), (OPCODE_BINARY, 4));
    }

    #[tokio::test]
    async fn sent_frames_round_trip_through_decoder() {
        let (mut ws, mut peer) = fixture();
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        ws.send_frame(OPCODE_BINARY | FIN_FLAG, &payload)
            .await
            .unwrap();
        // Parse what landed on the wire.
        let mut header = [0u8; 2];
        peer.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], OPCODE_BINARY | FIN_FLAG);
        assert_eq!(header[1], MASK_FLAG | 127);
        let mut ext = [0u8; 8];
        peer.read_exact(&mut ext).await.unwrap();
        assert_eq!(u64::from_be_bytes(ext), payload.len() as u64);
        let mut mask = [0u8; 4];
        peer.read_exact(&mut mask).await.unwrap();
        let mut body = vec![0u8; payload.len()];
        peer.read_exact(&mut body).await.unwrap();
        frame::apply_mask(mask, &mut body);
        assert_eq!(body, payload);
    }
}
