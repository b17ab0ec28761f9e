//! RFC 6455 frame construction.
//!
//! Only the client side of the framing is built here: frames we send always
//! carry the MASK flag, and the payload is XOR-masked in place of the copy.
//! Parsing of incoming frames lives in the stream layer, which owns the
//! socket reads.

use bytes::{BufMut, Bytes, BytesMut};

/// Continuation frame opcode.
pub const OPCODE_CONTINUE: u8 = 0x0;
/// Text frame opcode.
pub const OPCODE_TEXT: u8 = 0x1;
/// Binary frame opcode.
pub const OPCODE_BINARY: u8 = 0x2;
/// Close control frame opcode.
pub const OPCODE_CLOSE: u8 = 0x8;
/// Ping control frame opcode.
pub const OPCODE_PING: u8 = 0x9;
/// Pong control frame opcode.
pub const OPCODE_PONG: u8 = 0xA;

/// FIN bit of the first frame byte.
pub const FIN_FLAG: u8 = 0x80;
/// Reserved bits of the first frame byte; must be zero without extensions.
pub const RESERVED_MASK: u8 = 0x70;
/// Opcode bits of the first frame byte.
pub const OPCODE_MASK: u8 = 0x0f;
/// MASK bit of the second frame byte.
pub const MASK_FLAG: u8 = 0x80;
/// Length bits of the second frame byte.
pub const LEN_MASK: u8 = 0x7f;

/// Build a masked frame with the given first byte (opcode plus flags),
/// masking key, and payload.
///
/// The length field uses the shortest of the three encodings and is emitted
/// big-endian, as required by RFC 6455 §5.2.
pub fn prepare_frame(first_byte: u8, mask: [u8; 4], payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 14);
    out.put_u8(first_byte);
    let count = payload.len() as u64;
    if count < 126 {
        out.put_u8((count as u8 & LEN_MASK) | MASK_FLAG);
    } else if count < (1 << 16) {
        out.put_u8((126 & LEN_MASK) | MASK_FLAG);
        out.put_u16(count as u16);
    } else {
        out.put_u8((127 & LEN_MASK) | MASK_FLAG);
        out.put_u64(count);
    }
    out.put_slice(&mask);
    for (i, byte) in payload.iter().enumerate() {
        out.put_u8(byte ^ mask[i % 4]);
    }
    out.freeze()
}

/// XOR a buffer with the masking key, cyclically. Masking is symmetric, so
/// this both masks and unmasks.
pub fn apply_mask(mask: [u8; 4], data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
