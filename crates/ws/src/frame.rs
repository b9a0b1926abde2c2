//! RFC 6455 frame layout.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tern_http::io::{BufError, BufReader};
use tokio::io::AsyncRead;
use tokio_util::codec::Encoder;

use crate::WsError;

const FIN: u8 = 0x80;
const RSV: u8 = 0x70;
const OPCODE: u8 = 0x0F;
const MASK: u8 = 0x80;
const LEN: u8 = 0x7F;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest close reason in bytes, leaving room for the status code.
pub const MAX_CLOSE_REASON: usize = MAX_CONTROL_PAYLOAD - 2;

/// Close status codes used by the session.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Reported for a close frame without a body; never sent on the wire.
    pub const NO_STATUS: u16 = 1005;
    /// Reported when the connection dropped without a close frame; never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_PAYLOAD: u16 = 1007;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(OpCode::Continue),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// One WebSocket frame. `payload` is always held unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub is_last_frame: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self { is_last_frame: true, opcode, mask: None, payload: payload.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpCode::Text, text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data)
    }

    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data)
    }

    /// A close frame; [`close_code::NO_STATUS`] produces an empty payload.
    ///
    /// The reason is cut with [`truncate_close_reason`] so the frame stays a
    /// valid control frame.
    pub fn close(code: u16, reason: &str) -> Self {
        if code == close_code::NO_STATUS {
            return Self::new(OpCode::Close, Bytes::new());
        }

        let reason = truncate_close_reason(reason);
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload.freeze())
    }

    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_last_frame(mut self, is_last_frame: bool) -> Self {
        self.is_last_frame = is_last_frame;
        self
    }
}

/// Cuts `reason` to at most [`MAX_CLOSE_REASON`] bytes on a char boundary.
pub fn truncate_close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }

    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// XORs `payload` with `mask`. Applying the same mask twice restores the input.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Serializes frames, masking the payload when the frame carries a mask.
///
/// Control frames that are fragmented or carry more than
/// [`MAX_CONTROL_PAYLOAD`] bytes are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.payload.len();
        if frame.opcode.is_control() {
            if !frame.is_last_frame {
                return Err(WsError::protocol_error("fragmented control frame"));
            }
            if len > MAX_CONTROL_PAYLOAD {
                return Err(WsError::protocol_error(format!("control frame payload of {len} bytes")));
            }
        }
        dst.reserve(14 + len);

        let fin = if frame.is_last_frame { FIN } else { 0 };
        dst.put_u8(fin | frame.opcode.as_u8());

        let mask_bit = if frame.mask.is_some() { MASK } else { 0 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len < 65536 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match frame.mask {
            Some(mask) => {
                dst.put_slice(&mask);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], mask);
            }
            None => dst.put_slice(&frame.payload),
        }
        Ok(())
    }
}

/// Reads one frame. Returns `None` if the stream ended before the first byte.
///
/// Payloads larger than `max_payload_size` are rejected before they are read.
pub async fn read_frame<R>(reader: &mut BufReader<R>, max_payload_size: usize) -> Result<Option<Frame>, WsError>
where
    R: AsyncRead + Unpin,
{
    let Some(b0) = reader.read_byte().await? else {
        return Ok(None);
    };
    let b1 = reader.read_byte().await?.ok_or(WsError::TruncatedFrame { read: 1, expected: 2 })?;

    if b0 & RSV != 0 {
        return Err(WsError::protocol_error(format!("reserved bits set in {b0:#04x}")));
    }
    let is_last_frame = b0 & FIN != 0;
    let opcode = OpCode::from_u8(b0 & OPCODE).ok_or_else(|| WsError::protocol_error(format!("unknown opcode {:#x}", b0 & OPCODE)))?;

    let length = match b1 & LEN {
        126 => {
            let mut buf = [0u8; 2];
            read_exact(reader, &mut buf).await?;
            u64::from(u16::from_be_bytes(buf))
        }
        127 => {
            let mut buf = [0u8; 8];
            read_exact(reader, &mut buf).await?;
            let length = u64::from_be_bytes(buf);
            if length >> 63 != 0 {
                return Err(WsError::protocol_error("most significant bit of a 64-bit length is set"));
            }
            length
        }
        length => u64::from(length),
    };

    if opcode.is_control() {
        if !is_last_frame {
            return Err(WsError::protocol_error("fragmented control frame"));
        }
        if length > MAX_CONTROL_PAYLOAD as u64 {
            return Err(WsError::protocol_error(format!("control frame payload of {length} bytes")));
        }
    }
    if length > max_payload_size as u64 {
        return Err(WsError::PayloadTooLarge { size: length, max: max_payload_size });
    }

    let mask = if b1 & MASK != 0 {
        let mut mask = [0u8; 4];
        read_exact(reader, &mut mask).await?;
        Some(mask)
    } else {
        None
    };

    let mut payload = BytesMut::zeroed(length as usize);
    read_exact(reader, &mut payload).await?;
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some(Frame { is_last_frame, opcode, mask, payload: payload.freeze() }))
}

async fn read_exact<R>(reader: &mut BufReader<R>, dst: &mut [u8]) -> Result<(), WsError>
where
    R: AsyncRead + Unpin,
{
    if dst.is_empty() {
        return Ok(());
    }

    match reader.read_full(dst).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(WsError::TruncatedFrame { read: 0, expected: dst.len() }),
        Err(BufError::PartialRead { partial }) => Err(WsError::TruncatedFrame { read: partial.len(), expected: dst.len() }),
        Err(e) => Err(e.into()),
    }
}
