use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadItem, SendError};

/// Writes a body whose size was announced with `Content-Length`.
///
/// The producer must yield exactly the announced number of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let len = bytes.remaining() as u64;
                if len > self.length {
                    return Err(SendError::invalid_body(format!("body exceeds content-length by {} bytes", len - self.length)));
                }
                dst.put(bytes);
                self.length -= len;
                Ok(())
            }
            PayloadItem::Trailers(_) => Err(SendError::invalid_trailer("trailers require chunked transfer-encoding")),
            PayloadItem::Eof => {
                if self.length != 0 {
                    return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.length)));
                }
                self.eof = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_exact_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hel")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"hello");
        assert!(encoder.is_finish());
    }

    #[test]
    fn rejects_overflow() {
        let mut encoder = LengthEncoder::new(2);
        let mut dst = BytesMut::new();
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).is_err());
        assert!(dst.is_empty());
    }

    #[test]
    fn rejects_short_body() {
        let mut encoder = LengthEncoder::new(4);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ab")), &mut dst).unwrap();
        assert!(matches!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst), Err(SendError::InvalidBody { .. })));
    }
}
