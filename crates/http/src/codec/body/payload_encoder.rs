use bytes::{Buf, BytesMut};
use http::HeaderName;
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Encodes a response body with the framing chosen for its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// no body, or a status that must not carry one
    NoBody { eof: bool },
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody { eof: false } }
    }

    pub fn chunked(declared_trailers: Vec<HeaderName>) -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new(declared_trailers)) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn from_payload_size(payload_size: PayloadSize, declared_trailers: Vec<HeaderName>) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadEncoder::fix_length(size),
            PayloadSize::Chunked => PayloadEncoder::chunked(declared_trailers),
            PayloadSize::Empty => PayloadEncoder::empty(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::NoBody { eof } => *eof,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody { eof } => match item {
                PayloadItem::Chunk(bytes) if bytes.has_remaining() => Err(SendError::invalid_body("response must not carry a body")),
                PayloadItem::Chunk(_) => Ok(()),
                PayloadItem::Trailers(_) => Err(SendError::invalid_trailer("trailers require chunked transfer-encoding")),
                PayloadItem::Eof => {
                    *eof = true;
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn empty_rejects_data() {
        let mut encoder = PayloadEncoder::empty();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"x")), &mut dst).is_err());
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        assert!(encoder.is_finish());
        assert!(dst.is_empty());
    }

    #[test]
    fn selects_framing_from_size() {
        assert!(PayloadEncoder::from_payload_size(PayloadSize::Chunked, Vec::new()).is_chunked());
        assert!(!PayloadEncoder::from_payload_size(PayloadSize::Length(3), Vec::new()).is_chunked());
    }
}
