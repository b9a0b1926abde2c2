//! Unified body reader for a request.
//!
//! The framing chosen by the head decoder is represented as a tagged variant
//! with a single `read` capability, so callers never branch on the framing.

use bytes::BytesMut;
use http::{HeaderMap, HeaderName};
use tokio::io::AsyncRead;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::io::BufReader;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Largest chunk handed out by [`PayloadDecoder::decode`].
const MAX_ITEM_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Creates a chunked body reader expecting the given trailer names.
    pub fn chunked(declared_trailers: Vec<HeaderName>) -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new(declared_trailers)) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_fix_length(&self) -> bool {
        matches!(self.kind, Kind::Length(_))
    }

    pub fn payload_size(&self) -> PayloadSize {
        match &self.kind {
            Kind::Length(decoder) => PayloadSize::Length(decoder.remaining()),
            Kind::Chunked(_) => PayloadSize::Chunked,
            Kind::NoBody => PayloadSize::Empty,
        }
    }

    /// Reads body bytes into `dst`. Returns `None` at the end of the body.
    pub async fn read<R>(&mut self, reader: &mut BufReader<R>, dst: &mut [u8]) -> Result<Option<usize>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.read(reader, dst).await,
            Kind::Chunked(decoder) => decoder.read(reader, dst).await,
            Kind::NoBody => Ok(None),
        }
    }

    /// Trailers received after a chunked body, available once `read` returned `None`.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        match &mut self.kind {
            Kind::Chunked(decoder) => decoder.take_trailers(),
            _ => None,
        }
    }

    /// Reads the next body item: a data chunk, the trailers, or the end marker.
    pub async fn decode<R>(&mut self, reader: &mut BufReader<R>) -> Result<PayloadItem, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        let capacity = match &self.kind {
            Kind::Length(decoder) => decoder.remaining().min(MAX_ITEM_SIZE as u64) as usize,
            Kind::Chunked(_) => MAX_ITEM_SIZE,
            Kind::NoBody => 0,
        };

        let mut buf = BytesMut::zeroed(capacity);
        match self.read(reader, &mut buf).await? {
            Some(n) => Ok(PayloadItem::Chunk(buf.split_to(n).freeze())),
            None => Ok(self.take_trailers().map_or(PayloadItem::Eof, PayloadItem::Trailers)),
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => PayloadDecoder::fix_length(length),
            PayloadSize::Chunked => PayloadDecoder::chunked(Vec::new()),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decode_items_until_eof() {
        let mut reader = BufReader::new(&b"3\r\nabc\r\n2\r\nde\r\n0\r\nX-Sum: 5\r\n\r\n"[..]);
        let mut decoder = PayloadDecoder::chunked(vec![HeaderName::from_static("x-sum")]);

        assert_eq!(decoder.decode(&mut reader).await.unwrap().into_bytes().unwrap(), &b"abc"[..]);
        assert_eq!(decoder.decode(&mut reader).await.unwrap().into_bytes().unwrap(), &b"de"[..]);

        match decoder.decode(&mut reader).await.unwrap() {
            PayloadItem::Trailers(trailers) => assert_eq!(trailers["x-sum"], "5"),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(decoder.decode(&mut reader).await.unwrap().is_eof());
    }

    #[tokio::test]
    async fn fixed_length_items() {
        let mut reader = BufReader::new(&b"hello world"[..]);
        let mut decoder = PayloadDecoder::fix_length(5);

        assert_eq!(decoder.payload_size(), PayloadSize::Length(5));
        assert_eq!(decoder.decode(&mut reader).await.unwrap().into_bytes().unwrap(), &b"hello"[..]);
        assert!(decoder.decode(&mut reader).await.unwrap().is_eof());
        assert_eq!(reader.buffer(), b" world");
    }

    #[tokio::test]
    async fn no_body() {
        let mut reader = BufReader::new(&b"GET / HTTP/1.1\r\n"[..]);
        let mut decoder = PayloadDecoder::empty();

        assert!(decoder.decode(&mut reader).await.unwrap().is_eof());
        assert_eq!(reader.buffered(), 0);
    }
}
