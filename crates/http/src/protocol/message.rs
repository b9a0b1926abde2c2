use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::SizeHint;

/// A head or one piece of a body, as fed to the response encoder.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// One item of a message body stream.
///
/// A body is any number of `Chunk`s, at most one `Trailers` (chunked bodies
/// only) and a closing `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Trailers(HeaderMap),
    Eof,
}

/// How a body is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length: n`
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// No body at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// Exact zero means no body, any other exact size a fixed length, and an
/// unknown size falls back to chunked.
impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }
}

impl PayloadItem {
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_from_size_hint() {
        assert_eq!(PayloadSize::from(SizeHint::with_exact(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::from(SizeHint::with_exact(7)), PayloadSize::Length(7));
        assert_eq!(PayloadSize::from(SizeHint::new()), PayloadSize::Chunked);
    }

    #[test]
    fn size_hint_from_payload_size() {
        assert_eq!(SizeHint::from(PayloadSize::Length(3)).exact(), Some(3));
        assert_eq!(SizeHint::from(PayloadSize::Empty).exact(), Some(0));
        assert_eq!(SizeHint::from(PayloadSize::Chunked).exact(), None);
    }
}
