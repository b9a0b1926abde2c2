use bytes::{Buf, BytesMut};
use http::header::{CONTENT_LENGTH, TRAILER};
use http::HeaderName;
use http_body::SizeHint;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{HeaderEncoder, parse_trailer};
use crate::ensure;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError, is_bodiless_status};

/// Encodes a response head followed by its body items.
///
/// A head must come first; body items are rejected until one has been
/// encoded, and another head is rejected until [`PayloadItem::Eof`](crate::protocol::PayloadItem::Eof)
/// ended the body.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_body("response head sent while a body is in progress"));
                }

                let payload_size = if is_bodiless_status(head.status()) { PayloadSize::Empty } else { payload_size };
                let declared_trailers = declared_trailers(&head)?;
                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = Some(PayloadEncoder::from_payload_size(payload_size, declared_trailers));
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(SendError::invalid_body("body item sent before the response head"));
                };

                let eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);
                if eof || result.is_err() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

fn declared_trailers(head: &ResponseHead) -> Result<Vec<HeaderName>, SendError> {
    parse_trailer(head.headers()).map_err(|e| SendError::invalid_trailer(e.to_string()))
}

/// Decides how a response body is framed.
///
/// - 1xx, 204 and 304 never carry a body
/// - a `Trailer` header forces chunked coding and may not be combined with `Content-Length`
/// - an exact body size becomes `Content-Length`
/// - otherwise an explicit `Content-Length` header is honoured, falling back to chunked
pub fn response_payload_size(head: &ResponseHead, size_hint: &SizeHint) -> Result<PayloadSize, SendError> {
    if is_bodiless_status(head.status()) {
        return Ok(PayloadSize::Empty);
    }

    let headers = head.headers();
    if headers.contains_key(TRAILER) {
        ensure!(!headers.contains_key(CONTENT_LENGTH), SendError::invalid_trailer("trailer header cannot be combined with content-length"));
        return Ok(PayloadSize::Chunked);
    }

    if let Some(length) = size_hint.exact() {
        return Ok(if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) });
    }

    let explicit = headers.get(CONTENT_LENGTH).and_then(|value| value.to_str().ok()).and_then(|value| value.trim().parse::<u64>().ok());
    Ok(match explicit {
        Some(length) => PayloadSize::Length(length),
        None => PayloadSize::Chunked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Response, StatusCode};

    fn encode_all(encoder: &mut ResponseEncoder, items: Vec<Message<(ResponseHead, PayloadSize)>>) -> Result<String, SendError> {
        let mut dst = BytesMut::new();
        for item in items {
            encoder.encode(item, &mut dst)?;
        }
        Ok(String::from_utf8(dst.to_vec()).unwrap())
    }

    #[test]
    fn fixed_length_response() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let out = encode_all(
            &mut ResponseEncoder::new(),
            vec![Message::Header((head, PayloadSize::Length(5))), Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), Message::Payload(PayloadItem::Eof)],
        )
        .unwrap();

        assert_eq!(out, "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello");
    }

    #[test]
    fn chunked_response_with_trailers() {
        let head = Response::builder().header("Trailer", "Deno, Node").body(()).unwrap();
        let mut trailers = HeaderMap::new();
        trailers.insert("deno", HeaderValue::from_static("land"));
        trailers.insert("node", HeaderValue::from_static("js"));

        let out = encode_all(
            &mut ResponseEncoder::new(),
            vec![
                Message::Header((head, PayloadSize::Chunked)),
                Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))),
                Message::Payload(PayloadItem::Trailers(trailers)),
                Message::Payload(PayloadItem::Eof),
            ],
        )
        .unwrap();

        assert_eq!(out, "HTTP/1.1 200 OK\r\ntrailer: Deno, Node\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\ndeno: land\r\nnode: js\r\n\r\n");
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        assert!(encode_all(&mut encoder, vec![Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"x")))]).is_err());
    }

    #[test]
    fn payload_size_selection() {
        let plain = Response::builder().body(()).unwrap();
        assert_eq!(response_payload_size(&plain, &SizeHint::with_exact(4)).unwrap(), PayloadSize::Length(4));
        assert_eq!(response_payload_size(&plain, &SizeHint::with_exact(0)).unwrap(), PayloadSize::Empty);
        assert_eq!(response_payload_size(&plain, &SizeHint::new()).unwrap(), PayloadSize::Chunked);

        let explicit = Response::builder().header("Content-Length", "10").body(()).unwrap();
        assert_eq!(response_payload_size(&explicit, &SizeHint::new()).unwrap(), PayloadSize::Length(10));

        let trailer = Response::builder().header("Trailer", "x-sum").body(()).unwrap();
        assert_eq!(response_payload_size(&trailer, &SizeHint::with_exact(4)).unwrap(), PayloadSize::Chunked);

        let conflicting = Response::builder().header("Trailer", "x-sum").header("Content-Length", "4").body(()).unwrap();
        assert!(matches!(response_payload_size(&conflicting, &SizeHint::new()), Err(SendError::InvalidTrailer { .. })));

        let no_content = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        assert_eq!(response_payload_size(&no_content, &SizeHint::with_exact(4)).unwrap(), PayloadSize::Empty);
    }
}
