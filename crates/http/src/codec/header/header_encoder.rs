//! HTTP response head encoder.
//!
//! Writes the status line and header block into a `BytesMut`, setting the
//! framing header that matches the chosen [`PayloadSize`]. Statuses that never
//! carry a body (1xx, 204, 304) are written without any framing header.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::{HeaderName, HeaderValue, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError, is_bodiless_status};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        if header.version() != Version::HTTP_11 {
            error!(http_version = ?header.version(), "unsupported http version");
            return Err(SendError::UnsupportedVersion { version: format!("{:?}", header.version()) });
        }

        let status = header.status();
        let reason = status.canonical_reason().ok_or(SendError::UnknownStatus { status: status.as_u16() })?;

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), reason)?;

        let headers = header.headers_mut();
        if is_bodiless_status(status) {
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::TRANSFER_ENCODING);
        } else {
            match payload_size {
                PayloadSize::Length(n) => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, n.into());
                }
                PayloadSize::Chunked => {
                    headers.remove(header::CONTENT_LENGTH);
                    headers.insert(header::TRANSFER_ENCODING, CHUNKED);
                }
                PayloadSize::Empty => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                }
            }
        }

        write_header_fields(headers.iter(), dst);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writes `name: value\r\n` for each field, in iteration order.
pub fn write_header_fields<'a, I>(fields: I, dst: &mut BytesMut)
where
    I: IntoIterator<Item = (&'a HeaderName, &'a HeaderValue)>,
{
    for (name, value) in fields {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
}

/// `io::Write` adapter so `write!` can format straight into a `BytesMut`.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};
    use indoc::indoc;

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> Result<String, SendError> {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst)?;
        Ok(String::from_utf8(dst.to_vec()).unwrap())
    }

    #[test]
    fn fixed_length_head() {
        let head = Response::builder().status(StatusCode::OK).header("X-Test", "1").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Length(12)).unwrap();

        let expected = indoc! {"
            HTTP/1.1 200 OK
            x-test: 1
            content-length: 12

            "}
        .replace('\n', "\r\n");
        assert_eq!(encoded, expected);
    }

    #[test]
    fn chunked_head_drops_content_length() {
        let head = Response::builder().header("Content-Length", "3").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Chunked).unwrap();

        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("transfer-encoding: chunked\r\n"));
        assert!(!encoded.contains("content-length"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn empty_body_gets_zero_length() {
        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();
        let encoded = encode(head, PayloadSize::Empty).unwrap();
        assert_eq!(encoded, "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn bodiless_statuses_have_no_framing() {
        for status in [StatusCode::SWITCHING_PROTOCOLS, StatusCode::NO_CONTENT, StatusCode::NOT_MODIFIED] {
            let head = Response::builder().status(status).header("Content-Length", "5").body(()).unwrap();
            let encoded = encode(head, PayloadSize::Length(5)).unwrap();
            assert!(!encoded.contains("content-length"), "{status} carried framing");
            assert!(!encoded.contains("transfer-encoding"), "{status} carried framing");
        }
    }

    #[test]
    fn unknown_status() {
        let head = Response::builder().status(599).body(()).unwrap();
        assert!(matches!(encode(head, PayloadSize::Empty), Err(SendError::UnknownStatus { status: 599 })));
    }

    #[test]
    fn unsupported_version() {
        let head = Response::builder().version(Version::HTTP_10).body(()).unwrap();
        assert!(matches!(encode(head, PayloadSize::Empty), Err(SendError::UnsupportedVersion { .. })));
    }
}
