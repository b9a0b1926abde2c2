//! HTTP request head decoder.
//!
//! Reads the request line and header block from a [`BufReader`], validates the
//! framing headers and selects the body reader for the message:
//!
//! 1. `Content-Length` present: fixed-length body (after duplicate values are collapsed)
//! 2. `Transfer-Encoding` ending in `chunked`: chunked body, with declared trailers
//! 3. otherwise: no body
//!
//! `Content-Length` and `Transfer-Encoding` together are rejected, as is a
//! `HEAD` request with a non-zero `Content-Length`.

use http::header::{CONTENT_LENGTH, TRAILER, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use tokio::io::AsyncRead;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::mime_reader::{HeaderBudget, MAX_HEADER_BYTES, read_mime_header_with_budget, read_physical_line};
use crate::ensure;
use crate::io::BufReader;
use crate::protocol::{ParseError, RequestHeader};

/// Upper bound for the major and minor parts of an `HTTP/x.y` version string.
const MAX_VERSION_PART: u32 = 1_000_000;

/// Header names that may never be sent as trailers.
const PROHIBITED_TRAILERS: [HeaderName; 3] = [TRAILER, CONTENT_LENGTH, TRANSFER_ENCODING];

#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderDecoder;

impl HeaderDecoder {
    /// Reads one request head.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before a new request starts.
    pub async fn decode<R>(&mut self, reader: &mut BufReader<R>) -> Result<Option<(RequestHeader, PayloadDecoder)>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        let mut budget = HeaderBudget::new(MAX_HEADER_BYTES);

        // empty lines ahead of a request line are tolerated
        let line = loop {
            match read_physical_line(reader, &mut budget).await? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let (method, uri, version) = parse_request_line(&line)?;
        let headers = read_mime_header_with_budget(reader, &mut budget).await?;
        trace!(%method, %uri, ?version, header_count = headers.len(), "parsed request head");

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        *request.headers_mut() = headers;

        let mut header = RequestHeader::from(request);
        let payload_decoder = parse_payload(&mut header)?;

        Ok(Some((header, payload_decoder)))
    }
}

fn parse_request_line(line: &[u8]) -> Result<(Method, Uri, Version), ParseError> {
    let line = std::str::from_utf8(line).map_err(|_invalid| ParseError::malformed_start_line(String::from_utf8_lossy(line)))?;

    let mut parts = line.splitn(3, ' ');
    let (Some(method), Some(target), Some(proto)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseError::malformed_start_line(line));
    };

    let method = Method::from_bytes(method.as_bytes()).map_err(|_invalid| ParseError::InvalidMethod)?;
    let uri = target.parse::<Uri>().map_err(|_invalid| ParseError::InvalidUri)?;

    let version = match parse_http_version(proto)? {
        (1, 0) => Version::HTTP_10,
        (1, 1) => Version::HTTP_11,
        _ => return Err(ParseError::malformed_version(proto)),
    };

    Ok((method, uri, version))
}

/// Parses `HTTP/x.y` into `(x, y)`.
pub fn parse_http_version(proto: &str) -> Result<(u32, u32), ParseError> {
    match proto {
        "HTTP/1.1" => return Ok((1, 1)),
        "HTTP/1.0" => return Ok((1, 0)),
        _ => {}
    }

    let malformed = || ParseError::malformed_version(proto);

    let rest = proto.strip_prefix("HTTP/").ok_or_else(malformed)?;
    let (major, minor) = rest.split_once('.').ok_or_else(malformed)?;

    let parse_part = |part: &str| -> Result<u32, ParseError> {
        ensure!(!part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()), malformed());
        let value = part.parse::<u32>().map_err(|_invalid| malformed())?;
        ensure!(value <= MAX_VERSION_PART, malformed());
        Ok(value)
    };

    Ok((parse_part(major)?, parse_part(minor)?))
}

/// Collapses duplicate `Content-Length` values and validates them against the method
/// and `Transfer-Encoding`.
fn fix_length(method: &Method, headers: &mut HeaderMap) -> Result<Option<u64>, ParseError> {
    if !headers.contains_key(CONTENT_LENGTH) {
        return Ok(None);
    }

    let length = {
        let mut distinct: Vec<&str> = Vec::new();
        for value in headers.get_all(CONTENT_LENGTH) {
            let value = value.to_str().map_err(|_invalid| ParseError::invalid_content_length("value is not visible ascii"))?;
            for part in value.split(',').map(str::trim) {
                if !distinct.contains(&part) {
                    distinct.push(part);
                }
            }
        }

        ensure!(distinct.len() == 1, ParseError::conflicting_content_length(distinct.join(", ")));
        let value = distinct[0];
        value.parse::<u64>().map_err(|_invalid| ParseError::invalid_content_length(format!("value {value} is not u64")))?
    };

    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    ensure!(!(*method == Method::HEAD && length != 0), ParseError::ContentLengthOnHead { length });
    ensure!(!headers.contains_key(TRANSFER_ENCODING), ParseError::AmbiguousFraming);

    Ok(Some(length))
}

/// Chooses the body reader for a parsed request head.
fn parse_payload(header: &mut RequestHeader) -> Result<PayloadDecoder, ParseError> {
    let method = header.method().clone();
    if let Some(length) = fix_length(&method, header.headers_mut())? {
        return Ok(if length == 0 { PayloadDecoder::empty() } else { PayloadDecoder::fix_length(length) });
    }

    let headers = header.headers();
    if headers.contains_key(TRANSFER_ENCODING) {
        if !is_chunked(headers) {
            let value = headers.get_all(TRANSFER_ENCODING).iter().map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()).collect::<Vec<_>>();
            return Err(ParseError::unsupported_transfer_encoding(value.join(", ")));
        }

        let declared = parse_trailer(headers)?;
        return Ok(PayloadDecoder::chunked(declared));
    }

    Ok(PayloadDecoder::empty())
}

/// Checks whether `chunked` is the final transfer coding.
fn is_chunked(headers: &HeaderMap) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .next_back()
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

/// Reads the trailer names declared by the `Trailer` header.
///
/// Returns an empty list when no `Trailer` header is present.
pub(crate) fn parse_trailer(headers: &HeaderMap) -> Result<Vec<HeaderName>, ParseError> {
    if !headers.contains_key(TRAILER) {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for value in headers.get_all(TRAILER) {
        let value = value.to_str().map_err(|_invalid| ParseError::malformed_header("trailer header is not visible ascii"))?;
        for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_invalid| ParseError::malformed_header(format!("invalid trailer name {name:?}")))?;
            names.push(name);
        }
    }

    ensure!(!names.is_empty(), ParseError::malformed_header("empty trailer header"));

    let prohibited: Vec<String> = names.iter().filter(|name| is_prohibited_trailer(name)).map(|name| name.as_str().to_owned()).collect();
    ensure!(prohibited.is_empty(), ParseError::ProhibitedTrailers { names: prohibited });

    Ok(names)
}

#[inline]
pub(crate) fn is_prohibited_trailer(name: &HeaderName) -> bool {
    PROHIBITED_TRAILERS.contains(name)
}
