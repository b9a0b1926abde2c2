use std::io;

use bytes::Bytes;
use thiserror::Error;

use crate::io::BufError;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed start line: {line:?}")]
    MalformedStartLine { line: String },

    #[error("malformed http version: {version:?}")]
    MalformedVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("malformed header: {reason}")]
    MalformedHeader { reason: String },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("cannot contain multiple content-length headers: {values}")]
    ConflictingContentLength { values: String },

    #[error("method HEAD cannot carry content-length {length}")]
    ContentLengthOnHead { length: u64 },

    #[error("transfer-encoding and content-length cannot be sent together")]
    AmbiguousFraming,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer-encoding: {value}")]
    UnsupportedTransferEncoding { value: String },

    #[error("invalid chunk size: {reason}")]
    InvalidChunkSize { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("prohibited trailer names: {names:?}")]
    ProhibitedTrailers { names: Vec<String> },

    #[error("undeclared trailers: {names:?}")]
    UndeclaredTrailers { names: Vec<String> },

    #[error("missing trailers: {names:?}")]
    MissingTrailers { names: Vec<String> },

    #[error("unexpected eof")]
    UnexpectedEof,

    #[error("encountered unexpected eof, data only partially read ({} bytes)", partial.len())]
    PartialRead { partial: Bytes },

    #[error("buffer error: {source}")]
    Buf { source: BufError },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn malformed_start_line<S: ToString>(line: S) -> Self {
        Self::MalformedStartLine { line: line.to_string() }
    }

    pub fn malformed_version<S: ToString>(version: S) -> Self {
        Self::MalformedVersion { version: version.to_string() }
    }

    pub fn malformed_header<S: ToString>(str: S) -> Self {
        Self::MalformedHeader { reason: str.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn conflicting_content_length<S: ToString>(values: S) -> Self {
        Self::ConflictingContentLength { values: values.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unsupported_transfer_encoding<S: ToString>(value: S) -> Self {
        Self::UnsupportedTransferEncoding { value: value.to_string() }
    }

    pub fn invalid_chunk_size<S: ToString>(str: S) -> Self {
        Self::InvalidChunkSize { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether the peer sent something we refuse to process, as opposed to the
    /// connection itself failing. Only these errors are answered with `400`.
    pub fn is_bad_request(&self) -> bool {
        !matches!(self, ParseError::Io { .. } | ParseError::Buf { .. })
    }
}

impl From<BufError> for ParseError {
    fn from(e: BufError) -> Self {
        match e {
            BufError::PartialRead { partial } => ParseError::PartialRead { partial },
            BufError::Io { source } => ParseError::Io { source },
            source => ParseError::Buf { source },
        }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("no reason phrase for status {status}")]
    UnknownStatus { status: u16 },

    #[error("unsupported http version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid trailer: {reason}")]
    InvalidTrailer { reason: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_trailer<S: ToString>(str: S) -> Self {
        Self::InvalidTrailer { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bad_requests() {
        assert!(ParseError::malformed_version("HTTP/2.0").is_bad_request());
        assert!(ParseError::UnexpectedEof.is_bad_request());
        assert!(ParseError::conflicting_content_length("4, 5").is_bad_request());
        assert!(!ParseError::io(io::Error::from(io::ErrorKind::ConnectionReset)).is_bad_request());
    }

    #[test]
    fn buf_errors_keep_partial_bytes() {
        let err: ParseError = BufError::partial_read(b"abc").into();
        match err {
            ParseError::PartialRead { partial } => assert_eq!(&partial[..], b"abc"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err: ParseError = BufError::NoProgress { attempts: 100 }.into();
        assert!(matches!(err, ParseError::Buf { .. }));
    }
}
