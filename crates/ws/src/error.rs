use std::io;

use tern_http::io::BufError;
use tern_http::protocol::{ParseError, SendError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("request is not a websocket upgrade: {reason}")]
    NotAcceptable { reason: String },

    #[error("handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("stream ended after {read} of {expected} bytes of a frame field")]
    TruncatedFrame { read: usize, expected: usize },

    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    #[error("payload of {size} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { size: u64, max: usize },

    #[error("socket has already been closed")]
    ConnectionReset,

    #[error("unsupported scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("invalid url: {source}")]
    InvalidUrl {
        #[from]
        source: url::ParseError,
    },

    #[error("http error: {source}")]
    Http {
        #[from]
        source: ParseError,
    },

    #[error("http send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("buffer error: {source}")]
    Buf {
        #[from]
        source: BufError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WsError {
    pub fn not_acceptable<S: ToString>(reason: S) -> Self {
        Self::NotAcceptable { reason: reason.to_string() }
    }

    pub fn handshake_failed<S: ToString>(reason: S) -> Self {
        Self::HandshakeFailed { reason: reason.to_string() }
    }

    pub fn protocol_error<S: ToString>(reason: S) -> Self {
        Self::ProtocolError { reason: reason.to_string() }
    }
}
