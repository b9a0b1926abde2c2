use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Errors raised by [`BufReader`](super::BufReader).
///
/// `BufferFull` and `PartialRead` carry the bytes that were obtained before the
/// failure so callers can resume or report them.
#[derive(Error, Debug)]
pub enum BufError {
    #[error("buffer full")]
    BufferFull { partial: Bytes },

    #[error("encountered unexpected eof, data only partially read ({} bytes)", partial.len())]
    PartialRead { partial: Bytes },

    #[error("tried to fill full buffer")]
    FillFullBuffer,

    #[error("no progress after {attempts} read() calls")]
    NoProgress { attempts: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl BufError {
    pub fn buffer_full(partial: &[u8]) -> Self {
        Self::BufferFull { partial: Bytes::copy_from_slice(partial) }
    }

    pub fn partial_read(partial: &[u8]) -> Self {
        Self::PartialRead { partial: Bytes::copy_from_slice(partial) }
    }

    /// The bytes obtained before the error, if the error kind preserves them.
    pub fn partial(&self) -> Option<&Bytes> {
        match self {
            BufError::BufferFull { partial } | BufError::PartialRead { partial } => Some(partial),
            _ => None,
        }
    }

    #[inline]
    pub fn is_buffer_full(&self) -> bool {
        matches!(self, BufError::BufferFull { .. })
    }
}
