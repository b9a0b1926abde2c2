//! Body reader for messages framed by `Content-Length`.

use std::cmp;

use tokio::io::AsyncRead;

use crate::io::BufReader;
use crate::protocol::ParseError;

/// Reads exactly `length` bytes, regardless of how they are split across socket reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes remaining to be read from the payload
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.length
    }

    /// Reads body bytes into `dst`, returning `None` once the declared length is consumed.
    pub async fn read<R>(&mut self, reader: &mut BufReader<R>, dst: &mut [u8]) -> Result<Option<usize>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        if self.length == 0 {
            return Ok(None);
        }

        let len = cmp::min(self.length, dst.len() as u64) as usize;
        match reader.read(&mut dst[..len]).await? {
            Some(n) => {
                self.length -= n as u64;
                Ok(Some(n))
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }
}
