//! Body reader for `Transfer-Encoding: chunked`.
//!
//! Each chunk is a hex size line (extensions after `;` are ignored), the chunk
//! bytes and a CRLF. A zero-size chunk is followed by the trailer section,
//! which must contain exactly the fields named in the request's `Trailer`
//! header.
//!
//! [`ChunkedDecoder::read`] may be dropped at any await point and called
//! again later: partial lines and trailer fields are kept in the decoder, so
//! no byte taken from the reader is lost.

use std::{cmp, mem};

use http::{HeaderMap, HeaderName};
use httparse::Status;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::codec::header::{is_prohibited_trailer, read_mime_header};
use crate::codec::header::MAX_HEADER_BYTES;
use crate::ensure;
use crate::io::BufReader;
use crate::protocol::ParseError;

use ChunkedState::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    declared_trailers: Vec<HeaderName>,
    trailers: Option<HeaderMap>,
    /// Bytes of the line being read when the last `read` was dropped.
    line: Vec<u8>,
    /// Raw trailer lines read so far, each terminated by CRLF.
    trailer_block: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    AwaitingChunkSize,
    InChunk(u64),
    AwaitingChunkTerminator,
    AwaitingTrailer,
    Done,
}

impl ChunkedDecoder {
    /// Creates a decoder expecting the given trailer names after the last chunk.
    pub fn new(declared_trailers: Vec<HeaderName>) -> Self {
        Self { state: AwaitingChunkSize, declared_trailers, trailers: None, line: Vec::new(), trailer_block: Vec::new() }
    }

    #[inline]
    pub fn is_finish(&self) -> bool {
        self.state == Done
    }

    /// Takes the trailers decoded after the last chunk, if any were sent.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }

    /// Reads chunk data into `dst`. Returns `None` once the last chunk and the
    /// trailer section have been consumed.
    pub async fn read<R>(&mut self, reader: &mut BufReader<R>, dst: &mut [u8]) -> Result<Option<usize>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match self.state {
                AwaitingChunkSize => {
                    let line = self.read_line(reader).await?;
                    let size = parse_chunk_size(line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { AwaitingTrailer } else { InChunk(size) };
                }

                InChunk(remaining) => {
                    if dst.is_empty() {
                        return Ok(Some(0));
                    }

                    let len = cmp::min(remaining, dst.len() as u64) as usize;
                    let n = reader.read(&mut dst[..len]).await?.ok_or(ParseError::UnexpectedEof)?;
                    let remaining = remaining - n as u64;

                    self.state = if remaining == 0 { AwaitingChunkTerminator } else { InChunk(remaining) };
                    return Ok(Some(n));
                }

                AwaitingChunkTerminator => {
                    let line = self.read_line(reader).await?;
                    ensure!(line.is_empty(), ParseError::invalid_body("missing CRLF after chunk data"));
                    self.state = AwaitingChunkSize;
                }

                AwaitingTrailer => {
                    let line = self.read_line(reader).await?;
                    if !line.is_empty() {
                        self.trailer_block.extend_from_slice(&line);
                        self.trailer_block.extend_from_slice(b"\r\n");
                        ensure!(
                            self.trailer_block.len() <= MAX_HEADER_BYTES,
                            ParseError::too_large_header(self.trailer_block.len(), MAX_HEADER_BYTES)
                        );
                        continue;
                    }

                    let mut block = mem::take(&mut self.trailer_block);
                    block.extend_from_slice(b"\r\n");
                    let trailers = read_mime_header(&mut BufReader::new(&block[..])).await?;
                    self.validate_trailers(&trailers)?;
                    self.state = Done;
                    if !trailers.is_empty() {
                        self.trailers = Some(trailers);
                    }
                }

                Done => return Ok(None),
            }
        }
    }

    /// Reads one line without its CRLF. Segments of a line longer than the
    /// read buffer are collected in `self.line` until the line ends.
    async fn read_line<R>(&mut self, reader: &mut BufReader<R>) -> Result<Vec<u8>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let segment = reader.read_line().await?.ok_or(ParseError::UnexpectedEof)?;
            self.line.extend_from_slice(segment.line);
            ensure!(self.line.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(self.line.len(), MAX_HEADER_BYTES));
            if !segment.more {
                return Ok(mem::take(&mut self.line));
            }
        }
    }

    fn validate_trailers(&self, trailers: &HeaderMap) -> Result<(), ParseError> {
        let mut undeclared: Vec<String> = Vec::new();
        for name in trailers.keys() {
            if !self.declared_trailers.contains(name) || is_prohibited_trailer(name) {
                undeclared.push(name.as_str().to_owned());
            }
        }
        ensure!(undeclared.is_empty(), ParseError::UndeclaredTrailers { names: undeclared });

        let missing: Vec<String> =
            self.declared_trailers.iter().filter(|name| !trailers.contains_key(*name)).map(|name| name.as_str().to_owned()).collect();
        ensure!(missing.is_empty(), ParseError::MissingTrailers { names: missing });

        Ok(())
    }
}

fn parse_chunk_size(mut line: Vec<u8>) -> Result<u64, ParseError> {
    line.extend_from_slice(b"\r\n");

    match httparse::parse_chunk_size(&line) {
        Ok(Status::Complete((_, size))) => Ok(size),
        Ok(Status::Partial) => Err(ParseError::invalid_chunk_size("incomplete chunk size line")),
        Err(_) => Err(ParseError::invalid_chunk_size(format!("invalid chunk size line {:?}", String::from_utf8_lossy(&line).trim_end()))),
    }
}
