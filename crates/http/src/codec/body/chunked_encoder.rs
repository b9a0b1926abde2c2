use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};
use http::HeaderName;
use tokio_util::codec::Encoder;

use crate::codec::header::is_prohibited_trailer;
use crate::codec::header::{FastWrite, write_header_fields};
use crate::protocol::{PayloadItem, SendError};

/// Writes a body with `Transfer-Encoding: chunked`.
///
/// Empty chunks are skipped since a zero-size chunk ends the body. Trailers
/// may only name fields announced in the response's `Trailer` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
    declared_trailers: Vec<HeaderName>,
}

impl ChunkedEncoder {
    pub fn new(declared_trailers: Vec<HeaderName>) -> Self {
        Self { eof: false, declared_trailers }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(FastWrite(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Trailers(trailers) => {
                for name in trailers.keys() {
                    if is_prohibited_trailer(name) || !self.declared_trailers.contains(name) {
                        return Err(SendError::invalid_trailer(format!("trailer {name} is not declared in the trailer header")));
                    }
                }

                self.eof = true;
                dst.extend_from_slice(b"0\r\n");
                write_header_fields(trailers.iter(), dst);
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
