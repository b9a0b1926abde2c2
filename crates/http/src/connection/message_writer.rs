use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use http::Response;
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::{ResponseEncoder, response_payload_size};
use crate::io::BufWriter;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Serializes responses into a [`BufWriter`].
///
/// Every encoded item is staged in a `BytesMut` and copied into the writer;
/// the writer is flushed after each chunk of a chunked body and at the end of
/// every response.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: BufWriter<W>,
    buffer: BytesMut,
    encoder: ResponseEncoder,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: BufWriter<W>) -> Self {
        Self { writer, buffer: BytesMut::new(), encoder: ResponseEncoder::new() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut BufWriter<W> {
        &mut self.writer
    }

    pub fn into_inner(self) -> BufWriter<W> {
        self.writer
    }

    /// Writes the interim response for `Expect: 100-continue`.
    pub async fn write_continue(&mut self) -> Result<(), SendError> {
        self.writer.write_all_bytes(CONTINUE).await?;
        Ok(self.writer.flush().await?)
    }

    pub async fn write_response<B>(&mut self, response: Response<B>) -> Result<(), SendError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let (parts, mut body) = response.into_parts();
        let head = ResponseHead::from_parts(parts, ());

        let payload_size = response_payload_size(&head, &body.size_hint())?;
        self.encode(Message::Header((head, payload_size)))?;

        if payload_size.is_empty() {
            self.encode(Message::Payload(PayloadItem::Eof))?;
            return self.flush().await;
        }

        loop {
            let item = match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => PayloadItem::Chunk(data),
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => PayloadItem::Trailers(trailers),
                        Err(_frame) => return Err(SendError::invalid_body("unknown body frame")),
                    },
                },
                Some(Err(e)) => {
                    error!(cause = %e, "response body failed");
                    return Err(SendError::invalid_body(format!("resolve response body error: {e}")));
                }
                None => PayloadItem::Eof,
            };

            let eof = item.is_eof();
            self.encode(Message::Payload(item))?;

            if eof {
                return self.flush().await;
            }
            if payload_size.is_chunked() {
                self.flush().await?;
            } else {
                self.drain().await?;
            }
        }
    }

    #[inline]
    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize)>) -> Result<(), SendError> {
        self.encoder.encode(item, &mut self.buffer)
    }

    async fn drain(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            let staged = self.buffer.split();
            self.writer.write_all_bytes(&staged).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        self.drain().await?;
        Ok(self.writer.flush().await?)
    }
}
