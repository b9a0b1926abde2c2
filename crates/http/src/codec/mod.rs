//! HTTP/1.1 message codec.
//!
//! - Request side: [`RequestDecoder`] reads a request head from a
//!   [`BufReader`](crate::io::BufReader) and hands back a [`PayloadDecoder`]
//!   for its body (fixed-length, chunked with trailers, or empty).
//! - Response side: [`ResponseEncoder`] is a `tokio_util` [`Encoder`](tokio_util::codec::Encoder)
//!   that serializes a head plus body items into a `BytesMut`, choosing the
//!   framing with [`response_payload_size`].
//!
//! [`read_mime_header`], [`read_mime_header_pairs`] and [`write_header_fields`]
//! are exposed for other protocols that reuse the HTTP header syntax, such as
//! the WebSocket client handshake.

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::{
    HeaderDecoder, HeaderEncoder, MAX_HEADER_BYTES, MAX_HEADER_NUM, parse_http_version, read_mime_header, read_mime_header_pairs,
    write_header_fields,
};
pub use request_decoder::RequestDecoder;
pub use response_encoder::{ResponseEncoder, response_payload_size};
