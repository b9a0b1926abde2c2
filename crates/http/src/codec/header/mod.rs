//! Header block decoding and encoding.
//!
//! - [`HeaderDecoder`] reads a request line plus MIME header block and selects the body reader
//! - [`HeaderEncoder`] writes a status line plus header block, adding the framing headers
//! - [`read_mime_header`] reads a bare header block, shared with chunked trailers and
//!   the WebSocket client handshake; [`read_mime_header_pairs`] keeps the wire order
//! - [`write_header_fields`] writes fields back out in iteration order

mod header_decoder;
mod header_encoder;
mod mime_reader;

pub use header_decoder::HeaderDecoder;
pub use header_decoder::parse_http_version;
pub(crate) use header_decoder::{is_prohibited_trailer, parse_trailer};
pub use header_encoder::{HeaderEncoder, write_header_fields};
pub(crate) use header_encoder::FastWrite;
pub use mime_reader::{MAX_HEADER_BYTES, MAX_HEADER_NUM, read_mime_header, read_mime_header_pairs};
