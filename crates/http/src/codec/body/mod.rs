//! Message body framing.
//!
//! ## Decoders
//! - [`LengthDecoder`](length_decoder::LengthDecoder): fixed-length bodies
//! - [`ChunkedDecoder`](chunked_decoder::ChunkedDecoder): chunked bodies and their trailers
//! - [`PayloadDecoder`]: the tagged variant the connection reads through
//!
//! ## Encoders
//! - [`LengthEncoder`](length_encoder::LengthEncoder): fixed-length bodies
//! - [`ChunkedEncoder`](chunked_encoder::ChunkedEncoder): chunked bodies and trailers
//! - [`PayloadEncoder`]: the tagged variant the response encoder writes through

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
