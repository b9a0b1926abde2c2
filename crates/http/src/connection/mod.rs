//! The per-connection request loop.
//!
//! - [`HttpConnection`]: decodes requests one at a time, hands each to the
//!   application with a [`Responder`] and writes the response before decoding
//!   the next one. Also answers `Expect: 100-continue` and rejects malformed
//!   requests with a `400`.
//! - [`Responder`]: answers one request, or takes the connection over with
//!   [`Responder::upgrade`].
//! - [`MessageWriter`]: serializes responses into the connection's write buffer.

mod http_connection;
mod message_writer;
mod responder;

pub use http_connection::{HttpConnection, RequestSender};
pub use message_writer::MessageWriter;
pub use responder::{Responder, Upgraded};
