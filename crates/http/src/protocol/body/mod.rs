//! Request and response bodies.
//!
//! A request body is split in two halves connected by channels. The sending
//! half stays on the connection and reads the socket only when the receiving
//! half, [`ReqBody`], is polled. Whatever the application leaves unread is
//! drained before the next pipelined request is decoded.
//!
//! [`ResponseBody`] is the concrete body type handlers usually return.

mod body_channel;
mod response_body;

pub(crate) use body_channel::create_body_sender_receiver;
pub use body_channel::ReqBody;
pub use response_body::{BoxError, ResponseBody};
