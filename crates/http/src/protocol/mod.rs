//! HTTP/1.1 protocol types shared by the codec and the connection loop.
//!
//! - [`Message`], [`PayloadItem`] and [`PayloadSize`]: a message as a head
//!   followed by body items, and how that body is framed
//! - [`RequestHeader`] and [`ResponseHead`]: heads without bodies
//! - [`body`]: the streaming request body and the response body type
//! - [`ParseError`] and [`SendError`]: failures reading requests and writing responses

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::is_bodiless_status;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
