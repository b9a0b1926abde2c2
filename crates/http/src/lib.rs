//! An asynchronous HTTP/1.1 server core built on tokio.
//!
//! The crate is layered bottom-up:
//!
//! - [`io`]: fixed-capacity buffered reader and writer with line/slice reads
//!   that report partial data instead of dropping it
//! - [`codec`]: request parsing, body framing (fixed-length and chunked with
//!   trailers) and response serialization
//! - [`protocol`]: message, body and error types shared by the layers
//! - [`connection`]: the per-connection loop answering pipelined requests in order
//! - [`server`]: accepts connections and merges their requests into one stream
//! - [`handler`]: async functions as request handlers
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::{BodyExt, Full};
//! use tern_http::handler::make_handler;
//! use tern_http::protocol::body::{BoxError, ReqBody};
//! use tern_http::server::listen_and_serve;
//!
//! async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
//!     let body = request.into_body().collect().await?.to_bytes();
//!     Ok(Response::new(Full::new(body)))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     listen_and_serve(":8080", make_handler(echo)).await?;
//!     Ok(())
//! }
//! ```
//!
//! Requests can also be pulled directly from a [`server::Server`]:
//!
//! ```no_run
//! # use http::Response;
//! # use tern_http::server::Server;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::bind("127.0.0.1:8080").await?;
//! while let Some((request, responder)) = server.next().await {
//!     let body = format!("you asked for {}", request.uri().path());
//!     responder.respond(Response::new(http_body_util::Full::new(bytes::Bytes::from(body)))).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 only, responses are always written as `HTTP/1.1`
//! - No TLS, wrap the transport or use a reverse proxy
//! - No timeouts, wrap the socket to add them
//! - At most 64 header fields and 8 KiB of header bytes per message

pub mod codec;
pub mod connection;
pub mod handler;
pub mod io;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
