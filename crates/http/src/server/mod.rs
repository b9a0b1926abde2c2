//! Accepting connections and multiplexing their requests.
//!
//! [`Server`] owns the listener and a registry of live connections. Each
//! accepted connection runs an [`HttpConnection`](crate::connection::HttpConnection)
//! on its own task, and all of them feed one channel that the application
//! reads with [`Server::next`] or as a `Stream`. [`Server::serve`] and
//! [`listen_and_serve`] drive that loop with a [`Handler`](crate::handler::Handler).

mod addr;
mod config;
mod error;
mod multiplexer;

pub use addr::parse_addr;
pub use config::{ServerBuilder, ServerConfig};
pub use error::ServerError;
pub use multiplexer::{Incoming, Server, listen_and_serve};
