//! WebSocket (RFC 6455) on top of `tern-http`.
//!
//! A server upgrades a request it received from a [`tern_http::server::Server`]
//! with [`accept`]; a client dials a `ws://` endpoint with [`connect`]. Both
//! produce a [`WebSocket`] that yields [`WsEvent`]s and sends frames through a
//! single ordered queue.
//!
//! ```no_run
//! use tern_http::server::Server;
//! use tern_ws::{WebSocketConfig, WsEvent, accept};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::bind(":8080").await?;
//! while let Some((request, responder)) = server.next().await {
//!     let mut socket = accept(&request, responder, WebSocketConfig::default()).await?;
//!     tokio::spawn(async move {
//!         while let Some(event) = socket.next_event().await {
//!             if let WsEvent::Text(text) = event {
//!                 let _ = socket.send_text(text).await;
//!             }
//!         }
//!     });
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Extensions (compression) and `wss://` are not supported.

mod config;
mod error;
pub mod frame;
pub mod handshake;
mod session;

pub use config::{DEFAULT_MAX_PAYLOAD_SIZE, WebSocketConfig};
pub use error::WsError;
pub use frame::{Frame, FrameCodec, OpCode, close_code};
pub use handshake::{accept, acceptable, connect, connect_with_config};
pub use session::{CloseEvent, Role, WebSocket, WsEvent, WsSender};
