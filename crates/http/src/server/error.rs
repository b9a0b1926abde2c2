use std::io;
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub fn invalid_address<A: ToString, S: ToString>(address: A, reason: S) -> Self {
        Self::InvalidAddress { address: address.to_string(), reason: reason.to_string() }
    }
}
