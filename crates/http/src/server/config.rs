use std::net::SocketAddr;

use crate::io::DEFAULT_BUF_SIZE;
use crate::server::{Server, ServerError, parse_addr};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Settings for a [`Server`], produced by [`ServerBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub address: SocketAddr,
    /// Read buffer of each connection; also bounds the request line and each header line.
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Requests buffered between the connections and the application.
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub async fn start(self) -> Result<Server, ServerError> {
        Server::start(self).await
    }
}

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<String>,
    read_buffer_size: usize,
    write_buffer_size: usize,
    channel_capacity: usize,
}

impl ServerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            address: None,
            read_buffer_size: DEFAULT_BUF_SIZE,
            write_buffer_size: DEFAULT_BUF_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// `host:port` or `:port`, see [`parse_addr`].
    pub fn address<A: Into<String>>(mut self, address: A) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<ServerConfig, ServerError> {
        let address = self.address.ok_or_else(|| ServerError::invalid_address("", "address must be set"))?;
        Ok(ServerConfig {
            address: parse_addr(&address)?,
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            channel_capacity: self.channel_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_config() {
        let config = Server::builder().address(":4500").read_buffer_size(8192).channel_capacity(0).build().unwrap();

        assert_eq!(config.address.port(), 4500);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.write_buffer_size, DEFAULT_BUF_SIZE);
        assert_eq!(config.channel_capacity, 1);
    }

    #[test]
    fn address_is_required() {
        assert!(matches!(Server::builder().build(), Err(ServerError::InvalidAddress { .. })));
        assert!(matches!(Server::builder().address("nowhere").build(), Err(ServerError::InvalidAddress { .. })));
    }
}
