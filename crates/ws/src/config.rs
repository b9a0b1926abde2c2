use tern_http::io::DEFAULT_BUF_SIZE;

/// Largest message accepted by default, counting all fragments.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Limits and buffer sizes of a WebSocket session.
///
/// ```
/// use tern_ws::WebSocketConfig;
///
/// let config = WebSocketConfig::new().max_payload_size(64 * 1024).read_buffer_size(8192);
/// assert_eq!(config.max_payload_size, 64 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Upper bound for a single frame payload and for a reassembled message.
    pub max_payload_size: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
}

impl WebSocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
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
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self { max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE, read_buffer_size: DEFAULT_BUF_SIZE, write_buffer_size: DEFAULT_BUF_SIZE }
    }
}
