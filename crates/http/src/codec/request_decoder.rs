use tokio::io::AsyncRead;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::io::BufReader;
use crate::protocol::{ParseError, RequestHeader};

/// Reads requests from a buffered connection.
///
/// Each call yields the request head together with the body reader selected
/// for it. The body must be consumed through that reader before the next call.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns `Ok(None)` when the peer closed the connection between requests.
    pub async fn decode<R>(&mut self, reader: &mut BufReader<R>) -> Result<Option<(RequestHeader, PayloadDecoder)>, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        self.header_decoder.decode(reader).await
    }
}
