//! MIME-style header block reader.
//!
//! Reads `Name: value` lines until an empty line. Lines starting with a space
//! or tab continue the previous line and are folded into it with a single
//! space. Used for request headers, chunked trailers and the WebSocket client's
//! handshake response.

use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncRead;
use tracing::warn;

use crate::ensure;
use crate::io::BufReader;
use crate::protocol::ParseError;

/// Maximum number of fields allowed in one header block
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the start line plus header block
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Tracks how many header bytes a message has consumed so far.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderBudget {
    used: usize,
    max: usize,
}

impl HeaderBudget {
    pub(crate) fn new(max: usize) -> Self {
        Self { used: 0, max }
    }

    fn spend(&mut self, n: usize) -> Result<(), ParseError> {
        self.used += n;
        ensure!(self.used <= self.max, ParseError::too_large_header(self.used, self.max));
        Ok(())
    }
}

/// Reads one physical line, joining the segments of a line longer than the read buffer.
///
/// Returns `None` if the stream ended before any byte of the line was read.
pub(crate) async fn read_physical_line<R>(
    reader: &mut BufReader<R>,
    budget: &mut HeaderBudget,
) -> Result<Option<Vec<u8>>, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut started = false;

    loop {
        let Some(segment) = reader.read_line().await? else {
            return if started { Ok(Some(line)) } else { Ok(None) };
        };
        started = true;

        budget.spend(segment.line.len() + if segment.more { 0 } else { 2 })?;
        line.extend_from_slice(segment.line);

        if !segment.more {
            return Ok(Some(line));
        }
    }
}

fn is_space(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Reads a logical header line: one physical line plus any continuation lines.
async fn read_continued_line<R>(reader: &mut BufReader<R>, budget: &mut HeaderBudget) -> Result<Vec<u8>, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut line = read_physical_line(reader, budget).await?.ok_or(ParseError::UnexpectedEof)?;
    if line.is_empty() {
        return Ok(line);
    }
    line.truncate(line.trim_ascii_end().len());

    while let Some(next) = reader.peek(1).await? {
        if !next.first().copied().is_some_and(is_space) {
            break;
        }

        let continuation = read_physical_line(reader, budget).await?.ok_or(ParseError::UnexpectedEof)?;
        let trimmed = continuation.trim_ascii();
        if !trimmed.is_empty() {
            line.push(b' ');
            line.extend_from_slice(trimmed);
        }
    }

    Ok(line)
}

/// Reads a header block up to and including the terminating empty line.
///
/// Lines with an empty name are skipped. Names or values the `http` crate
/// refuses are dropped with a warning rather than failing the whole message.
///
/// A [`HeaderMap`] keeps the order of values under one name but not the
/// interleaving of different names. Use [`read_mime_header_pairs`] when the
/// exact field order matters.
pub async fn read_mime_header<R>(reader: &mut BufReader<R>) -> Result<HeaderMap, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut budget = HeaderBudget::new(MAX_HEADER_BYTES);
    read_mime_header_with_budget(reader, &mut budget).await
}

/// Reads a header block into `(name, value)` pairs in the order they appeared.
pub async fn read_mime_header_pairs<R>(reader: &mut BufReader<R>) -> Result<Vec<(HeaderName, HeaderValue)>, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut budget = HeaderBudget::new(MAX_HEADER_BYTES);
    read_header_pairs(reader, &mut budget).await
}

pub(crate) async fn read_mime_header_with_budget<R>(
    reader: &mut BufReader<R>,
    budget: &mut HeaderBudget,
) -> Result<HeaderMap, ParseError>
where
    R: AsyncRead + Unpin,
{
    let pairs = read_header_pairs(reader, budget).await?;
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        headers.append(name, value);
    }
    Ok(headers)
}

async fn read_header_pairs<R>(reader: &mut BufReader<R>, budget: &mut HeaderBudget) -> Result<Vec<(HeaderName, HeaderValue)>, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut pairs = Vec::new();

    if let Some(first) = reader.peek(1).await? {
        ensure!(!first.first().copied().is_some_and(is_space), ParseError::malformed_header("malformed MIME header initial line"));
    }

    loop {
        let line = read_continued_line(reader, budget).await?;
        if line.is_empty() {
            return Ok(pairs);
        }

        let Some(colon) = line.iter().position(|b| *b == b':') else {
            return Err(ParseError::malformed_header(format!("malformed MIME header line: {}", String::from_utf8_lossy(&line))));
        };

        let name = line[..colon].trim_ascii();
        if name.is_empty() {
            continue;
        }
        let value = line[colon + 1..].trim_ascii();

        let name = match HeaderName::from_bytes(name) {
            Ok(name) => name,
            Err(_) => {
                warn!(name = %String::from_utf8_lossy(name), "skipping header with invalid name");
                continue;
            }
        };
        let value = match HeaderValue::from_bytes(value) {
            Ok(value) => value,
            Err(_) => {
                warn!(%name, "skipping header with invalid value");
                continue;
            }
        };

        ensure!(pairs.len() < MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));
        pairs.push((name, value));
    }
}
