//! Buffered reader over an [`AsyncRead`] socket.
//!
//! The reader owns a fixed-capacity byte window with a read cursor `r` and a
//! write cursor `w` (`0 <= r <= w <= capacity`). Bytes in `[r, w)` have been
//! received from the socket but not yet consumed.
//!
//! Line oriented reads never grow the window: when a line does not fit,
//! [`BufReader::read_line`] hands out what it has with `more = true` and the
//! caller reassembles the physical line from several segments.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::BufError;

pub const DEFAULT_BUF_SIZE: usize = 4096;
pub const MIN_BUF_SIZE: usize = 16;
pub const MAX_CONSECUTIVE_EMPTY_READS: usize = 100;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// One segment of a line returned by [`BufReader::read_line`].
///
/// `line` excludes the trailing `\r\n` or `\n`. `more` is true when the buffer
/// filled up before the end of the physical line was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLine<'a> {
    pub line: &'a [u8],
    pub more: bool,
}

#[derive(Debug)]
pub struct BufReader<R> {
    inner: R,
    buf: Box<[u8]>,
    r: usize,
    w: usize,
    eof: bool,
}

/// Byte range of a scanned slice. `full` marks a range that stopped because the
/// window was exhausted rather than because the delimiter was found.
struct SliceRange {
    start: usize,
    end: usize,
    full: bool,
}

impl<R> BufReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUF_SIZE, inner)
    }

    /// Creates a reader with the given window size, never smaller than [`MIN_BUF_SIZE`].
    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        let capacity = capacity.max(MIN_BUF_SIZE);
        Self { inner, buf: vec![0; capacity].into_boxed_slice(), r: 0, w: 0, eof: false }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes that can be consumed without touching the socket.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.w - self.r
    }

    /// The unread window.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buf[self.r..self.w]
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Returns the underlying reader, dropping any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Switches to a new underlying reader, discarding buffered bytes and the EOF flag.
    pub fn reset(&mut self, inner: R) {
        self.inner = inner;
        self.r = 0;
        self.w = 0;
        self.eof = false;
    }
}

impl<R> BufReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Slides unread bytes to the front and reads at least one new byte, or sets EOF.
    async fn fill(&mut self) -> Result<(), BufError> {
        if self.r > 0 {
            self.buf.copy_within(self.r..self.w, 0);
            self.w -= self.r;
            self.r = 0;
        }

        if self.w >= self.buf.len() {
            return Err(BufError::FillFullBuffer);
        }

        let n = read_retrying(&mut self.inner, &mut self.buf[self.w..]).await?;
        if n == 0 {
            self.eof = true;
        }
        self.w += n;
        Ok(())
    }

    /// Reads into `dst`, returning the number of bytes copied or `None` at end of stream.
    ///
    /// At most one socket read succeeds, after retrying `Interrupted` ones.
    /// When the window is empty and `dst` is at least as large as the window,
    /// the socket reads straight into `dst`.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<Option<usize>, BufError> {
        if dst.is_empty() {
            return Ok(Some(0));
        }

        if self.r == self.w {
            if self.eof {
                return Ok(None);
            }

            if dst.len() >= self.buf.len() {
                let n = read_retrying(&mut self.inner, dst).await?;
                if n == 0 {
                    self.eof = true;
                    return Ok(None);
                }
                return Ok(Some(n));
            }

            self.r = 0;
            self.w = 0;
            let n = read_retrying(&mut self.inner, &mut self.buf).await?;
            if n == 0 {
                self.eof = true;
                return Ok(None);
            }
            self.w = n;
        }

        let n = dst.len().min(self.w - self.r);
        dst[..n].copy_from_slice(&self.buf[self.r..self.r + n]);
        self.r += n;
        Ok(Some(n))
    }

    /// Fills `dst` completely.
    ///
    /// Returns `None` if the stream ended before any byte was read and
    /// [`BufError::PartialRead`] with exactly the obtained bytes if it ended midway.
    pub async fn read_full(&mut self, dst: &mut [u8]) -> Result<Option<usize>, BufError> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.read(&mut dst[filled..]).await? {
                Some(n) => filled += n,
                None if filled == 0 => return Ok(None),
                None => return Err(BufError::partial_read(&dst[..filled])),
            }
        }
        Ok(Some(filled))
    }

    pub async fn read_byte(&mut self) -> Result<Option<u8>, BufError> {
        while self.r == self.w {
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }

        let byte = self.buf[self.r];
        self.r += 1;
        Ok(Some(byte))
    }

    async fn scan_slice(&mut self, delim: u8) -> Result<Option<SliceRange>, BufError> {
        // bytes before `self.r + searched` are known not to contain `delim`
        let mut searched = 0;
        loop {
            if let Some(i) = self.buf[self.r + searched..self.w].iter().position(|b| *b == delim) {
                let start = self.r;
                let end = self.r + searched + i + 1;
                self.r = end;
                return Ok(Some(SliceRange { start, end, full: false }));
            }

            if self.eof {
                if self.r == self.w {
                    return Ok(None);
                }
                let start = self.r;
                self.r = self.w;
                return Ok(Some(SliceRange { start, end: self.w, full: false }));
            }

            if self.buffered() >= self.buf.len() {
                let start = self.r;
                self.r = self.w;
                return Ok(Some(SliceRange { start, end: self.w, full: true }));
            }

            searched = self.w - self.r;
            self.fill().await?;
        }
    }

    /// Reads until the first `delim`, returning a slice of the window that includes it.
    ///
    /// At end of stream the remaining bytes are returned without a delimiter. If
    /// the window fills up first, the unread bytes are consumed and returned in
    /// [`BufError::BufferFull`].
    pub async fn read_slice(&mut self, delim: u8) -> Result<Option<&[u8]>, BufError> {
        match self.scan_slice(delim).await? {
            None => Ok(None),
            Some(SliceRange { start, end, full: true }) => Err(BufError::buffer_full(&self.buf[start..end])),
            Some(SliceRange { start, end, full: false }) => Ok(Some(&self.buf[start..end])),
        }
    }

    /// Reads one line segment, stripping a trailing `\r\n` or `\n`.
    ///
    /// A line longer than the window comes back in several segments, all but
    /// the last with `more = true`. A `\r` that ends a full window is held back
    /// so that a `\r\n` split across two segments is still recognised.
    pub async fn read_line(&mut self) -> Result<Option<ReadLine<'_>>, BufError> {
        let SliceRange { start, mut end, full } = match self.scan_slice(LF).await? {
            Some(range) => range,
            None => return Ok(None),
        };

        if full {
            if !self.eof && end > start && self.buf[end - 1] == CR {
                self.r -= 1;
                end -= 1;
            }
            trace!(len = end - start, "line exceeds read buffer, returning segment");
            return Ok(Some(ReadLine { line: &self.buf[start..end], more: !self.eof }));
        }

        if end > start && self.buf[end - 1] == LF {
            end -= 1;
            if end > start && self.buf[end - 1] == CR {
                end -= 1;
            }
        }

        Ok(Some(ReadLine { line: &self.buf[start..end], more: false }))
    }

    /// Reads until `delim` and decodes the bytes (delimiter included) lossily as UTF-8.
    pub async fn read_string(&mut self, delim: u8) -> Result<Option<String>, BufError> {
        Ok(self.read_slice(delim).await?.map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    /// Returns the next `n` bytes without consuming them.
    ///
    /// At end of stream a shorter slice may be returned. If `n` exceeds the
    /// window the available bytes are reported in [`BufError::BufferFull`].
    pub async fn peek(&mut self, n: usize) -> Result<Option<&[u8]>, BufError> {
        let mut avail = self.buffered();
        while avail < n && avail < self.buf.len() && !self.eof {
            self.fill().await?;
            avail = self.buffered();
        }

        if avail == 0 && self.eof {
            return Ok(None);
        }

        if avail < n {
            if self.eof {
                return Ok(Some(&self.buf[self.r..self.w]));
            }
            return Err(BufError::buffer_full(&self.buf[self.r..self.w]));
        }

        Ok(Some(&self.buf[self.r..self.r + n]))
    }

    /// Drops up to `n` buffered bytes, returning how many were dropped.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.buffered());
        self.r += n;
        n
    }
}

/// Issues one socket read, retrying reads that fail with `Interrupted`.
async fn read_retrying<R>(inner: &mut R, dst: &mut [u8]) -> Result<usize, BufError>
where
    R: AsyncRead + Unpin,
{
    for _ in 0..MAX_CONSECUTIVE_EMPTY_READS {
        match inner.read(dst).await {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(BufError::NoProgress { attempts: MAX_CONSECUTIVE_EMPTY_READS })
}
