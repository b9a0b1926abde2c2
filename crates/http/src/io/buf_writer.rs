use std::io::{self, ErrorKind};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::buf_reader::{DEFAULT_BUF_SIZE, MIN_BUF_SIZE};

/// The first failure seen by a [`BufWriter`]. Once set, every later write or
/// flush reports it again.
#[derive(Debug, Clone)]
struct StickyError {
    kind: ErrorKind,
    message: String,
}

impl StickyError {
    fn from_io(e: &io::Error) -> Self {
        Self { kind: e.kind(), message: e.to_string() }
    }

    fn to_io(&self) -> io::Error {
        io::Error::new(self.kind, self.message.clone())
    }
}

/// Buffered writer over an [`AsyncWrite`] socket.
///
/// Writes accumulate in a fixed-capacity buffer and reach the socket on
/// [`flush`](BufWriter::flush) or when the buffer fills. A write larger than the
/// free space goes straight to the socket if nothing is pending.
#[derive(Debug)]
pub struct BufWriter<W> {
    inner: W,
    buf: Box<[u8]>,
    used: usize,
    err: Option<StickyError>,
}

impl<W> BufWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_BUF_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        let capacity = capacity.max(MIN_BUF_SIZE);
        Self { inner, buf: vec![0; capacity].into_boxed_slice(), used: 0, err: None }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn buffered(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len() - self.used
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the underlying writer. Unflushed bytes are lost.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Switches to a new writer, dropping pending bytes and any sticky error.
    pub fn reset(&mut self, inner: W) {
        self.inner = inner;
        self.used = 0;
        self.err = None;
    }

    fn check(&self) -> io::Result<()> {
        match &self.err {
            Some(err) => Err(err.to_io()),
            None => Ok(()),
        }
    }
}

impl<W> BufWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Buffers all of `data`, flushing as the buffer fills. Returns `data.len()`.
    pub async fn write(&mut self, mut data: &[u8]) -> io::Result<usize> {
        self.check()?;
        let total = data.len();

        while data.len() > self.available() {
            if self.used == 0 {
                let n = match self.inner.write(data).await {
                    Ok(0) => {
                        let e = io::Error::new(ErrorKind::WriteZero, "failed to write whole buffer");
                        self.err = Some(StickyError::from_io(&e));
                        return Err(e);
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!(cause = %e, "direct write failed");
                        self.err = Some(StickyError::from_io(&e));
                        return Err(e);
                    }
                };
                data = &data[n..];
                continue;
            }

            let n = self.available();
            self.buf[self.used..].copy_from_slice(&data[..n]);
            self.used += n;
            data = &data[n..];
            self.flush().await?;
        }

        self.buf[self.used..self.used + data.len()].copy_from_slice(data);
        self.used += data.len();
        Ok(total)
    }

    pub async fn write_all_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.write(data).await.map(|_| ())
    }

    /// Writes every buffered byte to the socket and flushes it.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        if self.used == 0 {
            return Ok(());
        }

        let result = match self.inner.write_all(&self.buf[..self.used]).await {
            Ok(()) => self.inner.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.used = 0;
                Ok(())
            }
            Err(e) => {
                warn!(cause = %e, pending = self.used, "flush failed");
                self.err = Some(StickyError::from_io(&e));
                Err(e)
            }
        }
    }

    /// Flushes pending bytes then shuts down the write side of the socket.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.inner.shutdown().await
    }
}
