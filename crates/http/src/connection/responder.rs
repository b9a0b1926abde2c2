use std::fmt;

use bytes::Bytes;
use futures::channel::oneshot;
use http::Response;
use http_body::Body;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::io::{BufReader, BufWriter};
use crate::protocol::SendError;
use crate::protocol::body::{BoxError, ResponseBody};

pub(crate) enum Reply<R, W> {
    Respond(Response<ResponseBody>, oneshot::Sender<Result<(), SendError>>),
    Upgrade(oneshot::Sender<Upgraded<R, W>>),
}

/// Answers one request of a connection.
///
/// The connection decodes its next request only after the response given to
/// [`respond`](Responder::respond) has been written. Dropping the responder
/// without answering closes the connection.
pub struct Responder<R = OwnedReadHalf, W = OwnedWriteHalf> {
    reply: oneshot::Sender<Reply<R, W>>,
}

impl<R, W> Responder<R, W> {
    pub(crate) fn new(reply: oneshot::Sender<Reply<R, W>>) -> Self {
        Self { reply }
    }

    /// Hands the response to the connection and waits until it is written.
    ///
    /// A write failure is returned here and the connection is closed.
    pub async fn respond<B>(self, response: Response<B>) -> Result<(), SendError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (done_sender, done_receiver) = oneshot::channel();
        self.reply
            .send(Reply::Respond(response.map(ResponseBody::stream), done_sender))
            .map_err(|_reply| SendError::ConnectionClosed)?;

        done_receiver.await.map_err(|_canceled| SendError::ConnectionClosed)?
    }

    /// Takes the connection out of the HTTP loop.
    ///
    /// The returned halves keep any bytes already buffered after the request
    /// head. Nothing is written on behalf of the caller.
    pub async fn upgrade(self) -> Result<Upgraded<R, W>, SendError> {
        let (upgraded_sender, upgraded_receiver) = oneshot::channel();
        self.reply.send(Reply::Upgrade(upgraded_sender)).map_err(|_reply| SendError::ConnectionClosed)?;

        upgraded_receiver.await.map_err(|_canceled| SendError::ConnectionClosed)
    }

    /// Whether the connection stopped waiting for this response.
    pub fn is_closed(&self) -> bool {
        self.reply.is_canceled()
    }
}

impl<R, W> fmt::Debug for Responder<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder").field("closed", &self.is_closed()).finish()
    }
}

/// The buffered halves of a connection after [`Responder::upgrade`].
#[derive(Debug)]
pub struct Upgraded<R = OwnedReadHalf, W = OwnedWriteHalf> {
    pub reader: BufReader<R>,
    pub writer: BufWriter<W>,
}

impl<R, W> Upgraded<R, W> {
    pub fn into_parts(self) -> (BufReader<R>, BufWriter<W>) {
        (self.reader, self.writer)
    }
}
