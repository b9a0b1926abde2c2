use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt, channel::mpsc};
use http_body::{Body, Frame, SizeHint};
use tokio::io::AsyncRead;
use tracing::{error, info};

use crate::codec::PayloadDecoder;
use crate::io::BufReader;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Creates the two halves of a request body: the [`BodySender`] stays on the
/// connection task and reads from the socket, the [`ReqBody`] goes to the
/// application with the request.
pub(crate) fn create_body_sender_receiver<'conn, R>(
    reader: &'conn mut BufReader<R>,
    payload_decoder: PayloadDecoder,
) -> (BodySender<'conn, R>, ReqBody)
where
    R: AsyncRead + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(8);
    let (data_sender, data_receiver) = mpsc::channel(8);
    let payload_size = payload_decoder.payload_size();

    (
        BodySender::new(reader, payload_decoder, signal_receiver, data_sender),
        ReqBody::new(signal_sender, data_receiver, payload_size),
    )
}

#[derive(Debug)]
pub(crate) enum BodyRequestSignal {
    RequestData,
}

/// Connection-side half of a request body.
///
/// Reads one body item from the socket each time the [`ReqBody`] asks for data.
pub(crate) struct BodySender<'conn, R> {
    reader: &'conn mut BufReader<R>,
    payload_decoder: PayloadDecoder,
    signal_receiver: mpsc::Receiver<BodyRequestSignal>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl<'conn, R> BodySender<'conn, R>
where
    R: AsyncRead + Unpin,
{
    fn new(
        reader: &'conn mut BufReader<R>,
        payload_decoder: PayloadDecoder,
        signal_receiver: mpsc::Receiver<BodyRequestSignal>,
        data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    ) -> Self {
        let eof = payload_decoder.is_empty();
        Self { reader, payload_decoder, signal_receiver, data_sender, eof }
    }

    /// Serves body reads until the body ends or the [`ReqBody`] is dropped.
    ///
    /// A body error is forwarded to the [`ReqBody`] and returned, since the
    /// connection can no longer find the start of the next request.
    pub(crate) async fn start(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            let Some(BodyRequestSignal::RequestData) = self.signal_receiver.next().await else {
                break;
            };

            match self.read_data().await {
                Ok(payload_item) => {
                    self.eof = payload_item.is_eof();
                    if let Err(e) = self.data_sender.send(Ok(payload_item)).await {
                        error!("failed to send payload body through channel, {}", e);
                        break;
                    }
                }

                Err(e) => {
                    error!("failed to read data from body stream, {}", e);
                    let reason = e.to_string();
                    if self.data_sender.send(Err(e)).await.is_err() {
                        error!("failed to send error through channel");
                    }
                    return Err(ParseError::invalid_body(reason));
                }
            }
        }

        Ok(())
    }

    async fn read_data(&mut self) -> Result<PayloadItem, ParseError> {
        self.payload_decoder.decode(&mut *self.reader).await
    }

    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// Reads and drops whatever part of the body the application left unread.
    pub(crate) async fn skip_data(&mut self) -> Result<(), ParseError> {
        if self.eof {
            return Ok(());
        }

        info!("skipping unread request body");
        loop {
            if self.read_data().await?.is_eof() {
                self.eof = true;
                return Ok(());
            }
        }
    }
}

/// Application-side half of a request body, implementing [`http_body::Body`].
///
/// Data frames come in socket order. For chunked bodies the trailers, if any,
/// arrive as a final trailers frame.
#[derive(Debug)]
pub struct ReqBody {
    signal_sender: mpsc::Sender<BodyRequestSignal>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    in_flight: bool,
    finished: bool,
}

impl ReqBody {
    fn new(
        signal_sender: mpsc::Sender<BodyRequestSignal>,
        data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        payload_size: PayloadSize,
    ) -> Self {
        let finished = payload_size.is_empty();
        Self { signal_sender, data_receiver, payload_size, in_flight: false, finished }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if let Err(e) = Pin::new(&mut this.signal_sender).start_send(BodyRequestSignal::RequestData) {
                        error!("failed to send request_more through channel, {}", e);
                        this.finished = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("connection stopped reading the body"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(e)) => {
                    error!("failed to prepare request_more through channel, {}", e);
                    this.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("connection stopped reading the body"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        let item = match this.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => return Poll::Pending,
        };
        this.in_flight = false;

        match item {
            Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Ok(PayloadItem::Trailers(trailers))) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
            Some(Ok(PayloadItem::Eof)) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finished = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("connection closed before the body ended"))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}
