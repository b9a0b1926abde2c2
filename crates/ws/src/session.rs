//! An open WebSocket connection.
//!
//! Reading happens on the caller's task through [`WebSocket::next_event`].
//! Writing is owned by a spawned task that drains a FIFO of frames one at a
//! time, so concurrent senders never interleave frames on the wire and every
//! send completes in enqueue order.

use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use futures::channel::oneshot;
use futures::stream;
use tern_http::io::{BufReader, BufWriter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::OwnedReadHalf;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::frame::{FrameCodec, close_code, read_frame, truncate_close_reason};
use crate::{Frame, OpCode, WebSocketConfig, WsError};

type Outgoing = (Frame, oneshot::Sender<Result<(), WsError>>);

/// Which end of the connection this session is. Clients mask every frame they send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(CloseEvent),
}

#[derive(Debug)]
struct Shared {
    closed: CancellationToken,
    local_close: OnceLock<CloseEvent>,
}

/// The sending half of a session. Cheap to clone; all clones feed the same queue.
#[derive(Debug, Clone)]
pub struct WsSender {
    queue: mpsc::UnboundedSender<Outgoing>,
    shared: Arc<Shared>,
    role: Role,
}

impl WsSender {
    fn enqueue(&self, mut frame: Frame) -> Result<oneshot::Receiver<Result<(), WsError>>, WsError> {
        if self.is_closed() {
            return Err(WsError::ConnectionReset);
        }

        frame.mask = match self.role {
            Role::Client => Some(rand::random::<[u8; 4]>()),
            Role::Server => None,
        };

        let (done_sender, done_receiver) = oneshot::channel();
        self.queue.send((frame, done_sender)).map_err(|_outgoing| WsError::ConnectionReset)?;
        Ok(done_receiver)
    }

    /// Queues `frame` and waits until it has been written.
    ///
    /// Fails with [`WsError::ConnectionReset`] once the session is closed.
    pub async fn send(&self, frame: Frame) -> Result<(), WsError> {
        let done = self.enqueue(frame)?;
        done.await.map_err(|_canceled| WsError::ConnectionReset)?
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.send(Frame::text(text)).await
    }

    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.send(Frame::binary(data)).await
    }

    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.send(Frame::ping(data)).await
    }

    /// Sends a close frame, then force-closes the connection whether or not the
    /// frame made it out.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        let result = self.send(Frame::close(code, reason)).await;
        // the first local close wins
        let _previous = self.shared.local_close.set(CloseEvent { code, reason: truncate_close_reason(reason).to_string() });
        self.close_force();
        result
    }

    /// Closes the connection without a close frame. Frames still queued fail
    /// with [`WsError::ConnectionReset`].
    pub fn close_force(&self) {
        if !self.shared.closed.is_cancelled() {
            debug!(role = ?self.role, "websocket closed");
            self.shared.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }
}

/// A WebSocket session over a buffered connection.
#[derive(Debug)]
pub struct WebSocket<R = OwnedReadHalf> {
    reader: BufReader<R>,
    sender: WsSender,
    config: WebSocketConfig,
    fragments: Option<(OpCode, BytesMut)>,
    finished: bool,
}

impl<R> WebSocket<R>
where
    R: AsyncRead + Unpin,
{
    /// Must be called inside a tokio runtime; the writer runs on a spawned task.
    pub fn new<W>(reader: BufReader<R>, writer: BufWriter<W>, role: Role, config: WebSocketConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (queue, outgoing) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared { closed: CancellationToken::new(), local_close: OnceLock::new() });
        tokio::spawn(write_loop(writer, outgoing, Arc::clone(&shared)));

        let sender = WsSender { queue, shared, role };
        Self { reader, sender, config, fragments: None, finished: false }
    }

    pub fn server<W>(reader: BufReader<R>, writer: BufWriter<W>, config: WebSocketConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(reader, writer, Role::Server, config)
    }

    pub fn client<W>(reader: BufReader<R>, writer: BufWriter<W>, config: WebSocketConfig) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(reader, writer, Role::Client, config)
    }

    /// A handle for sending from other tasks.
    pub fn sender(&self) -> WsSender {
        self.sender.clone()
    }

    pub async fn send(&self, frame: Frame) -> Result<(), WsError> {
        self.sender.send(frame).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.sender.send_text(text).await
    }

    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.sender.send_binary(data).await
    }

    pub async fn ping(&self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.sender.ping(data).await
    }

    pub async fn close(&self, code: u16, reason: &str) -> Result<(), WsError> {
        self.sender.close(code, reason).await
    }

    pub fn close_force(&self) {
        self.sender.close_force()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Waits for the next message or control event.
    ///
    /// The session always ends with exactly one [`WsEvent::Close`], after
    /// which `None` is returned.
    pub async fn next_event(&mut self) -> Option<WsEvent> {
        if self.finished {
            return None;
        }

        loop {
            let read = select! {
                biased;
                _ = self.sender.shared.closed.cancelled() => None,
                frame = read_frame(&mut self.reader, self.config.max_payload_size) => Some(frame),
            };

            let frame = match read {
                None => return Some(self.finish_local()),
                Some(Ok(Some(frame))) => frame,
                Some(Ok(None)) => return Some(self.fail(WsError::UnexpectedEof)),
                Some(Err(e)) => return Some(self.fail(e)),
            };

            trace!(opcode = ?frame.opcode, fin = frame.is_last_frame, len = frame.payload.len(), "frame received");
            match self.handle_frame(frame).await {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(e) => return Some(self.fail(e)),
            }
        }
    }

    /// Turns the session into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = WsEvent> {
        stream::unfold(self, |mut socket| async move { socket.next_event().await.map(|event| (event, socket)) })
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Option<WsEvent>, WsError> {
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                if self.fragments.is_some() {
                    return Err(WsError::protocol_error("data frame while a fragmented message is open"));
                }
                if frame.is_last_frame {
                    return self.deliver(frame.opcode, frame.payload).await;
                }
                self.fragments = Some((frame.opcode, BytesMut::from(&frame.payload[..])));
                Ok(None)
            }

            OpCode::Continue => {
                let Some((opcode, mut message)) = self.fragments.take() else {
                    return Err(WsError::protocol_error("continuation frame without a message"));
                };

                let size = message.len() + frame.payload.len();
                if size > self.config.max_payload_size {
                    return Err(WsError::PayloadTooLarge { size: size as u64, max: self.config.max_payload_size });
                }

                message.extend_from_slice(&frame.payload);
                if frame.is_last_frame {
                    return self.deliver(opcode, message.freeze()).await;
                }
                self.fragments = Some((opcode, message));
                Ok(None)
            }

            OpCode::Ping => {
                // the pong is not awaited so a slow writer never stalls reading
                if let Err(e) = self.sender.enqueue(Frame::pong(frame.payload.clone())) {
                    debug!(cause = %e, "failed to queue pong");
                }
                Ok(Some(WsEvent::Ping(frame.payload)))
            }

            OpCode::Pong => Ok(Some(WsEvent::Pong(frame.payload))),

            OpCode::Close => {
                let event = parse_close(&frame.payload)?;
                if !self.is_closed()
                    && let Err(e) = self.sender.send(Frame::close(event.code, &event.reason)).await
                {
                    debug!(cause = %e, "failed to acknowledge close");
                }
                self.close_force();
                self.finished = true;
                Ok(Some(WsEvent::Close(event)))
            }
        }
    }

    async fn deliver(&mut self, opcode: OpCode, payload: Bytes) -> Result<Option<WsEvent>, WsError> {
        if opcode == OpCode::Binary {
            return Ok(Some(WsEvent::Binary(payload)));
        }

        match String::from_utf8(payload.to_vec()) {
            Ok(text) => Ok(Some(WsEvent::Text(text))),
            Err(e) => {
                warn!(cause = %e, "text message is not valid utf-8");
                let reason = "invalid utf-8 in text message";
                if let Err(e) = self.sender.close(close_code::INVALID_PAYLOAD, reason).await {
                    debug!(cause = %e, "failed to send close frame");
                }
                self.finished = true;
                Ok(Some(WsEvent::Close(CloseEvent { code: close_code::INVALID_PAYLOAD, reason: reason.to_string() })))
            }
        }
    }

    fn finish_local(&mut self) -> WsEvent {
        self.finished = true;
        let event = self.sender.shared.local_close.get().cloned().unwrap_or_else(|| CloseEvent {
            code: close_code::ABNORMAL,
            reason: "connection closed".to_string(),
        });
        WsEvent::Close(event)
    }

    fn fail(&mut self, e: WsError) -> WsEvent {
        debug!(cause = %e, "websocket failed");
        self.close_force();
        self.finished = true;
        WsEvent::Close(CloseEvent { code: close_code::ABNORMAL, reason: e.to_string() })
    }
}

fn parse_close(payload: &[u8]) -> Result<CloseEvent, WsError> {
    match payload {
        [] => Ok(CloseEvent { code: close_code::NO_STATUS, reason: String::new() }),
        [_] => Err(WsError::protocol_error("close payload of one byte")),
        [high, low, reason @ ..] => Ok(CloseEvent {
            code: u16::from_be_bytes([*high, *low]),
            reason: String::from_utf8_lossy(reason).into_owned(),
        }),
    }
}

async fn write_loop<W>(mut writer: BufWriter<W>, mut outgoing: mpsc::UnboundedReceiver<Outgoing>, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    loop {
        let (frame, done) = select! {
            biased;
            _ = shared.closed.cancelled() => break,
            next = outgoing.recv() => match next {
                Some(outgoing) => outgoing,
                None => break,
            },
        };

        let result = write_frame(&mut writer, &mut buf, frame).await;
        if let Err(e) = &result {
            warn!(cause = %e, "failed to write frame, closing websocket");
            shared.closed.cancel();
        }
        // the sender may have stopped waiting, as for pongs
        let _unwaited = done.send(result);
    }

    outgoing.close();
    while let Ok((_frame, done)) = outgoing.try_recv() {
        let _unwaited = done.send(Err(WsError::ConnectionReset));
    }

    if let Err(e) = writer.shutdown().await {
        trace!(cause = %e, "shutdown after close failed");
    }
}

async fn write_frame<W>(writer: &mut BufWriter<W>, buf: &mut BytesMut, frame: Frame) -> Result<(), WsError>
where
    W: AsyncWrite + Unpin,
{
    buf.clear();
    FrameCodec.encode(frame, buf)?;
    writer.write_all_bytes(buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};

    /// The raw far end of a session, speaking frames directly.
    struct Peer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn send(&mut self, frame: Frame) {
            let mut buf = BytesMut::new();
            FrameCodec.encode(frame, &mut buf).unwrap();
            self.writer.write_all(&buf).await.unwrap();
        }

        async fn recv(&mut self) -> Option<Frame> {
            read_frame(&mut self.reader, usize::MAX).await.unwrap()
        }
    }

    fn session(role: Role) -> (WebSocket<ReadHalf<DuplexStream>>, Peer) {
        let (local, remote) = duplex(64 * 1024);
        let (read_half, write_half) = split(local);
        let socket = WebSocket::new(BufReader::new(read_half), BufWriter::new(write_half), role, WebSocketConfig::default());

        let (read_half, write_half) = split(remote);
        (socket, Peer { reader: BufReader::new(read_half), writer: write_half })
    }

    const MASK: [u8; 4] = [1, 2, 3, 4];

    #[tokio::test]
    async fn server_and_client_exchange_messages() {
        let (local, remote) = duplex(64 * 1024);
        let (read_half, write_half) = split(local);
        let mut server = WebSocket::server(BufReader::new(read_half), BufWriter::new(write_half), WebSocketConfig::default());
        let (read_half, write_half) = split(remote);
        let mut client = WebSocket::client(BufReader::new(read_half), BufWriter::new(write_half), WebSocketConfig::default());

        client.send_text("hello").await.unwrap();
        assert_eq!(server.next_event().await, Some(WsEvent::Text("hello".to_string())));

        server.send_binary(Bytes::from_static(b"\x00\x01")).await.unwrap();
        assert_eq!(client.next_event().await, Some(WsEvent::Binary(Bytes::from_static(b"\x00\x01"))));
    }

    #[tokio::test]
    async fn client_masks_and_server_does_not() {
        let (client, mut peer) = session(Role::Client);
        client.send_text("masked").await.unwrap();
        let frame = peer.recv().await.unwrap();
        assert!(frame.mask.is_some());
        assert_eq!(frame.payload, Bytes::from_static(b"masked"));

        let (server, mut peer) = session(Role::Server);
        server.send(Frame::text("plain").with_mask(MASK)).await.unwrap();
        assert_eq!(peer.recv().await.unwrap().mask, None);
    }

    #[tokio::test]
    async fn reassembles_fragmented_message() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::text("Hel").with_last_frame(false).with_mask(MASK)).await;
        peer.send(Frame::ping("mid").with_mask(MASK)).await;
        peer.send(Frame::new(OpCode::Continue, "lo").with_mask(MASK)).await;

        assert_eq!(server.next_event().await, Some(WsEvent::Ping(Bytes::from_static(b"mid"))));
        assert_eq!(server.next_event().await, Some(WsEvent::Text("Hello".to_string())));
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::ping("are you there").with_mask(MASK)).await;

        assert_eq!(server.next_event().await, Some(WsEvent::Ping(Bytes::from_static(b"are you there"))));
        let pong = peer.recv().await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload, Bytes::from_static(b"are you there"));
    }

    #[tokio::test]
    async fn acknowledges_remote_close() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::close(close_code::NORMAL, "bye").with_mask(MASK)).await;

        let expected = CloseEvent { code: close_code::NORMAL, reason: "bye".to_string() };
        assert_eq!(server.next_event().await, Some(WsEvent::Close(expected)));
        assert_eq!(peer.recv().await.unwrap(), Frame::close(close_code::NORMAL, "bye"));

        assert!(server.is_closed());
        assert!(matches!(server.send_text("late").await, Err(WsError::ConnectionReset)));
        assert_eq!(server.next_event().await, None);
    }

    #[tokio::test]
    async fn empty_close_reports_no_status() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::new(OpCode::Close, Bytes::new()).with_mask(MASK)).await;

        let Some(WsEvent::Close(event)) = server.next_event().await else { panic!("expected close") };
        assert_eq!(event.code, close_code::NO_STATUS);
    }

    #[tokio::test]
    async fn local_close_sends_frame_and_surfaces_event() {
        let (mut server, mut peer) = session(Role::Server);
        server.close(close_code::NORMAL, "done").await.unwrap();

        assert_eq!(peer.recv().await.unwrap(), Frame::close(close_code::NORMAL, "done"));
        assert_eq!(peer.recv().await, None);

        let expected = CloseEvent { code: close_code::NORMAL, reason: "done".to_string() };
        assert_eq!(server.next_event().await, Some(WsEvent::Close(expected)));
        assert_eq!(server.next_event().await, None);
    }

    #[tokio::test]
    async fn long_close_reason_fits_in_one_control_frame() {
        let (mut server, mut peer) = session(Role::Server);
        let reason = "z".repeat(300);
        server.close(close_code::NORMAL, &reason).await.unwrap();

        let close = peer.recv().await.unwrap();
        assert_eq!(close.opcode, OpCode::Close);
        assert!(close.payload.len() <= crate::frame::MAX_CONTROL_PAYLOAD);

        let Some(WsEvent::Close(event)) = server.next_event().await else { panic!("expected close") };
        assert_eq!(event.reason, reason[..crate::frame::MAX_CLOSE_REASON]);
        assert_eq!(&close.payload[2..], event.reason.as_bytes());
    }

    #[tokio::test]
    async fn invalid_utf8_closes_with_1007() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::new(OpCode::Text, Bytes::from_static(b"\xff\xfe")).with_mask(MASK)).await;

        let Some(WsEvent::Close(event)) = server.next_event().await else { panic!("expected close") };
        assert_eq!(event.code, close_code::INVALID_PAYLOAD);

        let close = peer.recv().await.unwrap();
        assert_eq!(close.opcode, OpCode::Close);
        assert_eq!(&close.payload[..2], &close_code::INVALID_PAYLOAD.to_be_bytes());
    }

    #[tokio::test]
    async fn protocol_errors_close_abnormally() {
        let (mut server, mut peer) = session(Role::Server);
        peer.send(Frame::new(OpCode::Continue, "orphan").with_mask(MASK)).await;

        let Some(WsEvent::Close(event)) = server.next_event().await else { panic!("expected close") };
        assert_eq!(event.code, close_code::ABNORMAL);
        assert!(event.reason.contains("continuation"));
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn eof_closes_abnormally() {
        let (mut server, peer) = session(Role::Server);
        drop(peer);

        let Some(WsEvent::Close(event)) = server.next_event().await else { panic!("expected close") };
        assert_eq!(event.code, close_code::ABNORMAL);
        assert_eq!(server.next_event().await, None);
    }

    #[tokio::test]
    async fn cloned_senders_share_the_queue() {
        let (server, mut peer) = session(Role::Server);
        let sender = server.sender();

        let first = sender.send_text("one");
        let second = server.send_text("two");
        let (first, second) = futures::join!(first, second);
        first.unwrap();
        second.unwrap();

        assert_eq!(peer.recv().await.unwrap().payload, Bytes::from_static(b"one"));
        assert_eq!(peer.recv().await.unwrap().payload, Bytes::from_static(b"two"));

        sender.close_force();
        assert!(matches!(server.ping("x").await, Err(WsError::ConnectionReset)));
    }

    #[tokio::test]
    async fn stream_yields_events_until_close() {
        use futures::StreamExt;

        let (server, mut peer) = session(Role::Server);
        peer.send(Frame::text("a").with_mask(MASK)).await;
        peer.send(Frame::close(close_code::NORMAL, "").with_mask(MASK)).await;

        let events: Vec<_> = server.into_stream().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], WsEvent::Text("a".to_string()));
        assert!(matches!(events[1], WsEvent::Close(CloseEvent { code: close_code::NORMAL, .. })));
    }
}
