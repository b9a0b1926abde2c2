use futures::channel::oneshot;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::codec::RequestDecoder;
use crate::connection::message_writer::MessageWriter;
use crate::connection::responder::{Reply, Responder, Upgraded};
use crate::io::{BufReader, BufWriter, DEFAULT_BUF_SIZE};
use crate::protocol::body::{ReqBody, ResponseBody, create_body_sender_receiver};
use crate::protocol::{HttpError, ParseError, SendError};

/// Where a connection delivers its decoded requests.
pub type RequestSender<R, W> = mpsc::Sender<(Request<ReqBody>, Responder<R, W>)>;

/// An HTTP/1.1 connection that hands requests to the application one at a time.
///
/// `HttpConnection` reads a request, sends it to the application together with
/// a [`Responder`] and waits for the response before reading the next one, so
/// pipelined requests are answered strictly in arrival order. While it waits,
/// the connection feeds the request body to the [`ReqBody`] on demand. Body
/// bytes the application did not read are drained before the next request.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    reader: BufReader<R>,
    writer: MessageWriter<W>,
    decoder: RequestDecoder,
}

enum Outcome<R, W> {
    Responded(Result<(), SendError>, oneshot::Sender<Result<(), SendError>>),
    Upgrade(oneshot::Sender<Upgraded<R, W>>),
    Dropped,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_capacity(DEFAULT_BUF_SIZE, DEFAULT_BUF_SIZE, reader, writer)
    }

    pub fn with_capacity(read_buffer_size: usize, write_buffer_size: usize, reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::with_capacity(read_buffer_size, reader),
            writer: MessageWriter::new(BufWriter::with_capacity(write_buffer_size, writer)),
            decoder: RequestDecoder::new(),
        }
    }

    /// Runs the connection until the peer closes it, a request is malformed,
    /// a response fails, the application stops listening or the connection is
    /// upgraded.
    pub async fn process(mut self, requests: RequestSender<R, W>) -> Result<(), HttpError> {
        loop {
            let (header, payload_decoder) = match self.decoder.decode(&mut self.reader).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Err(e) if e.is_bad_request() => {
                    warn!(cause = %e, "malformed request, replying 400");
                    if let Err(send_error) = self.writer.write_response(bad_request(&e)).await {
                        debug!(cause = %send_error, "failed to write 400 response");
                    }
                    return Err(e.into());
                }
                Err(e) => {
                    error!(cause = %e, "can't receive next request");
                    return Err(e.into());
                }
            };

            if header.expects_continue() {
                self.writer.write_continue().await?;
                info!("receive expect request header, sent continue response");
            }

            let (reply_sender, mut reply_receiver) = oneshot::channel();
            let (mut body_sender, req_body) = create_body_sender_receiver(&mut self.reader, payload_decoder);

            if requests.send((header.body(req_body), Responder::new(reply_sender))).await.is_err() {
                info!("request receiver dropped, closing connection");
                return Ok(());
            }

            let mut body_error: Option<ParseError> = None;
            let outcome = {
                let body_future = body_sender.start();
                tokio::pin!(body_future);
                let mut body_done = false;

                let reply = loop {
                    select! {
                        biased;
                        reply = &mut reply_receiver => break reply,
                        result = &mut body_future, if !body_done => {
                            body_done = true;
                            body_error = result.err();
                        }
                    }
                };

                match reply {
                    Ok(Reply::Respond(response, done)) => {
                        let write_future = self.writer.write_response(response);
                        tokio::pin!(write_future);

                        let written = loop {
                            select! {
                                biased;
                                written = &mut write_future => break written,
                                result = &mut body_future, if !body_done => {
                                    body_done = true;
                                    body_error = result.err();
                                }
                            }
                        };
                        Outcome::Responded(written, done)
                    }
                    Ok(Reply::Upgrade(upgraded)) => Outcome::Upgrade(upgraded),
                    Err(_canceled) => Outcome::Dropped,
                }
            };

            match outcome {
                Outcome::Responded(Ok(()), done) => {
                    if done.send(Ok(())).is_err() {
                        debug!("responder stopped waiting for the write result");
                    }
                }
                Outcome::Responded(Err(e), done) => {
                    error!(cause = %e, "failed to write response, closing connection");
                    if done.send(Err(e)).is_err() {
                        debug!("responder stopped waiting for the write result");
                    }
                    return Ok(());
                }
                Outcome::Upgrade(upgraded_sender) => {
                    drop(body_sender);
                    debug!("connection upgraded");
                    let upgraded = Upgraded { reader: self.reader, writer: self.writer.into_inner() };
                    if upgraded_sender.send(upgraded).is_err() {
                        debug!("upgrade receiver dropped");
                    }
                    return Ok(());
                }
                Outcome::Dropped => {
                    info!("responder dropped without a response, closing connection");
                    return Ok(());
                }
            }

            if let Some(e) = body_error {
                return Err(e.into());
            }

            body_sender.skip_data().await?;
        }
    }
}

fn bad_request(e: &ParseError) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::from(e.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    if let Ok(content_type) = HeaderValue::from_str(mime::TEXT_PLAIN_UTF_8.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use indoc::indoc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};
    use tokio::task::JoinHandle;

    type TestReceiver = mpsc::Receiver<(Request<ReqBody>, Responder<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>)>;

    fn crlf(s: &str) -> Vec<u8> {
        s.replace('\n', "\r\n").into_bytes()
    }

    async fn connect(input: &[u8]) -> (DuplexStream, TestReceiver, JoinHandle<Result<(), HttpError>>) {
        let (mut client, server) = duplex(64 * 1024);
        let (read_half, write_half) = split(server);
        let (sender, receiver) = mpsc::channel(8);
        let connection = tokio::spawn(HttpConnection::new(read_half, write_half).process(sender));

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        (client, receiver, connection)
    }

    async fn read_all(client: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let input = crlf(indoc! {"
            GET /one HTTP/1.1
            Host: x

            GET /two HTTP/1.1
            Host: x

        "});
        let (mut client, mut receiver, connection) = connect(&input).await;

        while let Some((request, responder)) = receiver.recv().await {
            let body = request.uri().path().trim_start_matches('/').to_string();
            responder.respond(Response::new(Full::new(Bytes::from(body)))).await.unwrap();
        }

        connection.await.unwrap().unwrap();
        assert_eq!(
            read_all(&mut client).await,
            "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\noneHTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\ntwo"
        );
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (mut client, mut receiver, connection) = connect(&crlf("GET / HTTP/2.0\n\n")).await;

        assert!(receiver.recv().await.is_none());
        assert!(matches!(connection.await.unwrap(), Err(HttpError::RequestError { source: ParseError::MalformedVersion { .. } })));

        let out = read_all(&mut client).await;
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("content-type: text/plain; charset=utf-8\r\n"));
        assert!(out.contains("HTTP/2.0"));
    }

    #[tokio::test]
    async fn conflicting_content_length_gets_400() {
        let input = crlf("POST / HTTP/1.1\nContent-Length: 4\nContent-Length: 5\n\nhello");
        let (mut client, mut receiver, connection) = connect(&input).await;

        assert!(receiver.recv().await.is_none());
        assert!(matches!(
            connection.await.unwrap(),
            Err(HttpError::RequestError { source: ParseError::ConflictingContentLength { .. } })
        ));
        assert!(read_all(&mut client).await.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn unread_body_is_skipped() {
        let input = crlf("POST /a HTTP/1.1\nContent-Length: 5\n\nhelloGET /b HTTP/1.1\n\n");
        let (mut client, mut receiver, connection) = connect(&input).await;

        let mut paths = Vec::new();
        while let Some((request, responder)) = receiver.recv().await {
            paths.push(request.uri().path().to_string());
            drop(request);
            responder.respond(Response::new(Full::new(Bytes::from_static(b"ok")))).await.unwrap();
        }

        connection.await.unwrap().unwrap();
        assert_eq!(paths, ["/a", "/b"]);
        assert_eq!(read_all(&mut client).await.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[tokio::test]
    async fn chunked_body_with_trailers_reaches_handler() {
        let input = crlf(indoc! {"
            POST /upload HTTP/1.1
            Transfer-Encoding: chunked
            Trailer: X-Sum

            5
            hello
            6
             world
            0
            X-Sum: 11

        "});
        let (mut client, mut receiver, connection) = connect(&input).await;

        let (request, responder) = receiver.recv().await.unwrap();
        let collected = request.into_body().collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap()["x-sum"], "11");
        let body = collected.to_bytes();
        assert_eq!(body, Bytes::from_static(b"hello world"));

        responder.respond(Response::new(Full::new(body))).await.unwrap();
        assert!(receiver.recv().await.is_none());

        connection.await.unwrap().unwrap();
        assert!(read_all(&mut client).await.ends_with("content-length: 11\r\n\r\nhello world"));
    }

    #[tokio::test]
    async fn expect_continue_is_acknowledged() {
        let input = crlf("POST / HTTP/1.1\nExpect: 100-continue\nContent-Length: 2\n\nok");
        let (mut client, mut receiver, connection) = connect(&input).await;

        let (request, responder) = receiver.recv().await.unwrap();
        let body = request.into_body().collect().await.unwrap().to_bytes();
        responder.respond(Response::new(Full::new(body))).await.unwrap();

        drop(receiver);
        connection.await.unwrap().unwrap();
        assert_eq!(read_all(&mut client).await, "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");
    }

    #[tokio::test]
    async fn dropped_responder_closes_connection() {
        let input = crlf("GET /a HTTP/1.1\n\nGET /b HTTP/1.1\n\n");
        let (mut client, mut receiver, connection) = connect(&input).await;

        let (_request, responder) = receiver.recv().await.unwrap();
        drop(responder);

        assert!(receiver.recv().await.is_none());
        connection.await.unwrap().unwrap();
        assert_eq!(read_all(&mut client).await, "");
    }

    #[tokio::test]
    async fn upgrade_hands_over_buffered_halves() {
        let (mut client, server) = duplex(64 * 1024);
        let (read_half, write_half) = split(server);
        let (sender, mut receiver) = mpsc::channel(8);
        let connection = tokio::spawn(HttpConnection::new(read_half, write_half).process(sender));

        client.write_all(b"GET /ws HTTP/1.1\r\nHost: x\r\n\r\nextra").await.unwrap();

        let (_request, responder) = receiver.recv().await.unwrap();
        let Upgraded { mut reader, mut writer } = responder.upgrade().await.unwrap();
        connection.await.unwrap().unwrap();

        let mut extra = [0u8; 5];
        assert_eq!(reader.read_full(&mut extra).await.unwrap(), Some(5));
        assert_eq!(&extra, b"extra");

        writer.write_all_bytes(b"hi").await.unwrap();
        writer.flush().await.unwrap();
        drop((reader, writer));

        assert_eq!(read_all(&mut client).await, "hi");
    }

    #[tokio::test]
    async fn abandoned_chunked_body_is_drained_before_next_request() {
        let (mut client, server) = duplex(64 * 1024);
        let (read_half, write_half) = split(server);
        let (sender, mut receiver) = mpsc::channel(8);
        let connection = tokio::spawn(HttpConnection::new(read_half, write_half).process(sender));

        client.write_all(&crlf("POST /a HTTP/1.1\nHost: x\nTransfer-Encoding: chunked\n\n5\nhello")).await.unwrap();

        let (request, responder) = receiver.recv().await.unwrap();
        let mut paths = vec![request.uri().path().to_string()];
        let mut body = request.into_body();

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hello"));

        // the connection is now waiting for the CRLF after the chunk
        assert!(tokio::time::timeout(Duration::from_millis(50), body.frame()).await.is_err());
        drop(body);
        responder.respond(Response::new(Full::new(Bytes::from_static(b"a")))).await.unwrap();

        client.write_all(&crlf("\n0\n\nGET /b HTTP/1.1\nHost: x\n\n")).await.unwrap();
        client.shutdown().await.unwrap();

        while let Some((request, responder)) = receiver.recv().await {
            paths.push(request.uri().path().to_string());
            responder.respond(Response::new(Full::new(Bytes::from_static(b"b")))).await.unwrap();
        }

        connection.await.unwrap().unwrap();
        assert_eq!(paths, ["/a", "/b"]);
        assert_eq!(
            read_all(&mut client).await,
            "HTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\naHTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\nb"
        );
    }
}
