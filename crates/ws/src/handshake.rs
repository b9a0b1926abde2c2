//! Opening handshake, server and client side.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use http::header::{CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use sha1::{Digest, Sha1};
use tern_http::codec::{HeaderEncoder, read_mime_header};
use tern_http::connection::{Responder, Upgraded};
use tern_http::io::{BufReader, BufWriter};
use tern_http::protocol::PayloadSize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};
use url::Url;

use crate::{WebSocket, WebSocketConfig, WsError};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Whether `request` asks for a WebSocket upgrade.
pub fn acceptable<B>(request: &Request<B>) -> bool {
    let upgrade = request.headers().get(UPGRADE).is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"websocket"));
    let has_key = request.headers().get(SEC_WEBSOCKET_KEY).is_some_and(|value| !value.is_empty());
    upgrade && has_key
}

/// `base64(sha1(key + GUID))`, the value of `Sec-WebSocket-Accept`.
pub fn create_sec_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(sha1.finalize())
}

/// A fresh random `Sec-WebSocket-Key`.
pub fn create_sec_key() -> String {
    STANDARD.encode(rand::random::<[u8; 16]>())
}

/// Upgrades an HTTP request to a server-side WebSocket.
///
/// On [`WsError::NotAcceptable`] nothing is written and the responder is
/// dropped, which closes the connection.
pub async fn accept<B, R, W>(request: &Request<B>, responder: Responder<R, W>, config: WebSocketConfig) -> Result<WebSocket<R>, WsError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    if !acceptable(request) {
        return Err(WsError::not_acceptable("missing upgrade: websocket or sec-websocket-key"));
    }

    let key = request.headers().get(SEC_WEBSOCKET_KEY).and_then(|value| value.to_str().ok()).unwrap_or_default();
    let accept = HeaderValue::try_from(create_sec_accept(key)).map_err(|e| WsError::handshake_failed(e.to_string()))?;

    let mut head = Response::new(());
    *head.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = head.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    for name in [SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION] {
        if let Some(value) = request.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }

    let Upgraded { reader, writer } = responder.upgrade().await?;
    let (reader, mut writer) = resize(reader, writer, &config);

    let mut buf = BytesMut::new();
    HeaderEncoder.encode((head, PayloadSize::Empty), &mut buf)?;
    writer.write_all_bytes(&buf).await?;
    writer.flush().await?;
    debug!("websocket handshake accepted");

    Ok(WebSocket::server(reader, writer, config))
}

/// Rebuilds the upgraded buffers with the configured sizes when they hold no data.
fn resize<R, W>(reader: BufReader<R>, writer: BufWriter<W>, config: &WebSocketConfig) -> (BufReader<R>, BufWriter<W>) {
    let reader = if reader.buffered() == 0 && reader.capacity() != config.read_buffer_size {
        BufReader::with_capacity(config.read_buffer_size, reader.into_inner())
    } else {
        reader
    };
    let writer = if writer.buffered() == 0 && writer.capacity() != config.write_buffer_size {
        BufWriter::with_capacity(config.write_buffer_size, writer.into_inner())
    } else {
        writer
    };
    (reader, writer)
}

/// Performs the client side of the handshake over an open connection.
///
/// Any failure leaves the connection in an unknown state; the caller must close it.
pub async fn handshake<R, W>(url: &Url, headers: &HeaderMap, reader: &mut BufReader<R>, writer: &mut BufWriter<W>) -> Result<(), WsError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let key = create_sec_key();

    let mut request = format!("GET {} HTTP/1.1\r\n", request_target(url));
    if !headers.contains_key(HOST) {
        request.push_str(&format!("host: {}\r\n", host_header(url)?));
    }
    request.push_str("upgrade: websocket\r\n");
    request.push_str("connection: Upgrade\r\n");
    request.push_str(&format!("sec-websocket-key: {key}\r\n"));
    request.push_str("sec-websocket-version: 13\r\n");

    let mut buf = BytesMut::from(request.as_bytes());
    for (name, value) in headers.iter() {
        buf.extend_from_slice(name.as_ref());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");

    writer.write_all_bytes(&buf).await?;
    writer.flush().await?;

    let status_line = match reader.read_line().await? {
        Some(line) if !line.more => String::from_utf8_lossy(line.line).into_owned(),
        Some(_) => return Err(WsError::handshake_failed("status line too long")),
        None => return Err(WsError::UnexpectedEof),
    };

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    if version != "HTTP/1.1" || status != "101" {
        return Err(WsError::handshake_failed(format!("server didn't accept handshake: version={version}, status={status}")));
    }

    let response_headers = read_mime_header(reader).await?;
    let expected = create_sec_accept(&key);
    let actual = response_headers.get(SEC_WEBSOCKET_ACCEPT).and_then(|value| value.to_str().ok()).unwrap_or_default();
    if actual != expected {
        warn!(%expected, actual, "sec-websocket-accept mismatch");
        return Err(WsError::handshake_failed(format!("sec-websocket-accept mismatch: expected {expected}, got {actual:?}")));
    }

    Ok(())
}

fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn host_header(url: &Url) -> Result<String, WsError> {
    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Connects to a `ws://` or `http://` endpoint with the default configuration.
pub async fn connect(endpoint: &str) -> Result<WebSocket<OwnedReadHalf>, WsError> {
    connect_with_config(endpoint, &HeaderMap::new(), WebSocketConfig::default()).await
}

pub async fn connect_with_config(endpoint: &str, headers: &HeaderMap, config: WebSocketConfig) -> Result<WebSocket<OwnedReadHalf>, WsError> {
    let url = Url::parse(endpoint)?;
    match url.scheme() {
        "ws" | "http" => {}
        scheme => return Err(WsError::UnsupportedScheme { scheme: scheme.to_string() }),
    }

    let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
    let port = url.port_or_known_default().unwrap_or(80);
    let tcp_stream = TcpStream::connect((host, port)).await?;
    let (reader, writer) = tcp_stream.into_split();

    let mut reader = BufReader::with_capacity(config.read_buffer_size, reader);
    let mut writer = BufWriter::with_capacity(config.write_buffer_size, writer);
    handshake(&url, headers, &mut reader, &mut writer).await?;
    debug!(%url, "websocket connected");

    Ok(WebSocket::client(reader, writer, config))
}
