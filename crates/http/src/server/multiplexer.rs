use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use http::{Request, Response, StatusCode};
use http_body::Body;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{HttpConnection, RequestSender, Responder};
use crate::handler::Handler;
use crate::protocol::body::{BoxError, ReqBody, ResponseBody};
use crate::server::{ServerBuilder, ServerConfig, ServerError};

/// A request from any live connection, with the means to answer it.
pub type Incoming = (Request<ReqBody>, Responder);

type Registry = Arc<DashMap<u64, CancellationToken>>;

/// Accepts TCP connections and merges their requests into one stream.
///
/// Every accepted connection runs on its own task and is tracked until its
/// loop exits. [`close`](Server::close) stops accepting and force-closes all
/// tracked connections; dropping the server does the same.
#[derive(Debug)]
pub struct Server {
    receiver: mpsc::Receiver<Incoming>,
    shutdown: CancellationToken,
    connections: Registry,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds `addr` (`host:port` or `:port`) with default settings.
    pub async fn bind(addr: &str) -> Result<Server, ServerError> {
        Server::builder().address(addr).build()?.start().await
    }

    pub async fn start(config: ServerConfig) -> Result<Server, ServerError> {
        let listener =
            TcpListener::bind(config.address).await.map_err(|source| ServerError::Bind { address: config.address, source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind { address: config.address, source })?;
        info!(%local_addr, "start listening");

        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let shutdown = CancellationToken::new();
        let connections: Registry = Arc::new(DashMap::new());

        let accept_task =
            tokio::spawn(accept_loop(listener, config, sender, shutdown.clone(), Arc::clone(&connections)));

        Ok(Server { receiver, shutdown, connections, local_addr, accept_task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The next request from any connection, or `None` once the server is
    /// closed and every connection has ended.
    pub async fn next(&mut self) -> Option<Incoming> {
        self.receiver.recv().await
    }

    /// Stops accepting and force-closes every live connection.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        info!(local_addr = %self.local_addr, connections = self.connections.len(), "closing server");
        self.shutdown.cancel();
        for entry in self.connections.iter() {
            entry.value().cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.accept_task.is_finished()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Answers every request with `handler`, each on its own task, until the
    /// server is closed. Handler errors are logged and answered with a `500`.
    pub async fn serve<H>(mut self, handler: H)
    where
        H: Handler<ReqBody> + Send + Sync + 'static,
        H::RespBody: Body<Data = Bytes> + Send + 'static,
        <H::RespBody as Body>::Error: Into<BoxError>,
    {
        let handler = Arc::new(handler);
        while let Some((request, responder)) = self.next().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let response = match handler.call(request).await {
                    Ok(response) => response.map(ResponseBody::stream),
                    Err(e) => {
                        let e: BoxError = e.into();
                        error!(cause = %e, "handler failed, replying 500");
                        internal_server_error()
                    }
                };

                if let Err(e) = responder.respond(response).await {
                    warn!(cause = %e, "failed to send response");
                }
            });
        }
    }
}

impl Stream for Server {
    type Item = Incoming;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

/// Binds `addr` and dispatches every request to `handler`.
pub async fn listen_and_serve<H>(addr: &str, handler: H) -> Result<(), ServerError>
where
    H: Handler<ReqBody> + Send + Sync + 'static,
    H::RespBody: Body<Data = Bytes> + Send + 'static,
    <H::RespBody as Body>::Error: Into<BoxError>,
{
    let server = Server::builder().address(addr).build()?.start().await?;
    server.serve(handler).await;
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    sender: RequestSender<OwnedReadHalf, OwnedWriteHalf>,
    shutdown: CancellationToken,
    connections: Registry,
) {
    let mut next_id: u64 = 0;
    loop {
        let (tcp_stream, remote_addr) = select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        let id = next_id;
        next_id += 1;

        let token = shutdown.child_token();
        connections.insert(id, token.clone());

        tokio::spawn(run_connection(
            id,
            tcp_stream,
            remote_addr,
            config.clone(),
            sender.clone(),
            token,
            Arc::clone(&connections),
        ));
    }

    info!("stop accepting connections");
}

async fn run_connection(
    id: u64,
    tcp_stream: TcpStream,
    remote_addr: SocketAddr,
    config: ServerConfig,
    sender: RequestSender<OwnedReadHalf, OwnedWriteHalf>,
    token: CancellationToken,
    connections: Registry,
) {
    debug!(%remote_addr, id, "connection opened");
    let (reader, writer) = tcp_stream.into_split();
    let connection = HttpConnection::with_capacity(config.read_buffer_size, config.write_buffer_size, reader, writer);

    select! {
        _ = token.cancelled() => {
            info!(%remote_addr, id, "connection force closed");
        }
        result = connection.process(sender) => match result {
            Ok(()) => debug!(%remote_addr, id, "connection closed"),
            Err(e) => info!(%remote_addr, id, cause = %e, "connection closed with error"),
        },
    }

    connections.remove(&id);
}

fn internal_server_error() -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
