use tern_http::server::Server;
use tern_ws::{WebSocketConfig, WsEvent, accept};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut server = match Server::bind(":8080").await {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "failed to bind");
            return;
        }
    };
    info!(local_addr = %server.local_addr(), "websocket echo listening");

    while let Some((request, responder)) = server.next().await {
        let mut socket = match accept(&request, responder, WebSocketConfig::default()).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(cause = %e, path = %request.uri().path(), "refusing connection");
                continue;
            }
        };

        tokio::spawn(async move {
            while let Some(event) = socket.next_event().await {
                let result = match event {
                    WsEvent::Text(text) => socket.send_text(text).await,
                    WsEvent::Binary(data) => socket.send_binary(data).await,
                    WsEvent::Close(close) => {
                        info!(code = close.code, reason = %close.reason, "websocket closed");
                        break;
                    }
                    WsEvent::Ping(_) | WsEvent::Pong(_) => Ok(()),
                };

                if let Err(e) = result {
                    warn!(cause = %e, "echo failed");
                    socket.close_force();
                }
            }
        });
    }
}
