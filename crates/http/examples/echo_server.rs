use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use tern_http::handler::make_handler;
use tern_http::protocol::body::{BoxError, ReqBody};
use tern_http::server::listen_and_serve;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

async fn echo(request: Request<ReqBody>) -> Result<Response<Full<Bytes>>, BoxError> {
    let path = request.uri().path().to_string();
    info!(path = %path, method = %request.method(), "receiving request");

    let collected = request.into_body().collect().await?;
    if let Some(trailers) = collected.trailers() {
        info!(?trailers, "receiving request trailers");
    }
    let body = collected.to_bytes();

    let body = if body.is_empty() { Bytes::from(format!("Hello from {path}\r\n")) } else { body };
    Ok(Response::builder().status(StatusCode::OK).body(Full::new(body))?)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    if let Err(e) = listen_and_serve(":8080", make_handler(echo)).await {
        error!(cause = %e, "server error");
    }
}
