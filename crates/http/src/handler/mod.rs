//! Request handlers for [`Server::serve`](crate::server::Server::serve).
//!
//! [`make_handler`] turns an async function from a request to a response into
//! a [`Handler`].

use async_trait::async_trait;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::body::BoxError;

/// Answers one request. Errors are reported to the client as a `500`.
#[async_trait]
pub trait Handler<ReqBody> {
    type RespBody: Body;
    type Error: Into<BoxError>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<B, RespBody, Err, F, Fut> Handler<B> for HandlerFn<F>
where
    RespBody: Body,
    B: Send + 'static,
    F: Fn(Request<B>) -> Fut + Send + Sync,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: Request<B>) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, B, RespBody, Err, Ret>(f: F) -> HandlerFn<F>
where
    RespBody: Body,
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(Request<B>) -> Ret,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use std::convert::Infallible;

    async fn echo_path(request: Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
        Ok(Response::new(Full::new(Bytes::from(request.uri().path().to_string()))))
    }

    #[tokio::test]
    async fn function_handler() {
        let handler = make_handler(echo_path);
        let request = Request::builder().uri("/hello").body(()).unwrap();

        let response = handler.call(request).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"/hello"));
    }
}
