//! Parsed request head.
//!
//! Wraps `http::Request<()>` so the decoder can hand out the head before the
//! body reader is attached.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body, converting the head into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Whether the client asked for an interim `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(http::header::EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_expect_continue() {
        let request = Request::builder().header("Expect", "100-Continue").body(()).unwrap();
        assert!(RequestHeader::from(request).expects_continue());

        let request = Request::builder().body(()).unwrap();
        assert!(!RequestHeader::from(request).expects_continue());
    }

    #[test]
    fn attaches_body() {
        let request = Request::builder().method(Method::POST).uri("/upload").body(()).unwrap();
        let request = RequestHeader::from(request).body("payload");
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(*request.body(), "payload");
    }
}
