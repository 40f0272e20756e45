//! HTTP request body handling.
//!
//! The transport hands over whatever body type it produces; [`ReqBody`] erases that type
//! so the rest of the framework sees a single `http_body::Body` with `Bytes` frames and
//! boxed errors. Reading the body consumes it: callers that need to read it more than once
//! are expected to memoize the collected bytes (the event does).

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

use crate::protocol::{BoxError, ParseError};

pub struct ReqBody {
    inner: Kind,
}

enum Kind {
    Empty,
    Boxed(UnsyncBoxBody<Bytes, BoxError>),
}

impl ReqBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Empty }
    }

    /// Boxes any transport body into a `ReqBody`.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self { inner: Kind::Boxed(body.map_err(Into::into).boxed_unsync()) }
    }

    /// Reads the body until the stream signals its end.
    ///
    /// Any error raised by the underlying stream is reported as [`ParseError::Stream`].
    pub async fn collect_bytes(self) -> Result<Bytes, ParseError> {
        match self.inner {
            Kind::Empty => Ok(Bytes::new()),
            Kind::Boxed(body) => body.collect().await.map(|collected| collected.to_bytes()).map_err(ParseError::stream),
        }
    }
}

impl std::fmt::Debug for ReqBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Kind::Empty => "empty",
            Kind::Boxed(_) => "boxed",
        };
        f.debug_struct("ReqBody").field("kind", &kind).finish()
    }
}

impl Default for ReqBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ReqBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes))
    }
}

impl From<Vec<u8>> for ReqBody {
    fn from(vec: Vec<u8>) -> Self {
        Self::from(Bytes::from(vec))
    }
}

impl From<String> for ReqBody {
    fn from(value: String) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<&'static str> for ReqBody {
    fn from(value: &'static str) -> Self {
        Self::from(Bytes::from_static(value.as_bytes()))
    }
}

impl From<()> for ReqBody {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Empty => Poll::Ready(None),
            Kind::Boxed(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Empty => true,
            Kind::Boxed(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Boxed(body) => body.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReqBody;
    use crate::protocol::ParseError;
    use bytes::Bytes;
    use http_body::{Body, Frame};
    use http_body_util::StreamBody;
    use std::io;

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<ReqBody>();
    }

    #[tokio::test]
    async fn test_collect_full_body() {
        let body = ReqBody::from("hello world");
        assert_eq!(body.size_hint().exact(), Some(11));
        assert_eq!(body.collect_bytes().await.unwrap(), Bytes::from("hello world"));
    }

    #[tokio::test]
    async fn test_collect_empty_body() {
        let body = ReqBody::empty();
        assert!(body.is_end_stream());
        assert!(body.collect_bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collect_stream_body() {
        let chunks: Vec<Result<_, io::Error>> =
            vec![Ok(Frame::data(Bytes::from("a"))), Ok(Frame::data(Bytes::from("b"))), Ok(Frame::data(Bytes::from("c")))];
        let body = ReqBody::new(StreamBody::new(futures::stream::iter(chunks)));

        assert_eq!(body.collect_bytes().await.unwrap(), Bytes::from("abc"));
    }

    #[tokio::test]
    async fn test_stream_error_is_reported() {
        let chunks: Vec<Result<Frame<Bytes>, io::Error>> =
            vec![Ok(Frame::data(Bytes::from("a"))), Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))];
        let body = ReqBody::new(StreamBody::new(futures::stream::iter(chunks)));

        let result = body.collect_bytes().await;
        assert!(matches!(result, Err(ParseError::Stream { .. })));
    }
}
