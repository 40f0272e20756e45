//! The transport-facing handler abstraction.
//!
//! A transport turns bytes into an [`http::Request`], hands it to a [`Handler`] and writes
//! the returned [`http::Response`] back. The application layer (`micro-event`) implements
//! this trait for its dispatcher.

use async_trait::async_trait;
use http::{Request, Response};
use http_body::Body;

use crate::protocol::BoxError;

#[async_trait]
pub trait Handler<ReqBody>: Send + Sync {
    type RespBody: Body;
    type Error: Into<BoxError>;

    async fn call(&self, req: Request<ReqBody>) -> Result<Response<Self::RespBody>, Self::Error>;
}
