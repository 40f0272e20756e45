//! Handler results and their coercion.
//!
//! A handler returns anything implementing [`IntoReply`]; the dispatcher turns the resulting
//! [`Reply`] into the response with an exhaustive match:
//!
//! | reply | response |
//! |-------|----------|
//! | `Text` | html body |
//! | `Bytes` | raw body |
//! | `Blob` | body with the blob's content type |
//! | `Stream` | streamed body |
//! | `Json` | JSON body, pretty printed in debug mode |
//! | `NoContent` | `204` with an empty body |
//! | `Pass` | nothing, the next layer runs |

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::body::ResponseBody;
use crate::error::HttpError;

#[derive(Debug)]
pub enum Reply {
    Text(String),
    Bytes(Bytes),
    Blob { content_type: String, bytes: Bytes },
    Stream(ResponseBody),
    Json(Value),
    NoContent,
    /// the handler declined, the request goes on to the next layer
    Pass,
}

/// Bytes tagged with their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    content_type: String,
    bytes: Bytes,
}

impl Blob {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { content_type: content_type.into(), bytes: bytes.into() }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Any serializable value, sent as JSON.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HttpError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(self)
    }
}

/// An error value is raised, not written.
impl IntoReply for HttpError {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Err(self)
    }
}

impl<T: IntoReply, E: Into<HttpError>> IntoReply for Result<T, E> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        self.map_err(Into::into)?.into_reply()
    }
}

/// `None` is an explicit empty answer.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        match self {
            Some(t) => t.into_reply(),
            None => Ok(Reply::NoContent),
        }
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Pass)
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Text(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Text(self.to_string()))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Bytes(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Bytes(Bytes::from(self)))
    }
}

impl IntoReply for Blob {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Blob { content_type: self.content_type, bytes: self.bytes })
    }
}

impl IntoReply for ResponseBody {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(Reply::Stream(self))
    }
}

/// `null` is an explicit empty answer, any other value is sent as JSON.
impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, HttpError> {
        match self {
            Value::Null => Ok(Reply::NoContent),
            value => Ok(Reply::Json(value)),
        }
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        serde_json::to_value(self.0)?.into_reply()
    }
}

macro_rules! impl_into_reply_for_scalar {
    ($($ty:ty),*) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, HttpError> {
                    Ok(Reply::Json(Value::from(self)))
                }
            }
        )*
    };
}

impl_into_reply_for_scalar!(bool, i32, i64, u32, u64, f64);
