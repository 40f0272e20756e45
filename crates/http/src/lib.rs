//! Protocol level building blocks of the micro event framework
//!
//! This crate holds everything that can be expressed without knowing about an
//! application: the request head, the boxed request body, the wire codecs the
//! framework owns and the authenticated sealing primitive used by sessions.
//!
//! # Architecture
//!
//! - [`protocol`]: request head, request body and error types
//! - [`codec`]: `multipart/form-data` decoder/encoder and the cookie codec
//! - [`seal`]: authenticated encryption of small payloads into a single token
//! - [`handler`]: the transport-facing handler trait
//!
//! The transport itself (socket I/O, TLS, HTTP/2 framing) is out of scope: any
//! transport that can produce an [`http::Request`] with a body implementing
//! [`http_body::Body`] and consume an [`http::Response`] can drive a [`handler::Handler`].
//!
//! # Example
//!
//! ```
//! use micro_event_http::codec::multipart::{MultipartDecoder, MultipartEncoder, Part};
//!
//! let body = MultipartEncoder::new("xyz")
//!     .part(Part::new().with_name("greeting").with_payload("hello"))
//!     .finish();
//!
//! let parts = MultipartDecoder::new("xyz").decode(&body);
//! assert_eq!(parts.len(), 1);
//! assert_eq!(parts[0].name(), Some("greeting"));
//! assert_eq!(parts[0].payload().as_ref(), b"hello");
//! ```

pub mod codec;
pub mod handler;
pub mod protocol;
pub mod seal;

mod utils;
pub(crate) use utils::ensure;
