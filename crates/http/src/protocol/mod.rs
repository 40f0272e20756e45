//! Core protocol abstractions.
//!
//! - [`RequestHeader`]: the request head (method, uri, version, headers)
//! - [`ReqBody`]: a type-erased request body implementing `http_body::Body`
//! - [`ParseError`]: failures while reading or decoding a request body

mod request;
pub use request::RequestHeader;

mod error;
pub use error::BoxError;
pub use error::ParseError;

pub mod body;
pub use body::ReqBody;
