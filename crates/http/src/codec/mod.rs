//! Wire formats owned by the framework.
//!
//! - [`multipart`]: `multipart/form-data` bodies, decoded into fully materialized parts
//! - [`cookie`]: `Cookie` request header parsing and `Set-Cookie` serialization
//!
//! Both codecs work on complete buffers: the request body is collected (and memoized) by
//! the caller before decoding, responses are assembled before they reach the transport.

pub mod cookie;
pub mod multipart;
