//! HTTP request head.
//!
//! Wraps the standard `http::Request<()>` and adds the few lookups the rest of the
//! framework keeps asking for: payload-carrying methods, declared body length and
//! header values joined the way multi-valued headers are presented to handlers.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri};

/// Methods whose requests are allowed to carry a body that handlers may read.
const PAYLOAD_METHODS: [Method; 4] = [Method::PATCH, Method::POST, Method::PUT, Method::DELETE];

#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl RequestHeader {
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns true for PATCH, POST, PUT and DELETE.
    pub fn is_payload_method(&self) -> bool {
        PAYLOAD_METHODS.contains(self.method())
    }

    /// Returns all values of the header `name`, joined with `", "`.
    ///
    /// Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<String> {
        let values = self
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>();

        if values.is_empty() { None } else { Some(values.join(", ")) }
    }

    /// The declared `content-length`, or `None` when absent or unparsable.
    pub fn content_length(&self) -> Option<u64> {
        self.headers()
            .get(http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    }

    /// Returns true when the transport announced a chunked body.
    pub fn is_chunked(&self) -> bool {
        self.headers()
            .get_all(http::header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.to_ascii_lowercase().contains("chunked"))
    }

    /// Returns true when a request body is announced with a non-zero length or chunked encoding.
    pub fn has_body(&self) -> bool {
        self.content_length().is_some_and(|len| len > 0) || self.is_chunked()
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
