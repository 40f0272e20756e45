use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use micro_event_http::codec::cookie::parse_cookies;
use micro_event_http::codec::multipart::{parse_boundary, MultipartDecoder, Part};
use micro_event_http::protocol::{ParseError, RequestHeader};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{Event, PathParams, PARAMS_KEY};
use crate::error::HttpError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

impl Event {
    pub fn request_header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// All values of the request header `name`, joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.header.header(name)
    }

    /// Returns true if the request method is one of `expected`, or HEAD when `allow_head` is set.
    pub fn is_method(&self, expected: &[Method], allow_head: bool) -> bool {
        (allow_head && self.method() == Method::HEAD) || expected.contains(self.method())
    }

    /// Fails with `405 Method Not Allowed` unless [`Event::is_method`] holds.
    pub fn assert_method(&self, expected: &[Method], allow_head: bool) -> Result<(), HttpError> {
        if self.is_method(expected, allow_head) {
            Ok(())
        } else {
            Err(HttpError::method_not_allowed("HTTP method is not allowed."))
        }
    }

    /// The raw query string of the working url, without the leading `?`.
    pub fn query_string(&self) -> &str {
        self.url.split_once('?').map_or("", |(_, query)| query)
    }

    /// Decodes the query string into `T`, failing with `400 Bad Request`.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_qs::from_str(self.query_string())
            .map_err(|e| HttpError::new(400).with_status_message("Invalid query string.").with_source(e))
    }

    /// The query string as an object, repeated keys collected into arrays.
    pub fn query_map(&self) -> Map<String, Value> {
        parse_urlencoded(self.query_string())
    }

    /// Parameters bound by the router that matched this event, if any.
    pub fn params(&self) -> Option<&PathParams> {
        self.context.get::<PathParams>(PARAMS_KEY)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().and_then(|params| params.get(name))
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.context.insert(PARAMS_KEY, params);
    }

    pub fn cookies(&self) -> HashMap<String, String> {
        self.header(http::header::COOKIE.as_str()).map(|header| parse_cookies(&header)).unwrap_or_default()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Reads the whole request body, once; later calls return the same bytes.
    ///
    /// Only PATCH, POST, PUT and DELETE requests may be read (`405` otherwise). Returns `None`
    /// when the request announces no body.
    pub async fn read_raw_body(&mut self) -> Result<Option<Bytes>, HttpError> {
        if !self.header.is_payload_method() {
            return Err(HttpError::method_not_allowed("HTTP method is not allowed."));
        }

        if let Some(raw_body) = &self.raw_body {
            return Ok(Some(raw_body.clone()));
        }
        if !self.header.has_body() {
            return Ok(None);
        }

        let body = self.body.take().ok_or(ParseError::BodyConsumed)?;
        let bytes = body.collect_bytes().await?;
        trace!(len = bytes.len(), "request body collected");

        self.raw_body = Some(bytes.clone());
        Ok(Some(bytes))
    }

    /// Reads and parses the request body, once.
    ///
    /// `application/x-www-form-urlencoded` bodies become an object (repeated keys as arrays),
    /// anything else is parsed as JSON, falling back to the plain text as a JSON string.
    pub async fn read_body(&mut self) -> Result<Option<Value>, HttpError> {
        if let Some(parsed) = &self.parsed_body {
            return Ok(parsed.clone());
        }

        let parsed = self.read_raw_body().await?.map(|raw| {
            let text = String::from_utf8_lossy(&raw);
            let is_form = self.header(http::header::CONTENT_TYPE.as_str()).is_some_and(|ct| ct.starts_with(FORM_URLENCODED));
            if is_form { Value::Object(parse_urlencoded(&text)) } else { parse_lenient_json(&text) }
        });

        self.parsed_body = Some(parsed.clone());
        Ok(parsed)
    }

    /// Decodes a `multipart/form-data` body into its parts.
    ///
    /// Returns `None` when the content type is not multipart or carries no boundary.
    pub async fn read_multipart_form_data(&mut self) -> Result<Option<Vec<Part>>, HttpError> {
        let Some(content_type) = self.header(http::header::CONTENT_TYPE.as_str()) else {
            return Ok(None);
        };
        if !content_type.starts_with(MULTIPART_FORM_DATA) {
            return Ok(None);
        }
        let Some(boundary) = parse_boundary(&content_type).map(str::to_string) else {
            debug!(content_type, "multipart request without boundary");
            return Ok(None);
        };

        let Some(body) = self.read_raw_body().await? else {
            return Ok(None);
        };
        Ok(Some(MultipartDecoder::new(boundary).decode(&body)))
    }
}

/// Parses `application/x-www-form-urlencoded` text, repeated keys are collected into arrays.
pub(crate) fn parse_urlencoded(text: &str) -> Map<String, Value> {
    let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(text).unwrap_or_default();

    let mut object = Map::new();
    for (key, value) in pairs {
        match object.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                object.insert(key, Value::String(value));
            }
        }
    }
    object
}

/// JSON when the text parses as JSON, the trimmed text as a JSON string otherwise.
fn parse_lenient_json(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
