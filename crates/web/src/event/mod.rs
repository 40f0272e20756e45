//! One request/response exchange.
//!
//! An [`Event`] owns the request head and body, the request scoped [`Context`] and the
//! response being assembled. It is created by the request driver, lent mutably to every
//! layer in turn, and finally turned into an `http::Response` for the transport.
//!
//! The `handled` flag is monotonic: the first terminal write sets it and every later
//! writer becomes a no-op, so an event is answered at most once.
//!
//! - `request`: request accessors and memoized body reading
//! - `response`: response writers

mod context;
mod params;
mod request;
mod response;

pub use context::Context;
pub use params::PathParams;
pub use response::{CacheConditions, StatusMessage};

use std::borrow::Cow;
use std::collections::HashMap;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use micro_event_http::protocol::{BoxError, ReqBody, RequestHeader};
use serde_json::Value;

use crate::body::ResponseBody;
use crate::session::Session;
use response::ResponseState;

/// Context key of the router parameters.
pub(crate) const PARAMS_KEY: &str = "params";

#[derive(Debug)]
pub struct Event {
    header: RequestHeader,
    original_url: String,
    url: String,
    body: Option<ReqBody>,
    raw_body: Option<Bytes>,
    parsed_body: Option<Option<Value>>,
    context: Context,
    sessions: HashMap<String, Session>,
    response: ResponseState,
    handled: bool,
}

impl Event {
    pub fn new<B>(request: Request<B>) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let header = RequestHeader::from(parts);
        let url = header.uri().path_and_query().map_or_else(|| "/".to_string(), ToString::to_string);

        Self {
            header,
            original_url: url.clone(),
            url,
            body: Some(ReqBody::new(body)),
            raw_body: None,
            parsed_body: None,
            context: Context::new(),
            sessions: HashMap::new(),
            response: ResponseState::default(),
            handled: false,
        }
    }

    /// The url (path and query) as received from the transport, never rewritten.
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// The working url (path and query), relative to the prefix of the running layer.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// The working url with runs of `/` and `\` collapsed into a single `/`.
    pub fn path(&self) -> Cow<'_, str> {
        collapse_slashes(&self.url)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Returns true once a terminal write happened.
    pub fn handled(&self) -> bool {
        self.handled
    }

    /// Marks the event as answered without writing anything more.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub(crate) fn sessions(&self) -> &HashMap<String, Session> {
        &self.sessions
    }

    pub(crate) fn sessions_mut(&mut self) -> &mut HashMap<String, Session> {
        &mut self.sessions
    }

    /// Hands the assembled response over to the transport.
    pub fn into_response(self) -> Response<ResponseBody> {
        self.response.into_response()
    }
}

fn is_slash(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Replaces every run of `/` and `\` with a single `/`.
fn collapse_slashes(url: &str) -> Cow<'_, str> {
    if !url.contains('\\') && !url.contains("//") {
        return Cow::Borrowed(url);
    }

    let mut path = String::with_capacity(url.len());
    let mut in_run = false;
    for c in url.chars() {
        if is_slash(c) {
            if !in_run {
                path.push('/');
            }
            in_run = true;
        } else {
            path.push(c);
            in_run = false;
        }
    }
    Cow::Owned(path)
}
