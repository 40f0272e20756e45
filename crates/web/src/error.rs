//! The structured application error.
//!
//! Every failure that crosses a handler boundary is an [`HttpError`]: it carries the status
//! sent to the client, an optional status message, optional structured data and the two
//! flags the request driver uses to decide how loudly to report it.

use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;
use micro_event_http::protocol::{BoxError, ParseError};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::session::SessionError;

pub struct HttpError {
    status: StatusCode,
    message: String,
    status_message: Option<String>,
    data: Option<Value>,
    fatal: bool,
    unhandled: bool,
    source: Option<BoxError>,
}

impl HttpError {
    /// Creates an error with the given status, codes outside `100..=999` become 500.
    pub fn new(status: u16) -> Self {
        let status = sanitize_status_code(status, StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            message: status.canonical_reason().unwrap_or("HTTP Error").to_string(),
            status_message: None,
            data: None,
            fatal: false,
            unhandled: false,
            source: None,
        }
    }

    pub fn internal() -> Self {
        Self::new(500)
    }

    pub fn not_found(status_message: impl Into<String>) -> Self {
        Self::new(404).with_status_message(status_message)
    }

    pub fn method_not_allowed(status_message: impl Into<String>) -> Self {
        Self::new(405).with_status_message(status_message)
    }

    /// Wraps a failure that was not raised as an `HttpError`, flagged as unhandled.
    pub fn unhandled<E: Into<BoxError>>(source: E) -> Self {
        let source = source.into();
        let mut error = Self::internal().with_message(source.to_string());
        error.source = Some(source);
        error.unhandled = true;
        error
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the status message, keeping only tab and printable ASCII characters.
    #[must_use]
    pub fn with_status_message(mut self, status_message: impl Into<String>) -> Self {
        let status_message = status_message.into();
        let sanitized = sanitize_status_message(&status_message);
        if sanitized != status_message {
            warn!(
                status_message = %status_message,
                "status message contains unsupported characters and was sanitized, use `message` for longer texts"
            );
        }
        self.status_message = Some(sanitized);
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_source<E: Into<BoxError>>(mut self, source: E) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Marks the error as operator facing.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn is_unhandled(&self) -> bool {
        self.unhandled
    }

    /// The message followed by the messages of the source chain, consecutive repeats collapsed.
    pub fn stack(&self) -> Vec<String> {
        let mut stack = vec![self.message.clone()];
        let mut source = self.source();
        while let Some(error) = source {
            let text = error.to_string();
            if stack.last() != Some(&text) {
                stack.push(text);
            }
            source = error.source();
        }
        stack
    }

    fn body(&self, debug: bool) -> ErrorBody<'_> {
        ErrorBody {
            status_code: self.status.as_u16(),
            status_message: self.status_message.as_deref(),
            stack: if debug { self.stack() } else { Vec::new() },
            data: self.data.as_ref(),
        }
    }

    /// The JSON body sent to clients; the stack is only filled in debug mode.
    pub fn to_json(&self, debug: bool) -> Value {
        serde_json::to_value(self.body(debug)).unwrap_or_default()
    }

    /// [`HttpError::to_json`] rendered with two-space indentation, keys in wire order.
    pub fn to_json_pretty(&self, debug: bool) -> String {
        serde_json::to_string_pretty(&self.body(debug)).unwrap_or_default()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_message: Option<&'a str>,
    stack: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("status_message", &self.status_message)
            .field("data", &self.data)
            .field("fatal", &self.fatal)
            .field("unhandled", &self.unhandled)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

impl From<&str> for HttpError {
    fn from(message: &str) -> Self {
        Self::internal().with_message(message)
    }
}

impl From<String> for HttpError {
    fn from(message: String) -> Self {
        Self::internal().with_message(message)
    }
}

impl From<ParseError> for HttpError {
    fn from(e: ParseError) -> Self {
        Self::unhandled(e)
    }
}

impl From<SessionError> for HttpError {
    fn from(e: SessionError) -> Self {
        Self::unhandled(e)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::unhandled(e)
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        Self::unhandled(e)
    }
}

impl From<BoxError> for HttpError {
    fn from(e: BoxError) -> Self {
        Self::unhandled(e)
    }
}

impl From<Infallible> for HttpError {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

/// Returns `status` as a status code if it lies in `100..=999`, `default` otherwise.
pub fn sanitize_status_code(status: u16, default: StatusCode) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(default)
}

/// Keeps tab and printable ASCII characters only.
pub fn sanitize_status_message(status_message: &str) -> String {
    status_message.chars().filter(|&c| c == '\t' || (' '..='~').contains(&c)).collect()
}

#[cfg(test)]
mod tests {
    use super::{sanitize_status_code, sanitize_status_message, HttpError};
    use http::StatusCode;
    use micro_event_http::protocol::ParseError;
    use serde_json::json;
    use std::io;

    #[test]
    fn test_sanitize_status_code() {
        assert_eq!(sanitize_status_code(404, StatusCode::OK), StatusCode::NOT_FOUND);
        assert_eq!(sanitize_status_code(999, StatusCode::OK).as_u16(), 999);
        assert_eq!(sanitize_status_code(99, StatusCode::OK), StatusCode::OK);
        assert_eq!(sanitize_status_code(1000, StatusCode::OK), StatusCode::OK);
        assert_eq!(HttpError::new(42).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sanitize_status_message() {
        assert_eq!(sanitize_status_message("Not\tFound"), "Not\tFound");
        assert_eq!(sanitize_status_message("line\nbreak ünïcode"), "linebreak ncode");
    }

    #[test]
    fn test_conversions_mark_unhandled() {
        let error = HttpError::from(ParseError::invalid_body("broken"));
        assert!(error.is_unhandled());
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let error = HttpError::from(io::Error::other("disk on fire"));
        assert!(error.is_unhandled());
        assert_eq!(error.stack(), vec!["disk on fire".to_string()]);

        let error = HttpError::from("plain failure");
        assert!(!error.is_unhandled());
        assert_eq!(error.message(), "plain failure");
    }

    #[test]
    fn test_json_body() {
        let error = HttpError::new(422).with_status_message("Invalid input").with_data(json!({"field": "name"}));

        assert_eq!(
            error.to_json(false),
            json!({"statusCode": 422, "statusMessage": "Invalid input", "stack": [], "data": {"field": "name"}})
        );
    }

    #[test]
    fn test_json_body_stack_in_debug() {
        let error = HttpError::new(500).with_message("outer").with_source(io::Error::other("inner"));

        assert_eq!(error.to_json(true), json!({"statusCode": 500, "stack": ["outer", "inner"]}));
        assert!(error.to_json(false).get("statusMessage").is_none());
    }
}
