use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, IntoHeaderName};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use micro_event_http::codec::cookie::{serialize_cookie, CookieOptions};
use tracing::{trace, warn};

use super::Event;
use crate::body::ResponseBody;
use crate::error::{sanitize_status_code, sanitize_status_message, HttpError};

/// The status message of a response, stored in the response extensions for transports
/// able to send a custom reason phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage(pub String);

#[derive(Debug, Default)]
pub(crate) struct ResponseState {
    status: StatusCode,
    status_message: Option<String>,
    headers: HeaderMap,
    body: ResponseBody,
}

impl ResponseState {
    pub(crate) fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(status_message) = self.status_message {
            response.extensions_mut().insert(StatusMessage(status_message));
        }
        response
    }
}

/// Validators and directives written by [`Event::handle_cache_headers`].
#[derive(Debug, Clone, Default)]
pub struct CacheConditions {
    /// seconds, written as both `max-age` and `s-maxage`
    pub max_age: Option<u64>,
    pub modified_time: Option<SystemTime>,
    pub etag: Option<String>,
    /// extra `cache-control` directives, appended after `public`
    pub cache_controls: Vec<String>,
}

fn header_value(value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(cause = %e, value, "invalid response header value, skipped");
            None
        }
    }
}

impl Event {
    pub fn response_status(&self) -> StatusCode {
        self.response.status
    }

    pub fn response_status_text(&self) -> Option<&str> {
        self.response.status_message.as_deref()
    }

    /// Sets the response status (kept unchanged when `code` is out of range) and status text.
    pub fn set_response_status(&mut self, code: u16, text: Option<&str>) {
        self.response.status = sanitize_status_code(code, self.response.status);
        if let Some(text) = text {
            self.response.status_message = Some(sanitize_status_message(text));
        }
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    pub fn set_response_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.response.headers.insert(name, value);
    }

    pub fn append_response_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.response.headers.append(name, value);
    }

    pub fn remove_response_header<K: header::AsHeaderName>(&mut self, name: K) {
        self.response.headers.remove(name);
    }

    /// Sets the `content-type` header unless one is present already.
    pub fn default_content_type(&mut self, content_type: &str) {
        if self.response.headers.contains_key(header::CONTENT_TYPE) {
            return;
        }
        if let Some(value) = header_value(content_type) {
            self.response.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    /// Writes `body` and ends the response.
    pub fn send(&mut self, body: impl Into<Bytes>, content_type: Option<&str>) {
        if self.handled {
            return;
        }
        if let Some(content_type) = content_type {
            self.default_content_type(content_type);
        }
        self.end(ResponseBody::once(body.into()));
    }

    /// Hands a streaming body to the transport and ends the response.
    pub fn send_stream(&mut self, body: ResponseBody) {
        self.end(body);
    }

    /// Ends the response without a body, with status 204 unless `code` says otherwise.
    pub fn send_no_content(&mut self, code: Option<u16>) {
        if self.handled {
            return;
        }
        self.response.status = sanitize_status_code(code.unwrap_or(204), StatusCode::NO_CONTENT);
        if self.response.status == StatusCode::NO_CONTENT {
            self.response.headers.remove(header::CONTENT_LENGTH);
        }
        self.end(ResponseBody::empty());
    }

    /// Redirects to `location` with status 302 unless `code` says otherwise.
    ///
    /// The body is a small html page refreshing to the target for clients ignoring `location`.
    pub fn send_redirect(&mut self, location: &str, code: Option<u16>) {
        if self.handled {
            return;
        }
        self.response.status = sanitize_status_code(code.unwrap_or(302), self.response.status);
        if let Some(value) = header_value(location) {
            self.response.headers.insert(header::LOCATION, value);
        }
        let location = location.replace('"', "%22");
        let html = format!(r#"<!DOCTYPE html><html><head><meta http-equiv="refresh" content="0; url={location}"></head></html>"#);
        self.send(html, Some(mime::TEXT_HTML.as_ref()));
    }

    /// Serializes `error` as the JSON error body, the stack is only included when `debug` is set.
    pub fn send_error(&mut self, error: &HttpError, debug: bool) {
        if self.handled {
            return;
        }
        let body = error.to_json_pretty(debug);

        self.response.status = error.status();
        if let Some(status_message) = error.status_message() {
            self.response.status_message = Some(status_message.to_string());
        }
        self.response.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.end(ResponseBody::once(Bytes::from(body)));
    }

    /// Appends a `Set-Cookie` header, replacing an earlier one for the same cookie name.
    ///
    /// The cookie path defaults to `/`.
    pub fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions) {
        let mut options = options.clone();
        if options.path.is_none() {
            options.path = Some("/".to_string());
        }
        let cookie = serialize_cookie(name, value, &options);
        let Some(cookie) = header_value(&cookie) else {
            return;
        };

        let prefix = format!("{name}=");
        let kept = self
            .response
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter(|value| !value.as_bytes().starts_with(prefix.as_bytes()))
            .cloned()
            .collect::<Vec<_>>();

        self.response.headers.remove(header::SET_COOKIE);
        for value in kept {
            self.response.headers.append(header::SET_COOKIE, value);
        }
        self.response.headers.append(header::SET_COOKIE, cookie);
    }

    /// Expires the cookie `name` immediately.
    pub fn delete_cookie(&mut self, name: &str, options: &CookieOptions) {
        self.set_cookie(name, "", &options.clone().with_max_age(0));
    }

    /// Writes the cache headers described by `conditions` and answers `304 Not Modified` when
    /// the request validators match. Returns true in that case.
    pub fn handle_cache_headers(&mut self, conditions: &CacheConditions) -> bool {
        let mut cache_controls = vec!["public".to_string()];
        cache_controls.extend(conditions.cache_controls.iter().cloned());
        if let Some(max_age) = conditions.max_age {
            cache_controls.push(format!("max-age={max_age}"));
            cache_controls.push(format!("s-maxage={max_age}"));
        }

        let mut matched = false;

        if let Some(modified_time) = conditions.modified_time {
            if let Some(value) = header_value(&httpdate::fmt_http_date(modified_time)) {
                self.response.headers.insert(header::LAST_MODIFIED, value);
            }
            let if_modified_since = self.header(header::IF_MODIFIED_SINCE.as_str()).and_then(|value| httpdate::parse_http_date(&value).ok());
            // http dates have a one second resolution
            if let Some(since) = if_modified_since {
                let modified = httpdate::parse_http_date(&httpdate::fmt_http_date(modified_time)).unwrap_or(modified_time);
                matched |= since >= modified;
            }
        }

        if let Some(etag) = &conditions.etag {
            if let Some(value) = header_value(etag) {
                self.response.headers.insert(header::ETAG, value);
            }
            matched |= self.header(header::IF_NONE_MATCH.as_str()).as_deref() == Some(etag.as_str());
        }

        if let Some(value) = header_value(&cache_controls.join(", ")) {
            self.response.headers.insert(header::CACHE_CONTROL, value);
        }

        if matched {
            trace!(path = %self.url, "cache validators matched");
            if !self.handled {
                self.response.status = StatusCode::NOT_MODIFIED;
                self.end(ResponseBody::empty());
            }
        }
        matched
    }

    fn end(&mut self, body: ResponseBody) {
        if self.handled {
            trace!(path = %self.url, "response already written, write dropped");
            return;
        }
        self.response.body = body;
        self.handled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheConditions, StatusMessage};
    use crate::error::HttpError;
    use crate::event::Event;
    use bytes::Bytes;
    use http::{HeaderValue, Request, StatusCode};
    use http_body_util::{BodyExt, Empty};
    use micro_event_http::codec::cookie::CookieOptions;
    use std::time::{Duration, SystemTime};

    fn event_with(builder: http::request::Builder) -> Event {
        Event::new(builder.body(Empty::<Bytes>::new()).unwrap())
    }

    fn event() -> Event {
        event_with(Request::get("/"))
    }

    async fn body_of(event: Event) -> (http::response::Parts, Bytes) {
        let (parts, body) = event.into_response().into_parts();
        (parts, body.collect().await.unwrap().to_bytes())
    }

    #[tokio::test]
    async fn test_send_writes_once() {
        let mut event = event();
        event.send("first", Some("text/plain"));
        event.send("second", Some("text/html"));

        assert!(event.handled());
        let (parts, body) = body_of(event).await;
        assert_eq!(parts.headers["content-type"], "text/plain");
        assert_eq!(body.as_ref(), b"first");
    }

    #[tokio::test]
    async fn test_send_after_handled_keeps_headers() {
        let mut event = event();
        event.send(Bytes::from_static(b"raw"), None);
        event.send("<p>late</p>", Some("text/html"));

        let (parts, body) = body_of(event).await;
        assert!(!parts.headers.contains_key("content-type"));
        assert_eq!(body.as_ref(), b"raw");
    }

    #[tokio::test]
    async fn test_send_keeps_explicit_content_type() {
        let mut event = event();
        event.set_response_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
        event.send("a,b", Some("text/html"));

        let (parts, _) = body_of(event).await;
        assert_eq!(parts.headers["content-type"], "text/csv");
    }

    #[tokio::test]
    async fn test_send_no_content() {
        let mut event = event();
        event.set_response_header(http::header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        event.send_no_content(None);

        let (parts, body) = body_of(event).await;
        assert_eq!(parts.status, StatusCode::NO_CONTENT);
        assert!(!parts.headers.contains_key("content-length"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_send_redirect() {
        let mut event = event();
        event.send_redirect("/login?next=\"home\"", None);

        let (parts, body) = body_of(event).await;
        assert_eq!(parts.status, StatusCode::FOUND);
        assert_eq!(parts.headers["location"], "/login?next=\"home\"");
        assert_eq!(parts.headers["content-type"], "text/html");
        assert_eq!(
            body.as_ref(),
            br#"<!DOCTYPE html><html><head><meta http-equiv="refresh" content="0; url=/login?next=%22home%22"></head></html>"#
        );
    }

    #[tokio::test]
    async fn test_set_response_status() {
        let mut event = event();
        event.set_response_status(418, Some("I'm a\nteapot"));
        assert_eq!(event.response_status().as_u16(), 418);
        assert_eq!(event.response_status_text(), Some("I'm ateapot"));

        event.set_response_status(42, None);
        assert_eq!(event.response_status().as_u16(), 418);

        let (parts, _) = body_of(event).await;
        assert_eq!(parts.extensions.get::<StatusMessage>(), Some(&StatusMessage("I'm ateapot".to_string())));
    }

    #[tokio::test]
    async fn test_send_error() {
        let mut event = event();
        event.send_error(&HttpError::new(404).with_status_message("Nothing here"), false);

        let (parts, body) = body_of(event).await;
        assert_eq!(parts.status, StatusCode::NOT_FOUND);
        assert_eq!(parts.headers["content-type"], "application/json");
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "{\n  \"statusCode\": 404,\n  \"statusMessage\": \"Nothing here\",\n  \"stack\": []\n}"
        );
    }

    #[test]
    fn test_set_cookie_replaces_same_name() {
        let mut event = event();
        event.set_cookie("a", "1", &CookieOptions::new());
        event.set_cookie("b", "2", &CookieOptions::new().with_http_only(true));
        event.set_cookie("a", "3", &CookieOptions::new());

        let cookies = event.response_headers().get_all("set-cookie").iter().map(|v| v.to_str().unwrap()).collect::<Vec<_>>();
        assert_eq!(cookies, vec!["b=2; HttpOnly; Path=/", "a=3; Path=/"]);
    }

    #[test]
    fn test_delete_cookie() {
        let mut event = event();
        event.delete_cookie("sid", &CookieOptions::new());

        assert_eq!(event.response_headers()["set-cookie"], "sid=; Path=/; Max-Age=0");
    }

    #[tokio::test]
    async fn test_cache_headers_etag_match() {
        let mut event = event_with(Request::get("/").header("if-none-match", "\"v1\""));
        let conditions = CacheConditions { etag: Some("\"v1\"".into()), max_age: Some(60), ..CacheConditions::default() };

        assert!(event.handle_cache_headers(&conditions));

        let (parts, body) = body_of(event).await;
        assert_eq!(parts.status, StatusCode::NOT_MODIFIED);
        assert_eq!(parts.headers["cache-control"], "public, max-age=60, s-maxage=60");
        assert_eq!(parts.headers["etag"], "\"v1\"");
        assert!(body.is_empty());
    }

    #[test]
    fn test_cache_headers_modified_since() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let mut event = event_with(Request::get("/").header("if-modified-since", httpdate::fmt_http_date(modified)));
        let conditions = CacheConditions { modified_time: Some(modified), ..CacheConditions::default() };
        assert!(event.handle_cache_headers(&conditions));

        let stale = modified - Duration::from_secs(10);
        let mut event = event_with(Request::get("/").header("if-modified-since", httpdate::fmt_http_date(stale)));
        assert!(!event.handle_cache_headers(&conditions));
        assert!(!event.handled());
        assert_eq!(event.response_headers()["cache-control"], "public");
        assert!(event.response_headers().contains_key("last-modified"));
    }
}
