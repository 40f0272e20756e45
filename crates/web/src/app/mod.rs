//! The dispatcher.
//!
//! An [`App`] holds an ordered list of layers. For every event it walks them in registration
//! order: a layer whose route prefix the url does not start with is skipped, otherwise its
//! handler sees the url with the prefix stripped. The first layer that answers ends the walk;
//! its [`Reply`] is written onto the event:
//!
//! - `Text` is sent as `text/html`
//! - `Bytes` is sent as is, `Blob` with its own content type
//! - `Stream` is handed to the transport
//! - `Json` is serialized, pretty printed in debug mode
//! - `NoContent` ends the response with `204`
//! - `Pass` moves on to the next layer
//!
//! When no layer answers the event gets a `404`. Errors raised by handlers are not caught by
//! the layers; the request driver ([`App::handle_request`]) reports them once, either to the
//! configured error callback or as a JSON error body.
//!
//! # Example
//!
//! ```no_run
//! use micro_event::router::{get, Router};
//! use micro_event::{handler_fn, App, Event};
//! use serde_json::{json, Value};
//!
//! async fn hello(_event: &mut Event) -> &'static str {
//!     "hello world"
//! }
//!
//! async fn status(_event: &mut Event) -> Value {
//!     json!({"status": "ok"})
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Router::builder().route("/status", get(handler_fn(status))).build()?;
//!
//! let app = App::builder().layer("/api", api).layer("/", handler_fn(hello)).build();
//!
//! let request = http::Request::get("/api/status").body(http_body_util::Empty::<bytes::Bytes>::new())?;
//! let response = app.handle_request(request).await;
//! assert_eq!(response.status(), 200);
//! # Ok(())
//! # }
//! ```

mod layer;

pub use layer::{fn_match, LayerMatch};

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::{Request, Response};
use http_body::Body;
use micro_event_http::handler::Handler;
use micro_event_http::protocol::BoxError;
use tracing::{debug, error, trace};

use crate::body::ResponseBody;
use crate::error::HttpError;
use crate::event::Event;
use crate::handler::{lazy_handler, EventHandler};
use crate::responder::Reply;
use layer::{HandlerFactory, Layer, LayerHandler};

type ErrorCallback = Arc<dyn Fn(&HttpError, &mut Event) + Send + Sync>;

pub struct App {
    layers: Vec<Layer>,
    debug: bool,
    on_error: Option<ErrorCallback>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Drives one request: builds the event, dispatches it and returns the response.
    pub async fn handle_request<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let mut event = Event::new(request);
        self.dispatch(&mut event).await;
        event.into_response()
    }

    /// Runs the layers over `event`, answering `404` when none of them does, and reports any
    /// error raised on the way.
    pub async fn dispatch(&self, event: &mut Event) {
        if let Err(e) = self.answer(event).await {
            self.report(&e, event);
        }
    }

    /// Runs the layers, failing with `404` when none of them answered.
    async fn answer(&self, event: &mut Event) -> Result<(), HttpError> {
        self.run_layers(event).await?;
        if event.handled() {
            return Ok(());
        }
        Err(HttpError::not_found(format!("Cannot find any path matching {}.", event.url())))
    }

    async fn run_layers(&self, event: &mut Event) -> Result<(), HttpError> {
        let url = event.url().to_string();
        let result = self.walk(event, &url).await;
        event.set_url(url);
        result
    }

    async fn walk(&self, event: &mut Event, url: &str) -> Result<(), HttpError> {
        for layer in &self.layers {
            let Some(layer_url) = layer.strip_route(url) else {
                continue;
            };
            event.set_url(layer_url);

            if let Some(matcher) = &layer.matcher {
                if !matcher.matches(layer_url, event) {
                    continue;
                }
            }

            let reply = layer.handler.handle(event).await?;
            if event.handled() {
                trace!(route = %layer.route, "layer answered the event");
                return Ok(());
            }
            if self.write_reply(event, reply)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Writes `reply` onto the event, returns false when the reply passes.
    fn write_reply(&self, event: &mut Event, reply: Reply) -> Result<bool, HttpError> {
        match reply {
            Reply::Pass => return Ok(false),
            Reply::Text(text) => event.send(text, Some(mime::TEXT_HTML.as_ref())),
            Reply::Bytes(bytes) => event.send(bytes, None),
            Reply::Blob { content_type, bytes } => event.send(bytes, Some(&content_type)),
            Reply::Stream(body) => event.send_stream(body),
            Reply::Json(value) => {
                let body = if self.debug { serde_json::to_string_pretty(&value)? } else { serde_json::to_string(&value)? };
                event.send(body, Some(mime::APPLICATION_JSON.as_ref()));
            }
            Reply::NoContent => event.send_no_content(None),
        }
        Ok(true)
    }

    fn report(&self, e: &HttpError, event: &mut Event) {
        if let Some(on_error) = &self.on_error {
            on_error(e, event);
            return;
        }

        if e.is_fatal() || e.is_unhandled() {
            let tag = if e.is_fatal() { "[fatal]" } else { "[unhandled]" };
            error!(tag, url = event.original_url(), cause = %e, stack = ?e.stack(), "request failed");
        } else {
            debug!(url = event.original_url(), status = e.status().as_u16(), "request failed");
        }
        event.send_error(e, self.debug);
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").field("layers", &self.layers).field("debug", &self.debug).field("on_error", &self.on_error.is_some()).finish()
    }
}

/// A nested application fails with `404` on the events it leaves unanswered.
#[async_trait]
impl EventHandler for App {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        self.answer(event).await?;
        Ok(Reply::Pass)
    }
}

#[async_trait]
impl<B> Handler<B> for App
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type RespBody = ResponseBody;
    type Error = Infallible;

    async fn call(&self, req: Request<B>) -> Result<Response<Self::RespBody>, Self::Error> {
        Ok(self.handle_request(req).await)
    }
}

#[derive(Default)]
pub struct AppBuilder {
    layers: Vec<Layer>,
    debug: bool,
    on_error: Option<ErrorCallback>,
}

impl AppBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// In debug mode JSON replies are pretty printed and error bodies carry the error stack.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replaces the default error reporting (logging plus JSON error body).
    #[must_use]
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&HttpError, &mut Event) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    #[must_use]
    pub fn layer<H: EventHandler + 'static>(self, route: &str, handler: H) -> Self {
        self.push(route, None, LayerHandler::Eager(Arc::new(handler)))
    }

    /// Adds a layer that only runs when `matcher` accepts the event.
    #[must_use]
    pub fn layer_with<H, M>(self, route: &str, handler: H, matcher: M) -> Self
    where
        H: EventHandler + 'static,
        M: LayerMatch + 'static,
    {
        self.push(route, Some(Box::new(matcher)), LayerHandler::Eager(Arc::new(handler)))
    }

    /// Adds a layer whose handler is built by `factory` on the first event reaching it.
    #[must_use]
    pub fn lazy<F, Fut, H>(self, route: &str, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<H, HttpError>> + Send + 'static,
        H: EventHandler + 'static,
    {
        let factory: HandlerFactory = Box::new(move || {
            let future = factory();
            async move { future.await.map(|handler| Arc::new(handler) as Arc<dyn EventHandler>) }.boxed()
        });
        self.push(route, None, LayerHandler::Lazy(lazy_handler(factory)))
    }

    /// Nests `app` under `route`.
    #[must_use]
    pub fn mount(self, route: &str, app: App) -> Self {
        self.push(route, None, LayerHandler::App(Arc::new(app)))
    }

    fn push(mut self, route: &str, matcher: Option<Box<dyn LayerMatch>>, handler: LayerHandler) -> Self {
        let route = normalize_route(route);
        trace!(route, "layer registered");
        self.layers.push(Layer { route, matcher, handler });
        self
    }

    pub fn build(self) -> App {
        App { layers: self.layers, debug: self.debug, on_error: self.on_error }
    }
}

impl std::fmt::Debug for AppBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppBuilder").field("layers", &self.layers).field("debug", &self.debug).finish_non_exhaustive()
    }
}

/// Drops one trailing slash, the empty route becoming `/`.
fn normalize_route(route: &str) -> String {
    let route = route.strip_suffix('/').unwrap_or(route);
    if route.is_empty() { "/".to_string() } else { route.to_string() }
}
