//! The dispatch units of an [`App`].
//!
//! A layer is a route prefix, an optional [`LayerMatch`] predicate and a handler, the handler
//! being one of a closed set of variants: an eager handler, a handler resolved lazily on first
//! use, or a nested application.

use std::sync::Arc;

use futures::future::BoxFuture;

use super::App;
use crate::error::HttpError;
use crate::event::Event;
use crate::handler::{EventHandler, LazyHandler};
use crate::responder::Reply;

/// Decides whether a layer runs for an event.
///
/// `path` is the working url as the layer's handler would see it, its route prefix stripped.
pub trait LayerMatch: Send + Sync {
    fn matches(&self, path: &str, event: &Event) -> bool;
}

/// A matcher that wraps a closure.
struct FnMatch<F>(F);

impl<F> LayerMatch for FnMatch<F>
where
    F: Fn(&str, &Event) -> bool + Send + Sync,
{
    fn matches(&self, path: &str, event: &Event) -> bool {
        (self.0)(path, event)
    }
}

/// Creates a matcher from a closure.
///
/// ```
/// use micro_event::app::fn_match;
///
/// let only_json = fn_match(|_path, event| {
///     event.header("accept").is_some_and(|accept| accept.contains("application/json"))
/// });
/// ```
pub fn fn_match<F>(f: F) -> impl LayerMatch
where
    F: Fn(&str, &Event) -> bool + Send + Sync,
{
    FnMatch(f)
}

pub(crate) type HandlerFactory = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn EventHandler>, HttpError>> + Send + Sync>;

pub(crate) enum LayerHandler {
    Eager(Arc<dyn EventHandler>),
    Lazy(LazyHandler<HandlerFactory, Arc<dyn EventHandler>>),
    App(Arc<App>),
}

impl LayerHandler {
    pub(crate) async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        match self {
            LayerHandler::Eager(handler) => handler.handle(event).await,
            LayerHandler::Lazy(handler) => handler.handle(event).await,
            LayerHandler::App(app) => EventHandler::handle(app.as_ref(), event).await,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LayerHandler::Eager(_) => "eager",
            LayerHandler::Lazy(_) => "lazy",
            LayerHandler::App(_) => "app",
        }
    }
}

pub(crate) struct Layer {
    pub(crate) route: String,
    pub(crate) matcher: Option<Box<dyn LayerMatch>>,
    pub(crate) handler: LayerHandler,
}

impl Layer {
    /// The working url for this layer, `None` when the url lies outside the route prefix.
    pub(crate) fn strip_route<'u>(&self, url: &'u str) -> Option<&'u str> {
        if self.route.len() <= 1 {
            return Some(url);
        }
        let rest = url.strip_prefix(self.route.as_str())?;
        Some(if rest.is_empty() { "/" } else { rest })
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("route", &self.route)
            .field("matcher", &self.matcher.is_some())
            .field("handler", &self.handler.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{fn_match, Layer, LayerHandler, LayerMatch};
    use crate::event::Event;
    use crate::handler::{handler_fn, EventHandler};
    use bytes::Bytes;
    use http::Request;
    use http_body_util::Empty;
    use std::sync::Arc;

    async fn noop(_event: &mut Event) {}

    fn layer(route: &str) -> Layer {
        let handler: Arc<dyn EventHandler> = Arc::new(handler_fn(noop));
        Layer { route: route.to_string(), matcher: None, handler: LayerHandler::Eager(handler) }
    }

    #[test]
    fn test_strip_route() {
        assert_eq!(layer("/").strip_route("/a/b"), Some("/a/b"));
        assert_eq!(layer("/api").strip_route("/api/users?x=1"), Some("/users?x=1"));
        assert_eq!(layer("/api").strip_route("/api"), Some("/"));
        assert_eq!(layer("/api").strip_route("/other"), None);
    }

    #[test]
    fn test_fn_match() {
        let event = Event::new(Request::get("/").header("x-beta", "1").body(Empty::<Bytes>::new()).unwrap());
        let beta = fn_match(|path, event| path.starts_with("/v2") && event.header("x-beta").is_some());

        assert!(beta.matches("/v2/items", &event));
        assert!(!beta.matches("/v1/items", &event));
    }
}
