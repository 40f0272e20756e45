//! Path and method routing.
//!
//! A [`Router`] maps path patterns to [`Route`]s, each holding one handler per HTTP method and
//! an optional handler for any method. Patterns are made of `/` separated segments:
//!
//! | segment | matches | bound as |
//! |---------|---------|----------|
//! | `users` | exactly `users` | |
//! | `:id` | any single segment | `id` |
//! | `*` | any single segment | `_0`, `_1`, ... |
//! | `**` | the rest of the path | `_` |
//! | `**:rest` | the rest of the path | `rest` |
//!
//! At every level literals win over parameters, which win over catch-alls.
//!
//! # Example
//!
//! ```no_run
//! use micro_event::router::{get, post, Router};
//! use micro_event::{handler_fn, Event};
//!
//! async fn show(event: &mut Event) -> String {
//!     format!("user {}", event.param("id").unwrap_or_default())
//! }
//!
//! async fn create(_event: &mut Event) -> &'static str {
//!     "created"
//! }
//!
//! let router = Router::builder()
//!     .route("/users/:id", get(handler_fn(show)))
//!     .route("/users", post(handler_fn(create)))
//!     .build()
//!     .expect("valid routes");
//! ```

mod tree;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use thiserror::Error;
use tracing::trace;

use crate::error::HttpError;
use crate::event::{Event, PathParams};
use crate::handler::EventHandler;
use crate::responder::Reply;
use tree::Tree;

#[derive(Error, Debug)]
pub enum RouterBuildError {
    #[error("invalid route pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route pattern {pattern} conflicts with a registered route")]
    Conflict { pattern: String },
}

impl RouterBuildError {
    pub fn invalid_pattern<S: ToString>(pattern: &str, reason: S) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }

    pub fn conflict(pattern: &str) -> Self {
        Self::Conflict { pattern: pattern.to_string() }
    }
}

/// Main router structure that handles event routing
pub struct Router {
    tree: Tree<Route>,
    strict: bool,
}

/// The handlers registered for one path pattern.
pub struct Route {
    path: String,
    handlers: HashMap<Method, Arc<dyn EventHandler>>,
    all: Option<Arc<dyn EventHandler>>,
}

/// Result of matching a path, the route and the parameters it bound
pub struct RouteMatch<'router> {
    route: &'router Route,
    params: PathParams,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Matches a path (the query string, if any, is ignored) against the router's routes.
    pub fn at(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        self.tree.at(path).map(|(route, params)| RouteMatch { route, params: PathParams::new(params) })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("strict", &self.strict).finish_non_exhaustive()
    }
}

impl Route {
    fn new(path: String) -> Self {
        Self { path, handlers: HashMap::new(), all: None }
    }

    /// The pattern this route was registered with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Methods with a dedicated handler.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.handlers.keys()
    }

    pub fn has_all(&self) -> bool {
        self.all.is_some()
    }

    /// The handler registered for `method`, falling back to the any-method handler.
    pub fn handler_for(&self, method: &Method) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(method).or(self.all.as_ref())
    }

    fn insert(&mut self, selector: MethodSelector, handler: Arc<dyn EventHandler>) {
        match selector {
            MethodSelector::All => self.all = Some(handler),
            MethodSelector::Method(method) => {
                self.handlers.insert(method, handler);
            }
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .field("all", &self.all.is_some())
            .finish()
    }
}

impl<'router> RouteMatch<'router> {
    pub fn route(&self) -> &'router Route {
        self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }
}

/// Selects the requests a handler is registered for: one method, or all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSelector {
    All,
    Method(Method),
}

impl From<Method> for MethodSelector {
    fn from(method: Method) -> Self {
        MethodSelector::Method(method)
    }
}

/// Parses a method name case-insensitively, `all` selecting every method.
impl FromStr for MethodSelector {
    type Err = http::method::InvalidMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(MethodSelector::All);
        }
        Method::from_bytes(s.to_ascii_uppercase().as_bytes()).map(MethodSelector::Method)
    }
}

/// Handlers for one path, keyed by method.
#[derive(Default)]
pub struct MethodRoute {
    handlers: Vec<(MethodSelector, Arc<dyn EventHandler>)>,
}

impl MethodRoute {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on<H: EventHandler + 'static>(mut self, selector: impl Into<MethodSelector>, handler: H) -> Self {
        self.handlers.push((selector.into(), Arc::new(handler)));
        self
    }

    #[must_use]
    pub fn all<H: EventHandler + 'static>(self, handler: H) -> Self {
        self.on(MethodSelector::All, handler)
    }
}

impl std::fmt::Debug for MethodRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.iter().map(|(selector, _)| selector)).finish()
    }
}

macro_rules! method_route {
    ($method:ident, $method_const:ident) => {
        pub fn $method<H: EventHandler + 'static>(handler: H) -> MethodRoute {
            MethodRoute::new().on(Method::$method_const, handler)
        }

        impl MethodRoute {
            #[must_use]
            pub fn $method<H: EventHandler + 'static>(self, handler: H) -> Self {
                self.on(Method::$method_const, handler)
            }
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);
method_route!(connect, CONNECT);
method_route!(patch, PATCH);
method_route!(trace, TRACE);

/// Registers `handler` for every method.
pub fn all<H: EventHandler + 'static>(handler: H) -> MethodRoute {
    MethodRoute::new().all(handler)
}

pub fn on<H: EventHandler + 'static>(selector: impl Into<MethodSelector>, handler: H) -> MethodRoute {
    MethodRoute::new().on(selector, handler)
}

#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<String, Route>,
    strict: bool,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// In strict mode a miss is answered: `404` when no route matches, `405` when the route
    /// has no handler for the method, and a matched handler that passes gets `204`.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Adds the handlers of `method_route` to the route of `path`, creating it if needed.
    #[must_use]
    pub fn route(mut self, path: impl Into<String>, method_route: MethodRoute) -> Self {
        let route = self.route_mut(path.into());
        for (selector, handler) in method_route.handlers {
            route.insert(selector, handler);
        }
        self
    }

    /// Adds one handler to the route of `path` for each of `methods`.
    #[must_use]
    pub fn add<H, I>(mut self, path: impl Into<String>, handler: H, methods: I) -> Self
    where
        H: EventHandler + 'static,
        I: IntoIterator,
        I::Item: Into<MethodSelector>,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let route = self.route_mut(path.into());
        for selector in methods {
            route.insert(selector.into(), Arc::clone(&handler));
        }
        self
    }

    fn route_mut(&mut self, path: String) -> &mut Route {
        self.routes.entry(path.clone()).or_insert_with(|| Route::new(path))
    }

    pub fn build(self) -> Result<Router, RouterBuildError> {
        let mut tree = Tree::new();
        for (path, route) in self.routes {
            tree.insert(&path, route)?;
        }
        Ok(Router { tree, strict: self.strict })
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.routes.values().collect::<Vec<_>>()).field("strict", &self.strict).finish()
    }
}

#[async_trait]
impl EventHandler for Router {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        let Some(RouteMatch { route, params }) = self.at(event.url()) else {
            if self.strict {
                return Err(HttpError::not_found(format!("Cannot find any route matching {}.", event.url())));
            }
            trace!(url = event.url(), "no route matched");
            return Ok(Reply::Pass);
        };

        let Some(handler) = route.handler_for(event.method()).map(Arc::clone) else {
            if self.strict {
                let method = event.method().as_str().to_ascii_lowercase();
                return Err(HttpError::method_not_allowed(format!("Method {method} is not allowed on this route.")));
            }
            trace!(url = event.url(), method = %event.method(), "route has no handler for method");
            return Ok(Reply::Pass);
        };

        trace!(route = route.path(), "route matched");
        event.set_params(params);

        let reply = handler.handle(event).await?;
        if self.strict && matches!(reply, Reply::Pass) && !event.handled() {
            return Ok(Reply::NoContent);
        }
        Ok(reply)
    }
}
