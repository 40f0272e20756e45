//! Event handlers and the combinators built on them.
//!
//! Everything the [`App`](crate::App) and the [`Router`](crate::Router) dispatch to is an
//! [`EventHandler`]: it gets the event mutably and returns a [`Reply`] telling the dispatcher
//! what to write, or that it declined the request.
//!
//! - [`handler_fn`]: adapts an `async fn(&mut Event) -> impl IntoReply`
//! - [`lazy_handler`]: resolves the real handler with an async factory on first use
//! - [`dynamic_handler`]: a handler whose target can be swapped at runtime
//! - [`use_base`]: strips a base prefix from the working url before delegating

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::HttpError;
use crate::event::Event;
use crate::fn_trait::EventFn;
use crate::responder::{IntoReply, Reply};

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        (**self).handle(event).await
    }
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Box<H> {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        (**self).handle(event).await
    }
}

/// an [`EventFn`] holder which represents any async fn taking the event
#[derive(Debug, Clone)]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'e> EventFn<'e>,
{
    FnHandler { f }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: for<'e> EventFn<'e>,
{
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        self.f.call(event).await.into_reply()
    }
}

/// A handler built by an async factory the first time it is needed.
///
/// The factory runs at most once successfully; concurrent first requests wait for the same
/// initialization. A failed initialization is reported to the request that triggered it and
/// retried by the next one.
pub struct LazyHandler<F, H> {
    factory: F,
    handler: OnceCell<H>,
}

pub fn lazy_handler<F, Fut, H>(factory: F) -> LazyHandler<F, H>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<H, HttpError>> + Send,
    H: EventHandler,
{
    LazyHandler { factory, handler: OnceCell::new() }
}

impl<F, H> LazyHandler<F, H> {
    /// Returns true once the factory produced the handler.
    pub fn is_resolved(&self) -> bool {
        self.handler.initialized()
    }
}

impl<F, H> std::fmt::Debug for LazyHandler<F, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyHandler").field("resolved", &self.is_resolved()).finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, H> EventHandler for LazyHandler<F, H>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<H, HttpError>> + Send,
    H: EventHandler,
{
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        let handler = self
            .handler
            .get_or_try_init(|| {
                debug!("resolving lazy handler");
                (self.factory)()
            })
            .await?;
        handler.handle(event).await
    }
}

/// A handler whose target can be replaced while the app is serving.
///
/// Without a target it declines every request.
#[derive(Default)]
pub struct DynamicHandler {
    current: ArcSwapOption<Box<dyn EventHandler>>,
}

impl DynamicHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<H: EventHandler + 'static>(&self, handler: H) {
        let handler: Box<dyn EventHandler> = Box::new(handler);
        self.current.store(Some(Arc::new(handler)));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.current.load().is_some()
    }
}

pub fn dynamic_handler<H: EventHandler + 'static>(initial: H) -> DynamicHandler {
    let handler = DynamicHandler::new();
    handler.set(initial);
    handler
}

impl std::fmt::Debug for DynamicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicHandler").field("set", &self.is_set()).finish()
    }
}

#[async_trait]
impl EventHandler for DynamicHandler {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        match self.current.load_full() {
            Some(handler) => handler.handle(event).await,
            None => Ok(Reply::Pass),
        }
    }
}

/// Delegates to `handler` with `base` stripped from the front of the working url.
#[derive(Debug, Clone)]
pub struct BaseHandler<H> {
    base: String,
    handler: H,
}

/// Wraps `handler` so it sees urls relative to `base`.
///
/// A trailing slash of `base` is ignored; an empty base (or `/`) leaves the url untouched.
/// The working url is restored once the handler returns.
pub fn use_base<H: EventHandler>(base: &str, handler: H) -> BaseHandler<H> {
    let base = base.strip_suffix('/').unwrap_or(base);
    BaseHandler { base: base.to_string(), handler }
}

impl<H> BaseHandler<H> {
    pub fn base(&self) -> &str {
        &self.base
    }
}

#[async_trait]
impl<H: EventHandler> EventHandler for BaseHandler<H> {
    async fn handle(&self, event: &mut Event) -> Result<Reply, HttpError> {
        if self.base.is_empty() {
            return self.handler.handle(event).await;
        }

        let url = event.url().to_string();
        if let Some(stripped) = without_base(&url, &self.base) {
            event.set_url(stripped);
        }
        let result = self.handler.handle(event).await;
        event.set_url(url);
        result
    }
}

/// `url` without `base` in front, `None` when it does not start with `base`.
fn without_base(url: &str, base: &str) -> Option<String> {
    let rest = url.strip_prefix(base)?;
    Some(if rest.starts_with('/') { rest.to_string() } else { format!("/{rest}") })
}
