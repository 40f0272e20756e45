//! An event driven micro web core.
//!
//! Every request becomes an [`Event`] that is lent to the layers of an [`App`] in turn. A layer
//! is a route prefix plus an [`EventHandler`]; handlers are usually plain async functions
//! adapted with [`handler_fn`], returning anything that implements [`IntoReply`].
//!
//! # Architecture
//!
//! - [`event`]: the request/response exchange, request accessors, body reading, response writers
//! - [`app`]: the layered dispatcher and result coercion
//! - [`router`]: path trie with per-method handlers
//! - [`session`]: sealed, self-expiring cookie sessions
//!
//! Protocol level pieces (multipart and cookie codecs, sealing) live in `micro-event-http`.
//!
//! # Example
//!
//! ```no_run
//! use micro_event::router::{get, Router};
//! use micro_event::{handler_fn, App, Event, HttpError};
//! use serde_json::{json, Value};
//!
//! async fn user(event: &mut Event) -> Result<Value, HttpError> {
//!     let id = event.param("id").ok_or_else(|| HttpError::new(400))?;
//!     Ok(json!({ "id": id }))
//! }
//!
//! # fn build() -> Result<App, micro_event::router::RouterBuildError> {
//! let router = Router::builder().route("/users/:id", get(handler_fn(user))).build()?;
//! let app = App::builder().layer("/api", router).build();
//! # Ok(app)
//! # }
//! ```

mod body;
mod fn_trait;
mod handler;
mod responder;

pub mod app;
pub mod error;
pub mod event;
pub mod router;
pub mod session;

pub use app::App;
pub use body::ResponseBody;
pub use error::HttpError;
pub use event::Event;
pub use fn_trait::EventFn;
pub use handler::{
    dynamic_handler, handler_fn, lazy_handler, use_base, BaseHandler, DynamicHandler, EventHandler, FnHandler, LazyHandler,
};
pub use responder::{Blob, IntoReply, Json, Reply};
pub use router::Router;
