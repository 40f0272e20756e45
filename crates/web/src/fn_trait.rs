use std::future::Future;

use crate::event::Event;
use crate::responder::IntoReply;

/// Represents an async function taking the event being processed.
///
/// It is implemented for every `async fn(&mut Event) -> R` where `R: IntoReply`, so plain
/// async functions can be registered as handlers through [`handler_fn`](crate::handler_fn).
///
/// ```no_run
/// use micro_event::{handler_fn, Event};
///
/// async fn hello(event: &mut Event) -> String {
///     format!("hello {}", event.path())
/// }
///
/// let handler = handler_fn(hello);
/// ```
pub trait EventFn<'e>: Send + Sync {
    type Output: IntoReply;
    type Future: Future<Output = Self::Output> + Send + 'e;

    fn call(&self, event: &'e mut Event) -> Self::Future;
}

impl<'e, F, Fut> EventFn<'e> for F
where
    F: Fn(&'e mut Event) -> Fut + Send + Sync,
    Fut: Future + Send + 'e,
    Fut::Output: IntoReply,
{
    type Output = Fut::Output;
    type Future = Fut;

    #[inline]
    fn call(&self, event: &'e mut Event) -> Self::Future {
        (self)(event)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::HttpError;
    use crate::event::Event;
    use crate::fn_trait::EventFn;
    use crate::responder::Reply;
    use serde_json::Value;

    fn assert_is_event_fn<F: for<'e> EventFn<'e>>(_f: F) {
        //noop
    }

    async fn text(_event: &mut Event) -> String {
        String::new()
    }
    async fn nothing(_event: &mut Event) {}
    async fn json(_event: &mut Event) -> Value {
        Value::Null
    }
    async fn fallible(_event: &mut Event) -> Result<&'static str, HttpError> {
        Ok("ok")
    }
    async fn reply(_event: &mut Event) -> Reply {
        Reply::Pass
    }
    async fn optional(event: &mut Event) -> Option<String> {
        event.param("id").map(ToString::to_string)
    }

    #[test]
    fn test_async_fn_is_event_fn() {
        assert_is_event_fn(text);
        assert_is_event_fn(nothing);
        assert_is_event_fn(json);
        assert_is_event_fn(fallible);
        assert_is_event_fn(reply);
        assert_is_event_fn(optional);
    }
}
