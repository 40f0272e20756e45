use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Request scoped values shared between the layers handling one event.
///
/// Values are stored under a string key and retrieved by type: a lookup with the wrong
/// type behaves like a missing key.
#[derive(Default)]
pub struct Context {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning true if a previous value was replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> bool {
        self.values.insert(key.into(), Box::new(value)).is_some()
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|value| value.downcast_mut::<T>())
    }

    /// Removes the value under `key`, returning it if it has type `T`.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.values.remove(key).and_then(|value| value.downcast::<T>().ok()).map(|value| *value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
