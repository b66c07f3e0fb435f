//! Typed per-request storage for application data.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// One value per type; cleared when the request is finalized. Hooks and
/// handlers use it to pass data to later stages without global state.
#[derive(Default)]
pub struct Notes {
    map: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Notes {
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>()).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>()).and_then(|v| v.downcast_mut())
    }

    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.map.remove(&TypeId::of::<T>()).and_then(|v| v.downcast::<T>().ok()).map(|boxed| *boxed)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Notes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notes").field("len", &self.map.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TraceId(u64);

    #[test]
    fn stores_one_value_per_type() {
        let mut notes = Notes::default();
        assert!(notes.insert(TraceId(1)).is_none());
        assert_eq!(notes.insert(TraceId(2)), Some(TraceId(1)));
        assert_eq!(notes.get::<TraceId>(), Some(&TraceId(2)));

        notes.clear();
        assert!(notes.get::<TraceId>().is_none());
    }
}
