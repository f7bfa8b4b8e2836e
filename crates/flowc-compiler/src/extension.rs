//! Typed extension registry shared by participants and processors.

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Default)]
pub struct Extensions {
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value`, replacing any previous value of the same type.
    pub fn register<T: Any>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn test_register_and_replace() {
        let mut ext = Extensions::new();
        assert!(ext.get::<Marker>().is_none());
        assert_eq!(ext.register(Marker(1)), None);
        assert_eq!(ext.register(Marker(2)), Some(Marker(1)));
        assert_eq!(ext.get::<Marker>(), Some(&Marker(2)));
        ext.register(String::from("other"));
        assert_eq!(ext.get::<Marker>(), Some(&Marker(2)));
        assert_eq!(ext.get::<String>().map(String::as_str), Some("other"));
    }
}
