//! String-keyed user properties attached to endpoint registrations and
//! sessions.
//!
//! `UserProperties` stores one value per key in `Arc<dyn Any + Send + Sync>`
//! so entries are cheap to clone and safe to share across connection tasks.
//! Typed accessors downcast on read and return `None` on a type mismatch.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

/// Map of application values keyed by name.
///
/// Registrations carry a template map; each accepted session receives a copy
/// which a [`crate::HandshakeModifier`] may extend during the handshake.
///
/// # Examples
///
/// ```rust
/// use wsbridge::UserProperties;
///
/// let mut props = UserProperties::default();
/// props.insert("tenant", String::from("acme"));
/// let tenant = props.get::<String>("tenant").expect("tenant should exist");
/// assert_eq!(tenant.as_str(), "acme");
/// ```
#[derive(Clone, Default)]
pub struct UserProperties {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl UserProperties {
    /// Insert `value` under `key`, replacing any existing entry.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values
            .insert(key.into(), Arc::new(value) as Arc<dyn Any + Send + Sync>);
    }

    /// Retrieve a shared value of type `T` stored under `key`.
    ///
    /// Returns `None` if the key is absent or holds a different type.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.values
            .get(key)
            .and_then(|data| Arc::clone(data).downcast::<T>().ok())
    }

    /// Remove the entry stored under `key`, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> bool { self.values.remove(key).is_some() }

    /// Whether an entry exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool { self.values.contains_key(key) }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize { self.values.len() }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Copy every entry of `other` into `self`, overwriting shared keys.
    pub fn extend_from(&mut self, other: &UserProperties) {
        self.values.extend(
            other
                .values
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v))),
        );
    }

    /// Remove every entry.
    pub fn clear(&mut self) { self.values.clear(); }
}

impl fmt::Debug for UserProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("UserProperties").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::UserProperties;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn insert_and_get_typed_values() {
        let mut props = UserProperties::default();
        props.insert("count", 12u32);
        props.insert("label", "hello".to_string());

        assert_eq!(*props.get::<u32>("count").expect("count present"), 12);
        assert_eq!(
            props.get::<String>("label").expect("label present").as_str(),
            "hello"
        );
    }

    #[test]
    fn type_mismatch_returns_none() {
        let mut props = UserProperties::default();
        props.insert("count", 12u32);
        assert!(props.get::<String>("count").is_none());
        assert!(props.get::<u32>("missing").is_none());
    }

    #[test]
    fn extend_overwrites_shared_keys() {
        let mut base = UserProperties::default();
        base.insert("a", 1u8);
        base.insert("b", 2u8);
        let mut overlay = UserProperties::default();
        overlay.insert("b", 20u8);

        base.extend_from(&overlay);
        assert_eq!(base.len(), 2);
        assert_eq!(*base.get::<u8>("b").expect("b present"), 20);
    }

    #[test]
    fn properties_are_send_and_sync() { assert_send_sync::<UserProperties>(); }
}
