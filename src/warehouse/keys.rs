//! Surrogate key mapping
//!
//! Every natural id gets a dense integer key, unique within its namespace.
//! A record's own key lives in the namespace of its table; keys for
//! references to other records live in [`GLOBAL_NAMESPACE`], so the same
//! UUID maps to the same key wherever it is referenced.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Error, Result};

/// Namespace shared by all identifier-reference columns
pub const GLOBAL_NAMESPACE: &str = "";

/// Maps (namespace, natural id) pairs to integer keys.
///
/// Implementations must never hand out two keys for one pair nor one key
/// for two pairs of the same namespace, even when called from several
/// threads at once.
pub trait KeyStore: Send + Sync {
    fn resolve(&self, namespace: &str, id: &str) -> Result<i64>;
}

/// Key store that lives for the duration of the process
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    namespaces: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys assigned in `namespace`
    pub fn key_count(&self, namespace: &str) -> Result<usize> {
        let namespaces = self.namespaces.lock().map_err(|_| poisoned())?;
        Ok(namespaces.get(namespace).map_or(0, HashMap::len))
    }
}

impl KeyStore for MemoryKeyStore {
    fn resolve(&self, namespace: &str, id: &str) -> Result<i64> {
        let mut namespaces = self
            .namespaces
            .lock()
            .map_err(|_| poisoned())?;

        let keys = namespaces.entry(namespace.to_string()).or_default();
        if let Some(&key) = keys.get(id) {
            return Ok(key);
        }

        // Keys are never removed, so the map size is the last key handed out
        let key = keys.len() as i64 + 1;
        keys.insert(id.to_string(), key);
        Ok(key)
    }
}

fn poisoned() -> Error {
    Error::KeyStore("key store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_resolve_is_stable() {
        let store = MemoryKeyStore::new();
        let a = store.resolve("items", "a").unwrap();
        let b = store.resolve("items", "b").unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(store.resolve("items", "a").unwrap(), a);
        assert_eq!(store.key_count("items").unwrap(), 2);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.resolve("items", "a").unwrap(), 1);
        assert_eq!(store.resolve("users", "a").unwrap(), 1);
        assert_eq!(store.resolve(GLOBAL_NAMESPACE, "a").unwrap(), 1);
        assert_eq!(store.resolve("users", "b").unwrap(), 2);
        assert_eq!(store.key_count("other").unwrap(), 0);
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let store = Arc::new(MemoryKeyStore::new());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.namespaces.lock().unwrap();
            panic!("poison the key store");
        })
        .join();

        assert!(matches!(store.key_count("items"), Err(Error::KeyStore(_))));
        assert!(matches!(store.resolve("items", "a"), Err(Error::KeyStore(_))));
    }

    #[test]
    fn test_concurrent_resolution_is_a_bijection() {
        let store = Arc::new(MemoryKeyStore::new());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..200)
                        .map(|i| {
                            // Every worker asks for the same ids, in a different order
                            let id = format!("id-{}", (i + worker * 50) % 200);
                            (id.clone(), store.resolve("shared", &id).unwrap())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen: HashMap<String, i64> = HashMap::new();
        for handle in handles {
            for (id, key) in handle.join().unwrap() {
                let previous = seen.insert(id, key);
                if let Some(previous) = previous {
                    assert_eq!(previous, key);
                }
            }
        }

        let keys: HashSet<i64> = seen.values().copied().collect();
        assert_eq!(seen.len(), 200);
        assert_eq!(keys.len(), 200);
        assert_eq!(keys.iter().max(), Some(&200));
    }
}
