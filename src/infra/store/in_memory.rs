// In-memory implementation of StateStore.
//
// Backs the engine tests. `set_read_only` simulates an unwritable medium and
// `fail_domain_after` a partial outage, so the all-or-nothing behaviour of
// the engines can be checked.
#![cfg_attr(not(test), allow(dead_code))]

use crate::core::store::{validate_key, Domain, StateStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct InMemoryStateStore {
    documents: DashMap<(Domain, String), Value>,
    read_only: AtomicBool,
    /// Domain -> writes still allowed before every `put` fails.
    failing: DashMap<Domain, usize>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with an IO error.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Let `allowed` more writes into `domain` succeed, then fail the rest.
    pub fn fail_domain_after(&self, domain: Domain, allowed: usize) {
        self.failing.insert(domain, allowed);
    }

    pub fn heal_domain(&self, domain: Domain) {
        self.failing.remove(&domain);
    }

    fn unwritable() -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "store is read-only",
        ))
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, domain: Domain, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        Ok(self
            .documents
            .get(&(domain, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, domain: Domain, key: &str, document: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(Self::unwritable());
        }
        if let Some(mut remaining) = self.failing.get_mut(&domain) {
            if *remaining == 0 {
                return Err(Self::unwritable());
            }
            *remaining -= 1;
        }
        self.documents.insert((domain, key.to_string()), document);
        Ok(())
    }

    async fn keys(&self, domain: Domain) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == domain)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStateStore::new();

        assert!(store.get(Domain::Xp, "1-2").await.unwrap().is_none());

        store.put(Domain::Xp, "1-2", json!({"xp": 10})).await.unwrap();
        store.put(Domain::Xp, "1-3", json!({"xp": 20})).await.unwrap();
        store.put(Domain::Warnings, "1-2", json!([])).await.unwrap();

        assert_eq!(store.get(Domain::Xp, "1-2").await.unwrap(), Some(json!({"xp": 10})));
        assert_eq!(store.keys(Domain::Xp).await.unwrap(), vec!["1-2", "1-3"]);
    }

    #[tokio::test]
    async fn read_only_store_rejects_writes_and_keeps_data() {
        let store = InMemoryStateStore::new();
        store.put(Domain::Config, "1", json!({"premium": true})).await.unwrap();

        store.set_read_only(true);
        assert!(store.put(Domain::Config, "1", json!({})).await.is_err());
        assert_eq!(
            store.get(Domain::Config, "1").await.unwrap(),
            Some(json!({"premium": true}))
        );
    }

    #[tokio::test]
    async fn failing_domain_only_affects_its_own_writes() {
        let store = InMemoryStateStore::new();
        store.fail_domain_after(Domain::Warnings, 1);

        store.put(Domain::Warnings, "1-2", json!([1])).await.unwrap();
        assert!(store.put(Domain::Warnings, "1-2", json!([])).await.is_err());
        store.put(Domain::Timeouts, "1-2", json!([])).await.unwrap();
        assert_eq!(store.get(Domain::Warnings, "1-2").await.unwrap(), Some(json!([1])));

        store.heal_domain(Domain::Warnings);
        store.put(Domain::Warnings, "1-2", json!([])).await.unwrap();
    }
}
