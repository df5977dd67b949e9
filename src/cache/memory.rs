//! Process-local cache backend.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Record {
    Text(String),
    Hash(HashMap<String, String>),
}

/// In-memory [`CacheStore`] with the same record semantics as Redis.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Value of a string key.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.records.get(key)?.value() {
            Record::Text(v) => Some(v.clone()),
            Record::Hash(_) => None,
        }
    }

    /// Contents of a hash key.
    pub fn hash(&self, key: &str) -> Option<HashMap<String, String>> {
        match self.records.get(key)?.value() {
            Record::Hash(h) => Some(h.clone()),
            Record::Text(_) => None,
        }
    }

    /// One field of a hash key.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.hash(key)?.get(field).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.records
            .insert(key.to_string(), Record::Text(value.to_string()));
        Ok(())
    }

    async fn replace_hash(
        &self,
        key: &str,
        fields: &[(&'static str, String)],
    ) -> Result<(), CacheError> {
        let hash = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.clone()))
            .collect();
        self.records.insert(key.to_string(), Record::Hash(hash));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.records.remove(key);
        }
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let pattern = glob::Pattern::new(pattern)?;
        let before = self.records.len();
        self.records.retain(|key, _| !pattern.matches(key));
        Ok(before.saturating_sub(self.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_hash_drops_stale_fields() {
        let store = MemoryStore::new();
        store
            .replace_hash("h", &[("a", "1".into()), ("b", "2".into())])
            .await
            .unwrap();
        store.replace_hash("h", &[("a", "3".into())]).await.unwrap();

        let hash = store.hash("h").unwrap();
        assert_eq!(hash.len(), 1);
        assert_eq!(hash["a"], "3");
    }

    #[tokio::test]
    async fn delete_matching_only_removes_matches() {
        let store = MemoryStore::new();
        store.set("server:session:a", "1").await.unwrap();
        store.set("server:session:b", "2").await.unwrap();
        store.set("server:online_users", "2").await.unwrap();

        let removed = store.delete_matching("server:session:*").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("server:online_users").as_deref(), Some("2"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_ignores_missing_keys() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store
            .delete(&["k".to_string(), "absent".to_string()])
            .await
            .unwrap();
        assert!(!store.contains("k"));
    }
}
