//! In-process [`KeyStore`] for tests and zero-dependency local development.
//! Implements the same optimistic-transaction contract as
//! [`crate::RedisKeyStore`] using a per-key version counter instead of a
//! real `WATCH`.

use crate::{KeyStore, KeyStoreError, KeyStoreTransaction, TxnOutcome, WriteOp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Store {
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    strings: HashMap<String, Vec<u8>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    versions: HashMap<String, u64>,
}

impl Store {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version_of(&self, key: &str) -> u64 {
        *self.versions.get(key).unwrap_or(&0)
    }

    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::HSet { key, fields } => {
                let entry = self.hashes.entry(key.clone()).or_default();
                for (field, value) in fields {
                    entry.insert(field, value);
                }
                self.bump(&key);
            }
            WriteOp::Set { key, value } => {
                self.strings.insert(key.clone(), value);
                self.bump(&key);
            }
            WriteOp::Del { keys } => {
                for key in keys {
                    self.hashes.remove(&key);
                    self.strings.remove(&key);
                    self.zsets.remove(&key);
                    self.bump(&key);
                }
            }
            WriteOp::ZAdd { key, member, score } => {
                let set = self.zsets.entry(key.clone()).or_default();
                if let Some(existing) = set.iter_mut().find(|(m, _)| *m == member) {
                    existing.1 = score;
                } else {
                    set.push((member, score));
                }
                set.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
                self.bump(&key);
            }
            WriteOp::ZRem { key, member } => {
                if let Some(set) = self.zsets.get_mut(&key) {
                    set.retain(|(m, _)| *m != member);
                }
                self.bump(&key);
            }
        }
    }
}

/// In-memory [`KeyStore`]; one instance models one Redis database.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    store: Arc<Mutex<Store>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hmget(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<Vec<u8>>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        let hash = store.hashes.get(key);
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(f)).cloned())
            .collect())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, KeyStoreError> {
        let mut store = self.store.lock().unwrap();
        let entry = store.hashes.entry(key.to_string()).or_default();
        let current = entry
            .get(field)
            .map(|v| String::from_utf8_lossy(v).parse::<i64>().unwrap_or(0))
            .unwrap_or(0);
        let next = current + delta;
        entry.insert(field.to_string(), next.to_string().into_bytes());
        store.bump(key);
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.strings.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.strings.contains_key(key)
            || store.hashes.contains_key(key)
            || store.zsets.contains_key(key))
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        let set = match store.zsets.get(key) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let len = set.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len)
            }
        };
        let start = norm(start).min(len);
        let stop = if stop < 0 {
            (len + stop + 1).clamp(0, len)
        } else {
            (stop + 1).min(len)
        };
        if start >= stop {
            return Ok(Vec::new());
        }
        Ok(set[start as usize..stop as usize].to_vec())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .zsets
            .get(key)
            .and_then(|s| s.iter().find(|(m, _)| m == member))
            .map(|(_, score)| *score))
    }

    async fn zcard(&self, key: &str) -> Result<i64, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.zsets.get(key).map(|s| s.len()).unwrap_or(0) as i64)
    }

    async fn hgetall_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<Vec<(String, Vec<u8>)>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(keys
            .iter()
            .map(|key| {
                store
                    .hashes
                    .get(key)
                    .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn pipeline_apply(&self, ops: Vec<WriteOp>) -> Result<(), KeyStoreError> {
        let mut store = self.store.lock().unwrap();
        for op in ops {
            store.apply(op);
        }
        Ok(())
    }

    async fn begin_transaction(
        &self,
        watch_keys: &[String],
    ) -> Result<Box<dyn KeyStoreTransaction>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        let snapshot = watch_keys
            .iter()
            .map(|k| (k.clone(), store.version_of(k)))
            .collect();
        Ok(Box::new(InMemoryTransaction {
            store: self.store.clone(),
            watched_versions: snapshot,
        }))
    }
}

struct InMemoryTransaction {
    store: Arc<Mutex<Store>>,
    watched_versions: Vec<(String, u64)>,
}

#[async_trait]
impl KeyStoreTransaction for InMemoryTransaction {
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hgetall(&mut self, key: &str) -> Result<Vec<(String, Vec<u8>)>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.strings.get(key).cloned())
    }

    async fn exists(&mut self, key: &str) -> Result<bool, KeyStoreError> {
        let store = self.store.lock().unwrap();
        Ok(store.strings.contains_key(key) || store.hashes.contains_key(key))
    }

    async fn exec(self: Box<Self>, ops: Vec<WriteOp>) -> Result<bool, KeyStoreError> {
        let mut store = self.store.lock().unwrap();
        let conflict = self
            .watched_versions
            .iter()
            .any(|(k, v)| store.version_of(k) != *v);
        if conflict {
            return Ok(false);
        }
        for op in ops {
            store.apply(op);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hincrby_is_monotonic() {
        let store = InMemoryKeyStore::new();
        assert_eq!(store.hincrby("c", "a:q", 1).await.unwrap(), 1);
        assert_eq!(store.hincrby("c", "a:q", 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn transaction_detects_conflicting_write() {
        let store = InMemoryKeyStore::new();
        let mut txn = store.begin_transaction(&["k".to_string()]).await.unwrap();
        let _ = txn.get("k").await.unwrap();

        // Concurrent writer touches the watched key before exec.
        store
            .pipeline_apply(vec![WriteOp::Set {
                key: "k".to_string(),
                value: b"x".to_vec(),
            }])
            .await
            .unwrap();

        let committed = txn
            .exec(vec![WriteOp::Set {
                key: "other".to_string(),
                value: b"y".to_vec(),
            }])
            .await
            .unwrap();
        assert!(!committed);
        assert_eq!(store.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn transaction_commits_without_conflict() {
        let store = InMemoryKeyStore::new();
        let txn = store.begin_transaction(&["k".to_string()]).await.unwrap();
        let committed = txn
            .exec(vec![WriteOp::Set {
                key: "k".to_string(),
                value: b"v".to_vec(),
            }])
            .await
            .unwrap();
        assert!(committed);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn zrange_withscores_orders_by_score() {
        let store = InMemoryKeyStore::new();
        store
            .pipeline_apply(vec![
                WriteOp::ZAdd {
                    key: "z".to_string(),
                    member: "b".to_string(),
                    score: 2.0,
                },
                WriteOp::ZAdd {
                    key: "z".to_string(),
                    member: "a".to_string(),
                    score: 1.0,
                },
            ])
            .await
            .unwrap();
        let range = store.zrange_withscores("z", 0, -1).await.unwrap();
        assert_eq!(
            range,
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)]
        );
    }
}
