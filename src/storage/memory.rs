use super::engine::{RecordStore, StoreError, StoreResult, WatchHandle, WriteOp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    /// Bumped on every write to a key; never removed so a watch on an
    /// absent key still detects a later create.
    versions: HashMap<String, u64>,
}

impl Keyspace {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn write(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>, now: Instant) {
        // a TTL past the clock's range never expires
        let expires_at = ttl.and_then(|ttl| now.checked_add(ttl));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Process-local [`RecordStore`] with per-key versions and lazy TTL expiry.
pub struct InMemoryRecordStore {
    keyspace: RwLock<Keyspace>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
        }
    }

    /// Remaining time to live for a key, `None` if absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let keyspace = self.keyspace.read().await;
        keyspace
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let keyspace = self.keyspace.read().await;
        keyspace
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries. Reads already hide them; this only frees memory.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut keyspace = self.keyspace.write().await;
        let before = keyspace.entries.len();
        keyspace.entries.retain(|_, entry| entry.is_live(now));
        before - keyspace.entries.len()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let keyspace = self.keyspace.read().await;
        Ok(keyspace
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        let mut keyspace = self.keyspace.write().await;
        keyspace.write(key, value, ttl, Instant::now());
        Ok(())
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        let keyspace = self.keyspace.read().await;
        Ok(WatchHandle::new(key, keyspace.version(key)))
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut keyspace = self.keyspace.write().await;
        if keyspace.version(watch.key()) != watch.token() {
            return Err(StoreError::Conflict(watch.key().to_string()));
        }

        let now = Instant::now();
        for op in ops {
            keyspace.write(&op.key, op.value, op.ttl, now);
        }
        Ok(())
    }
}
