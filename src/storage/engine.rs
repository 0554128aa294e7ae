use crate::core::EngineError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A watched key changed before the conditional commit landed.
    #[error("watched key '{0}' changed before commit")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => {
                EngineError::Conflict(format!("'{key}' was modified concurrently, retry the update"))
            }
            StoreError::Unavailable(message) => EngineError::Storage(message),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Observation point returned by [`RecordStore::watch`].
///
/// `token` is backend specific (a version stamp, a revision, a CAS value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHandle {
    key: String,
    token: u64,
}

impl WatchHandle {
    pub fn new(key: impl Into<String>, token: u64) -> Self {
        Self {
            key: key.into(),
            token,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// One write inside a conditional batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub key: String,
    pub value: Vec<u8>,
    /// `None` keeps the key until the store evicts it.
    pub ttl: Option<Duration>,
}

impl WriteOp {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Key-value backend consumed by the engine.
///
/// Any backend with compare-and-swap or version-stamped writes can implement
/// `watch`/`commit_if_unchanged`. Implementations must be safe to share
/// between tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a key. Absent and expired keys yield `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Unconditional write.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Start observing `key`. Works for keys that do not exist yet.
    async fn watch(&self, key: &str) -> StoreResult<WatchHandle>;

    /// Apply every op atomically, or none of them with
    /// [`StoreError::Conflict`] if the watched key changed since `watch`.
    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()>;

    /// Whether `commit_if_unchanged` applies a batch of several keys
    /// atomically. Backends that can only guard a single key return `false`,
    /// and the engine then writes the expiration marker separately.
    fn supports_atomic_batch(&self) -> bool {
        true
    }

    /// Liveness probe used by readiness checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
