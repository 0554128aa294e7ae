//! Distributed mutex capability consumed by the pessimistic update path.
//!
//! [`LockService`] is the adapter seam; [`InMemoryLockService`] is the
//! process-local implementation. [`LockGuard`] scopes a held lease so it is
//! released on every exit path, including when the owning future is dropped.

pub mod memory;

pub use memory::InMemoryLockService;

use crate::core::EngineError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Level, event};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock '{name}'")]
    Timeout { name: String, timeout: Duration },

    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        EngineError::Lock(err.to_string())
    }
}

/// Proof of a granted lease.
///
/// `granted_at` must not be later than the moment the lease started counting
/// on the lock service. Remote adapters stamp it before sending the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    name: String,
    /// Fencing token, strictly increasing per service.
    token: u64,
    lease: Duration,
    granted_at: Instant,
}

impl LockHandle {
    pub fn new(name: impl Into<String>, token: u64, lease: Duration, granted_at: Instant) -> Self {
        Self {
            name: name.into(),
            token,
            lease,
            granted_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn granted_at(&self) -> Instant {
        self.granted_at
    }

    /// Instant after which another owner may hold the lock.
    pub fn deadline(&self) -> Instant {
        self.granted_at + self.lease
    }
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Wait up to `timeout` for `name`, then hold it for at most `lease`.
    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockHandle, LockError>;

    /// Idempotent: releasing twice, or after the lease expired, is not an error.
    async fn release(&self, handle: &LockHandle) -> Result<(), LockError>;
}

/// RAII guard for a held lease
///
/// Prefer [`LockGuard::release`]; dropping the guard schedules the release on
/// the current runtime instead.
pub struct LockGuard {
    service: Arc<dyn LockService>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    pub async fn acquire(
        service: Arc<dyn LockService>,
        name: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let handle = service.acquire(name, lease, timeout).await?;
        Ok(Self {
            service,
            handle: Some(handle),
        })
    }

    pub fn handle(&self) -> Option<&LockHandle> {
        self.handle.as_ref()
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        match self.handle.take() {
            Some(handle) => self.service.release(&handle).await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let service = Arc::clone(&self.service);
                runtime.spawn(async move {
                    if let Err(err) = service.release(&handle).await {
                        event!(Level::WARN, lock = %handle.name(), error = %err, "deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                event!(
                    Level::WARN,
                    lock = %handle.name(),
                    lease = ?handle.lease(),
                    "lock guard dropped outside a runtime, lease will expire on its own"
                );
            }
        }
    }
}
