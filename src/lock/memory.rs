use super::{LockError, LockHandle, LockService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, sleep_until};
use tracing::{Level, event};

struct Lease {
    token: u64,
    expires_at: Instant,
}

/// Lease-based named mutex living in the current process.
///
/// A lease that is not released in time expires and the next waiter takes
/// the lock over; its fencing token is always larger than the previous one.
pub struct InMemoryLockService {
    leases: Mutex<HashMap<String, Lease>>,
    released: Notify,
    next_token: AtomicU64,
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            released: Notify::new(),
            next_token: AtomicU64::new(1),
        }
    }

    /// Whether `name` is currently held by an unexpired lease.
    pub async fn is_held(&self, name: &str) -> bool {
        let now = Instant::now();
        let leases = self.leases.lock().await;
        leases.get(name).is_some_and(|lease| lease.expires_at > now)
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockHandle, LockError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register before checking so a release in between is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let now = Instant::now();
                let mut leases = self.leases.lock().await;
                let current = leases.get(name).map(|lease| (lease.token, lease.expires_at));
                match current {
                    Some((_, expires_at)) if expires_at > now => expires_at.min(deadline),
                    stale => {
                        if let Some((stale_token, _)) = stale {
                            event!(Level::WARN, lock = %name, token = stale_token, "taking over expired lease");
                        }
                        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                        leases.insert(
                            name.to_string(),
                            Lease {
                                token,
                                expires_at: now + lease,
                            },
                        );
                        return Ok(LockHandle::new(name, token, lease, now));
                    }
                }
            };

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    timeout,
                });
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        let mut leases = self.leases.lock().await;
        let held = leases
            .get(handle.name())
            .is_some_and(|current| current.token == handle.token());
        if held {
            leases.remove(handle.name());
            drop(leases);
            self.released.notify_waiters();
        } else {
            event!(Level::DEBUG, lock = %handle.name(), token = handle.token(), "release of lease no longer held");
        }
        Ok(())
    }
}
