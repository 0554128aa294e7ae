use std::time::Duration;

/// Default lock name shared by every pessimistic update.
pub const SHARED_LOCK_NAME: &str = "person-update";

/// Longest accepted marker TTL.
pub const MAX_RECORD_EXPIRY_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Longest accepted lease or timeout.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// How the pessimistic path names its mutex.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LockScope {
    /// One lock for all records: every pessimistic update is serialized,
    /// including updates of unrelated records.
    #[default]
    Shared,
    /// One lock per record id.
    PerRecord,
}

impl LockScope {
    pub fn lock_name(&self, id: &str) -> String {
        match self {
            LockScope::Shared => SHARED_LOCK_NAME.to_string(),
            LockScope::PerRecord => format!("{SHARED_LOCK_NAME}:{id}"),
        }
    }
}

/// Engine configuration
///
/// All durations are wall-clock. The store and lock handles themselves are
/// passed to [`crate::PersonEngine::new`], not configured here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL of the `{id}_expire` marker
    pub record_expiry_ttl: Duration,

    /// Lease granted to the pessimistic update lock
    pub lock_lease: Duration,

    /// Maximum wait for the pessimistic update lock
    pub lock_acquire_timeout: Duration,

    /// Deadline for every single store round-trip
    pub store_op_timeout: Duration,

    pub lock_scope: LockScope,
}

impl EngineConfig {
    pub fn new(record_expiry_ttl: Duration) -> Self {
        Self {
            record_expiry_ttl,
            lock_lease: Duration::from_secs(8),
            lock_acquire_timeout: Duration::from_secs(5),
            store_op_timeout: Duration::from_secs(2),
            lock_scope: LockScope::Shared,
        }
    }

    /// TTL given in whole minutes, the unit the deployment environment uses.
    /// Out-of-range values saturate and are rejected by [`validate`](Self::validate).
    pub fn with_expiry_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn lock_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.lock_acquire_timeout = timeout;
        self
    }

    pub fn store_op_timeout(mut self, timeout: Duration) -> Self {
        self.store_op_timeout = timeout;
        self
    }

    pub fn lock_scope(mut self, scope: LockScope) -> Self {
        self.lock_scope = scope;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.record_expiry_ttl.is_zero() {
            return Err("record_expiry_ttl must be > 0".to_string());
        }

        if self.record_expiry_ttl > MAX_RECORD_EXPIRY_TTL {
            return Err(format!(
                "record_expiry_ttl must be at most {:?}",
                MAX_RECORD_EXPIRY_TTL
            ));
        }

        for (name, value) in [
            ("lock_lease", self.lock_lease),
            ("lock_acquire_timeout", self.lock_acquire_timeout),
            ("store_op_timeout", self.store_op_timeout),
        ] {
            if value > MAX_WAIT {
                return Err(format!("{name} must be at most {MAX_WAIT:?}"));
            }
        }

        if self.lock_lease.is_zero() {
            return Err("lock_lease must be > 0".to_string());
        }

        if self.store_op_timeout.is_zero() {
            return Err("store_op_timeout must be > 0".to_string());
        }

        if self.lock_lease <= self.store_op_timeout * 3 {
            // watch, read and commit must all fit inside one lease
            return Err("lock_lease must exceed three times store_op_timeout".to_string());
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_expiry_minutes(60)
    }
}

/// Caller-side retry of whole optimistic updates on conflict.
#[derive(Debug, Clone)]
pub struct ConflictRetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl ConflictRetryPolicy {
    /// Backoff before attempt `attempt + 1` (`attempt` starts at 1).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(100),
        }
    }
}
