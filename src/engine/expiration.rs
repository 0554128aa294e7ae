use crate::core::{EngineError, Result};
use crate::storage::WriteOp;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

pub const EXPIRE_KEY_SUFFIX: &str = "_expire";

/// Companion key holding the last-modified marker of a record.
pub fn expire_key(id: &str) -> String {
    format!("{id}{EXPIRE_KEY_SUFFIX}")
}

/// Produces the `{id}_expire` freshness write that accompanies every
/// create/update of a record.
#[derive(Debug, Clone)]
pub struct ExpirationTracker {
    ttl: Duration,
}

impl ExpirationTracker {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn touch(&self, id: &str) -> WriteOp {
        self.touch_at(id, Utc::now())
    }

    pub fn touch_at(&self, id: &str, now: DateTime<Utc>) -> WriteOp {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Nanos, true);
        WriteOp::new(expire_key(id), stamp.into_bytes()).with_ttl(self.ttl)
    }

    /// Decode a marker written by [`touch`](Self::touch).
    pub fn parse_marker(bytes: &[u8]) -> Result<DateTime<Utc>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| EngineError::Internal(format!("expiration marker is not UTF-8: {err}")))?;
        DateTime::parse_from_rfc3339(text)
            .map(|stamp| stamp.with_timezone(&Utc))
            .map_err(|err| EngineError::Internal(format!("malformed expiration marker '{text}': {err}")))
    }
}
