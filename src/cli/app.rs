use anyhow::{Context, Result};
use clap::Parser;
use personkv::config::LockScope;
use personkv::{EngineConfig, InMemoryLockService, InMemoryRecordStore, PersonEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Level, event};

/// 366 days, the longest marker TTL the engine accepts.
const MAX_EXPIRY_MINUTES: u64 = 366 * 24 * 60;

/// Person record service with optimistic and pessimistic updates
#[derive(Debug, Parser)]
#[command(name = "personkv", version, about)]
pub struct Args {
    /// Address the HTTP API listens on
    #[arg(long, env = "PERSONKV_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// TTL of the `{id}_expire` marker, in minutes
    #[arg(
        long,
        env = "KEY_IDLE_TIME_MINUTES",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..=MAX_EXPIRY_MINUTES)
    )]
    pub key_idle_time_minutes: u64,

    /// Lease of the pessimistic update lock, in milliseconds
    #[arg(long, env = "PERSONKV_LOCK_LEASE_MS", default_value_t = 8_000)]
    pub lock_lease_ms: u64,

    /// Maximum wait for the pessimistic update lock, in milliseconds
    #[arg(long, env = "PERSONKV_LOCK_TIMEOUT_MS", default_value_t = 5_000)]
    pub lock_timeout_ms: u64,

    /// Deadline of a single store round-trip, in milliseconds
    #[arg(long, env = "PERSONKV_STORE_TIMEOUT_MS", default_value_t = 2_000)]
    pub store_timeout_ms: u64,

    /// Lock per record id instead of one lock for every update
    #[arg(long, env = "PERSONKV_PER_RECORD_LOCK")]
    pub per_record_lock: bool,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        let scope = if self.per_record_lock {
            LockScope::PerRecord
        } else {
            LockScope::Shared
        };

        EngineConfig::with_expiry_minutes(self.key_idle_time_minutes)
            .lock_lease(Duration::from_millis(self.lock_lease_ms))
            .lock_acquire_timeout(Duration::from_millis(self.lock_timeout_ms))
            .store_op_timeout(Duration::from_millis(self.store_timeout_ms))
            .lock_scope(scope)
    }
}

pub struct App {
    args: Args,
}

impl App {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.args.engine_config();
        let engine = PersonEngine::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryLockService::new()),
            config,
        )
        .context("invalid engine configuration")?;

        engine.ping().await.context("store is not reachable")?;

        let listener = TcpListener::bind(self.args.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.args.listen))?;
        event!(Level::INFO, addr = %self.args.listen, "application started");

        axum::serve(listener, personkv::web::router(engine))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("http server failed")?;

        event!(Level::INFO, "application stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        event!(Level::ERROR, error = %err, "failed to listen for shutdown signal");
    }
}
