//! Persistence substrate: SQLite pool lifecycle, migrations and SQL.
//!
//! - `history`: SQL for transcription records and their FTS index.
//! - `batch`: SQL for batch jobs and batch files.
//!
//! Services (`HistoryStore`, `BatchOrchestrator`) own a [`Database`] and wrap
//! every logical operation in one transaction; the functions here only map
//! rows to entities.

pub mod batch;
pub mod history;

use crate::error::{Result, StoreError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

pub type Pool = SqlitePool;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MIGRATION_ATTEMPTS: u32 = 3;

/// Open (creating if needed) the SQLite file at `path`. Parent directories
/// are created first.
pub async fn init_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // WAL for concurrent readers, FULL sync for durability across crashes.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Apply pending migrations. Two handles opening a fresh file at once can
/// both try to record the same version; the loser retries and then finds
/// it applied.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    let mut attempt = 1;
    loop {
        match sqlx::migrate!("./migrations").run(pool).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < MIGRATION_ATTEMPTS => {
                warn!(attempt, error = %err, "migration collided with another opener; retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// A lazily opened handle to one on-disk store file.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    pool: RwLock<Option<Pool>>,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn initialize(&self) -> Result<()> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            debug!("database already initialized");
            return Ok(());
        }
        let pool = init_pool(&self.path).await?;
        run_migrations(&pool).await?;
        *guard = Some(pool);
        info!("database ready");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Clone of the live pool, or `NotInitialized`.
    pub async fn pool(&self) -> Result<Pool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn close(&self) {
        let pool = self.pool.write().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("database closed");
        }
    }
}

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 text, so lexical order in SQL equals time order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StoreError::Database(sqlx::Error::Decode(Box::new(err))))
}

pub(crate) fn decode_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_ts).transpose()
}
