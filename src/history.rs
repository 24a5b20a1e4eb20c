//! Durable, searchable log of finished transcriptions.
use crate::db::{self, history as sql, Database};
use crate::error::Result;
use crate::model::{HistoryStats, ListQuery, TranscriptionRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Debug)]
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    /// A store backed by the SQLite file at `path`. Nothing is opened until
    /// [`HistoryStore::initialize`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db: Database::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    pub async fn initialize(&self) -> Result<()> {
        self.db.initialize().await
    }

    pub async fn close(&self) {
        self.db.close().await
    }

    #[instrument(skip_all, fields(duration_ms = duration_ms))]
    pub async fn add(
        &self,
        text: &str,
        duration_ms: u64,
        model_used: Option<&str>,
        language: Option<&str>,
    ) -> Result<TranscriptionRecord> {
        let pool = self.db.pool().await?;
        let record = TranscriptionRecord {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            duration_ms,
            model_used: model_used.map(str::to_string),
            language: language.map(str::to_string),
            created_at: db::now(),
        };
        let mut tx = pool.begin().await?;
        sql::insert_record(&mut tx, &record).await?;
        tx.commit().await?;
        info!(id = %record.id, "history record added");
        Ok(record)
    }

    #[instrument(skip_all)]
    pub async fn get(&self, id: &str) -> Result<Option<TranscriptionRecord>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let record = sql::fetch_record(&mut tx, id).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Newest-first page plus the size of the whole matching set.
    ///
    /// `search` is split into words and every word must match the start of
    /// a word in the text, ignoring case: "fox" finds "Foxes", "ox" does
    /// not find "fox". A blank search lists everything; a search with no
    /// letters or digits matches nothing.
    #[instrument(skip_all, fields(limit = ?query.limit, offset = ?query.offset))]
    pub async fn list(&self, query: &ListQuery) -> Result<(Vec<TranscriptionRecord>, u64)> {
        let pool = self.db.pool().await?;
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let fts = match search {
            Some(text) => match sql::fts_query(text) {
                Some(q) => Some(q),
                // nothing searchable in the query, so nothing can match
                None => return Ok((Vec::new(), 0)),
            },
            None => None,
        };

        let mut tx = pool.begin().await?;
        let total = sql::count_records(&mut tx, fts.as_deref()).await?;
        let records = sql::page_records(&mut tx, fts.as_deref(), query.limit, query.offset).await?;
        tx.commit().await?;
        debug!(returned = records.len(), total, "history listed");
        Ok((records, total))
    }

    #[instrument(skip_all)]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let removed = sql::delete_record(&mut tx, id).await?;
        tx.commit().await?;
        if removed {
            info!(id, "history record deleted");
        }
        Ok(removed)
    }

    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<u64> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let removed = sql::delete_all_records(&mut tx).await?;
        tx.commit().await?;
        info!(removed, "history cleared");
        Ok(removed)
    }

    #[instrument(skip_all)]
    pub async fn stats(&self) -> Result<HistoryStats> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let stats = sql::record_stats(&mut tx).await?;
        tx.commit().await?;
        Ok(stats)
    }
}
