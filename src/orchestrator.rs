//! Batch job lifecycle: creation, cancellation, retry and the status hooks
//! a processing loop reports through.
//!
//! Job states move `Pending → Processing → {Completed | Cancelled}` (or
//! straight from Pending to Cancelled). Terminal jobs only reopen through
//! [`BatchOrchestrator::retry_failed`]. Every method runs inside a single
//! transaction, so readers never see a job half cancelled or half retried.

use crate::db::{self, batch as sql, Database};
use crate::error::{Result, StoreError};
use crate::model::{
    file_name_of, BatchFile, BatchJob, FileStatus, FileStatusUpdate, JobStatus, JobStatusUpdate,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct BatchOrchestrator {
    db: Database,
}

impl BatchOrchestrator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db: Database::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    /// Open the store. Jobs persisted by earlier runs are read back as-is.
    pub async fn initialize(&self) -> Result<()> {
        self.db.initialize().await
    }

    pub async fn close(&self) {
        self.db.close().await
    }

    #[instrument(skip_all, fields(files = file_paths.len()))]
    pub async fn create_job<S: AsRef<str>>(&self, file_paths: &[S]) -> Result<BatchJob> {
        let pool = self.db.pool().await?;
        if file_paths.is_empty() {
            return Err(StoreError::InvalidArgument(
                "a batch job needs at least one file".into(),
            ));
        }

        let job_id = Uuid::new_v4().to_string();
        let files = file_paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                BatchFile {
                    id: Uuid::new_v4().to_string(),
                    job_id: job_id.clone(),
                    filename: file_name_of(path),
                    file_path: path.to_string(),
                    status: FileStatus::Pending,
                    error: None,
                    transcription_id: None,
                }
            })
            .collect();
        let job = BatchJob {
            id: job_id,
            status: JobStatus::Pending,
            files,
            current_file_index: 0,
            created_at: db::now(),
            completed_at: None,
        };

        let mut tx = pool.begin().await?;
        sql::insert_job(&mut tx, &job).await?;
        tx.commit().await?;
        info!(job_id = %job.id, files = job.files.len(), "batch job created");
        Ok(job)
    }

    #[instrument(skip_all)]
    pub async fn get_job(&self, id: &str) -> Result<Option<BatchJob>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let job = sql::fetch_job(&mut tx, id).await?;
        tx.commit().await?;
        Ok(job)
    }

    #[instrument(skip_all, fields(limit = ?limit))]
    pub async fn list_jobs(&self, limit: Option<u32>) -> Result<Vec<BatchJob>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let jobs = sql::list_jobs(&mut tx, limit).await?;
        tx.commit().await?;
        Ok(jobs)
    }

    /// Cancel an open job and skip its Pending files. Files already picked
    /// up keep their status. Returns false for unknown or finished jobs.
    #[instrument(skip_all, fields(job_id = id))]
    pub async fn cancel_job(&self, id: &str) -> Result<bool> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        if !sql::cancel_job(&mut tx, id, &db::now()).await? {
            tx.rollback().await?;
            debug!("job missing or already finished; nothing to cancel");
            return Ok(false);
        }
        let skipped = sql::skip_pending_files(&mut tx, id).await?;
        tx.commit().await?;
        info!(skipped, "batch job cancelled");
        Ok(true)
    }

    #[instrument(skip_all, fields(job_id = id))]
    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let removed = sql::delete_job(&mut tx, id).await?;
        tx.commit().await?;
        if removed {
            info!("batch job deleted");
        }
        Ok(removed)
    }

    /// Reset Failed files to Pending (all of them, or only those listed in
    /// `file_ids`) and reopen the job. Listed ids that are not Failed, or
    /// that belong to another job, are ignored.
    #[instrument(skip_all, fields(job_id = id))]
    pub async fn retry_failed(
        &self,
        id: &str,
        file_ids: Option<&[String]>,
    ) -> Result<Option<BatchJob>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        if !sql::reopen_job(&mut tx, id).await? {
            tx.rollback().await?;
            return Ok(None);
        }
        let reset = sql::reset_failed_files(&mut tx, id, file_ids).await?;
        let job = sql::fetch_job(&mut tx, id).await?;
        tx.commit().await?;
        info!(reset, "batch job reopened for retry");
        Ok(job)
    }

    /// Persist a file status reported by the processing loop. Reports for
    /// files of a cancelled job are still recorded.
    #[instrument(skip_all, fields(file_id = file_id, status = update.status.as_str()))]
    pub async fn update_file_status(
        &self,
        file_id: &str,
        update: FileStatusUpdate,
    ) -> Result<Option<BatchFile>> {
        let pool = self.db.pool().await?;
        let update = update.normalized();
        let mut tx = pool.begin().await?;
        if !sql::update_file(&mut tx, file_id, &update).await? {
            tx.rollback().await?;
            debug!("file not found");
            return Ok(None);
        }
        let file = sql::fetch_file(&mut tx, file_id).await?;
        tx.commit().await?;
        Ok(file)
    }

    /// Persist a job status reported by the processing loop. A job that is
    /// already Completed or Cancelled is returned unchanged. Moving a job
    /// into a terminal state skips its remaining Pending files, as
    /// [`cancel_job`](Self::cancel_job) does.
    #[instrument(skip_all, fields(job_id = job_id, status = update.status.as_str()))]
    pub async fn update_job_status(
        &self,
        job_id: &str,
        update: JobStatusUpdate,
    ) -> Result<Option<BatchJob>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let applied = sql::update_open_job(&mut tx, job_id, &update, &db::now()).await?;
        if applied && update.status.is_terminal() {
            let skipped = sql::skip_pending_files(&mut tx, job_id).await?;
            if skipped > 0 {
                debug!(skipped, "pending files skipped on job end");
            }
        }
        let job = sql::fetch_job(&mut tx, job_id).await?;
        tx.commit().await?;
        if !applied {
            if let Some(job) = &job {
                warn!(current = job.status.as_str(), "ignoring status report for finished job");
            }
        }
        Ok(job)
    }

    /// First Pending file of the job in input order, with its position.
    #[instrument(skip_all, fields(job_id = job_id))]
    pub async fn next_pending_file(&self, job_id: &str) -> Result<Option<(usize, BatchFile)>> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let next = sql::next_pending_file(&mut tx, job_id).await?;
        tx.commit().await?;
        Ok(next)
    }

    /// Put files stuck in Processing back to Pending. Only a run that was
    /// interrupted between picking a file up and reporting its outcome
    /// leaves them behind. Finished jobs are left alone.
    #[instrument(skip_all, fields(job_id = job_id))]
    pub async fn requeue_interrupted_files(&self, job_id: &str) -> Result<u64> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;
        let requeued = sql::requeue_processing_files(&mut tx, job_id).await?;
        tx.commit().await?;
        if requeued > 0 {
            warn!(requeued, "interrupted files returned to pending");
        }
        Ok(requeued)
    }
}
