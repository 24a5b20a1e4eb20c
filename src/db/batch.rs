use super::{decode_opt_ts, decode_ts, encode_ts};
use crate::error::{Result, StoreError};
use crate::model::{BatchFile, BatchJob, FileStatus, FileStatusUpdate, JobStatus, JobStatusUpdate};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

const FILE_COLUMNS: &str = "id, job_id, filename, file_path, status, error, transcription_id";

fn job_status_of(raw: &str) -> Result<JobStatus> {
    JobStatus::parse_status(raw).ok_or_else(|| StoreError::UnknownStatus {
        entity: "batch job",
        value: raw.to_string(),
    })
}

fn file_status_of(raw: &str) -> Result<FileStatus> {
    FileStatus::parse_status(raw).ok_or_else(|| StoreError::UnknownStatus {
        entity: "batch file",
        value: raw.to_string(),
    })
}

fn file_from_row(row: &SqliteRow) -> Result<BatchFile> {
    let status: String = row.try_get("status")?;
    Ok(BatchFile {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        filename: row.try_get("filename")?,
        file_path: row.try_get("file_path")?,
        status: file_status_of(&status)?,
        error: row.try_get("error")?,
        transcription_id: row.try_get("transcription_id")?,
    })
}

fn job_from_row(row: &SqliteRow, files: Vec<BatchFile>) -> Result<BatchJob> {
    let status: String = row.try_get("status")?;
    let index: i64 = row.try_get("current_file_index")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(BatchJob {
        id: row.try_get("id")?,
        status: job_status_of(&status)?,
        files,
        current_file_index: index.max(0) as usize,
        created_at: decode_ts(&created_at)?,
        completed_at: decode_opt_ts(row.try_get("completed_at")?)?,
    })
}

/// Insert a job row and all of its files. Caller owns the transaction.
pub async fn insert_job(tx: &mut Transaction<'_, Sqlite>, job: &BatchJob) -> Result<()> {
    sqlx::query(
        "INSERT INTO batch_jobs (id, status, current_file_index, created_at, completed_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(job.status.as_str())
    .bind(job.current_file_index as i64)
    .bind(encode_ts(&job.created_at))
    .bind(job.completed_at.as_ref().map(encode_ts))
    .execute(&mut **tx)
    .await?;

    for (position, file) in job.files.iter().enumerate() {
        sqlx::query(
            "INSERT INTO batch_files (id, job_id, position, filename, file_path, status, error, transcription_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&job.id)
        .bind(position as i64)
        .bind(&file.filename)
        .bind(&file.file_path)
        .bind(file.status.as_str())
        .bind(&file.error)
        .bind(&file.transcription_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn fetch_files(tx: &mut Transaction<'_, Sqlite>, job_id: &str) -> Result<Vec<BatchFile>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM batch_files WHERE job_id = ? ORDER BY position ASC");
    let rows = sqlx::query(&sql).bind(job_id).fetch_all(&mut **tx).await?;
    rows.iter().map(file_from_row).collect()
}

pub async fn fetch_job(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<Option<BatchJob>> {
    let row = sqlx::query(
        "SELECT id, status, current_file_index, created_at, completed_at FROM batch_jobs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let files = fetch_files(tx, id).await?;
    job_from_row(&row, files).map(Some)
}

/// Jobs newest first, optionally capped at `limit`.
pub async fn list_jobs(tx: &mut Transaction<'_, Sqlite>, limit: Option<u32>) -> Result<Vec<BatchJob>> {
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = sqlx::query(
        "SELECT id, status, current_file_index, created_at, completed_at FROM batch_jobs \
         ORDER BY created_at DESC, seq DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id")?;
        let files = fetch_files(tx, &id).await?;
        jobs.push(job_from_row(row, files)?);
    }
    Ok(jobs)
}

pub async fn fetch_file(tx: &mut Transaction<'_, Sqlite>, file_id: &str) -> Result<Option<BatchFile>> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM batch_files WHERE id = ?");
    let row = sqlx::query(&sql).bind(file_id).fetch_optional(&mut **tx).await?;
    row.as_ref().map(file_from_row).transpose()
}

pub async fn next_pending_file(
    tx: &mut Transaction<'_, Sqlite>,
    job_id: &str,
) -> Result<Option<(usize, BatchFile)>> {
    let sql = format!(
        "SELECT position, {FILE_COLUMNS} FROM batch_files \
         WHERE job_id = ? AND status = 'pending' ORDER BY position ASC LIMIT 1"
    );
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(&mut **tx).await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let position: i64 = row.try_get("position")?;
    Ok(Some((position.max(0) as usize, file_from_row(&row)?)))
}

/// Mark a job Cancelled unless it already reached a terminal state.
/// Returns false when no row qualified.
pub async fn cancel_job(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    at: &DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE batch_jobs SET status = 'cancelled', completed_at = ? \
         WHERE id = ? AND status IN ('pending', 'processing')",
    )
    .bind(encode_ts(at))
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn skip_pending_files(tx: &mut Transaction<'_, Sqlite>, job_id: &str) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE batch_files SET status = 'skipped' WHERE job_id = ? AND status = 'pending'",
    )
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected())
}

/// Processing → Pending for a job that is still open.
pub async fn requeue_processing_files(tx: &mut Transaction<'_, Sqlite>, job_id: &str) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE batch_files SET status = 'pending', error = NULL, transcription_id = NULL \
         WHERE job_id = ? AND status = 'processing' \
         AND EXISTS (SELECT 1 FROM batch_jobs WHERE id = ? AND status IN ('pending', 'processing'))",
    )
    .bind(job_id)
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected())
}

/// Deletes the job; files go with it through the foreign key cascade.
pub async fn delete_job(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM batch_jobs WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Failed → Pending with the error cleared. With `file_ids`, only those ids
/// that belong to `job_id` are considered.
pub async fn reset_failed_files(
    tx: &mut Transaction<'_, Sqlite>,
    job_id: &str,
    file_ids: Option<&[String]>,
) -> Result<u64> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "UPDATE batch_files SET status = 'pending', error = NULL WHERE status = 'failed' AND job_id = ",
    );
    qb.push_bind(job_id);
    if let Some(ids) = file_ids {
        if ids.is_empty() {
            return Ok(0);
        }
        qb.push(" AND id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.as_str());
        }
        sep.push_unseparated(")");
    }
    let res = qb.build().execute(&mut **tx).await?;
    Ok(res.rows_affected())
}

/// Force a job back to Pending so it can be processed again.
pub async fn reopen_job(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE batch_jobs SET status = 'pending', completed_at = NULL WHERE id = ?",
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn update_file(
    tx: &mut Transaction<'_, Sqlite>,
    file_id: &str,
    update: &FileStatusUpdate,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE batch_files SET status = ?, error = ?, transcription_id = ? WHERE id = ?",
    )
    .bind(update.status.as_str())
    .bind(&update.error)
    .bind(&update.transcription_id)
    .bind(file_id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Apply a status report to a job that is still open. Terminal jobs are
/// left untouched and the call returns false.
pub async fn update_open_job(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    update: &JobStatusUpdate,
    at: &DateTime<Utc>,
) -> Result<bool> {
    let completed_at = update.status.is_terminal().then(|| encode_ts(at));
    let res = sqlx::query(
        "UPDATE batch_jobs SET status = ?, current_file_index = COALESCE(?, current_file_index), completed_at = ? \
         WHERE id = ? AND status IN ('pending', 'processing')",
    )
    .bind(update.status.as_str())
    .bind(update.current_file_index.map(|i| i as i64))
    .bind(completed_at)
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() > 0)
}
