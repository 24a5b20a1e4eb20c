use crate::history::HistoryStore;
use crate::model::{BatchJob, FileStatusUpdate, JobStatus, JobStatusUpdate};
use crate::orchestrator::BatchOrchestrator;
use crate::transcriber::Transcriber;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Transcribe the next Pending file of `job_id`.
///
/// Returns false when there is nothing left to do: the job is unknown,
/// finished, or out of Pending files (an open job is then marked
/// Completed). Files an interrupted run left in Processing are requeued
/// before the job is completed. Job status is re-read on every call, so a
/// cancel issued between files stops the loop.
///
/// If the transcript cannot be stored, the file is marked Failed with the
/// error before the error is returned.
#[instrument(skip_all, fields(job_id = job_id))]
pub async fn process_next_file(
    orchestrator: &BatchOrchestrator,
    history: &HistoryStore,
    transcriber: &dyn Transcriber,
    job_id: &str,
    language: Option<&str>,
) -> Result<bool> {
    let Some(job) = orchestrator.get_job(job_id).await? else {
        return Ok(false);
    };
    if job.status.is_terminal() {
        return Ok(false);
    }

    let Some((index, file)) = orchestrator.next_pending_file(job_id).await? else {
        // files a previous run left in Processing get another pass
        if orchestrator.requeue_interrupted_files(job_id).await? > 0 {
            return Ok(true);
        }
        orchestrator
            .update_job_status(job_id, JobStatusUpdate::status(JobStatus::Completed))
            .await?;
        info!("batch job completed");
        return Ok(false);
    };

    orchestrator
        .update_job_status(job_id, JobStatusUpdate::processing_at(index))
        .await?;
    orchestrator
        .update_file_status(&file.id, FileStatusUpdate::processing())
        .await?;

    let update = match transcriber
        .transcribe(Path::new(&file.file_path), language)
        .await
    {
        Ok(t) => {
            let stored = history
                .add(
                    &t.text,
                    t.duration_ms,
                    t.model_used.as_deref(),
                    t.language.as_deref(),
                )
                .await
                .context("failed to store transcription");
            match stored {
                Ok(record) => {
                    info!(file_id = %file.id, record_id = %record.id, "file transcribed");
                    FileStatusUpdate::completed(record.id)
                }
                Err(err) => {
                    // the file must not stay Processing when the store is failing
                    orchestrator
                        .update_file_status(&file.id, FileStatusUpdate::failed(format!("{err:#}")))
                        .await?;
                    return Err(err);
                }
            }
        }
        Err(err) => {
            warn!(?err, file_id = %file.id, path = %file.file_path, "transcription failed");
            FileStatusUpdate::failed(format!("{err:#}"))
        }
    };
    orchestrator.update_file_status(&file.id, update).await?;
    Ok(true)
}

/// Drive a job until it has no Pending file left or gets cancelled, and
/// return its final state.
pub async fn run_job(
    orchestrator: &BatchOrchestrator,
    history: &HistoryStore,
    transcriber: &dyn Transcriber,
    job_id: &str,
    language: Option<&str>,
) -> Result<Option<BatchJob>> {
    while process_next_file(orchestrator, history, transcriber, job_id, language).await? {}
    Ok(orchestrator.get_job(job_id).await?)
}
