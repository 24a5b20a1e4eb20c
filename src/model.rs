use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and Cancelled jobs only reopen through an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        }
    }

    pub fn parse_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(FileStatus::Pending),
            "processing" => Some(FileStatus::Processing),
            "completed" => Some(FileStatus::Completed),
            "failed" => Some(FileStatus::Failed),
            "skipped" => Some(FileStatus::Skipped),
            _ => None,
        }
    }
}

/// A finished transcription kept in the history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRecord {
    pub id: String,
    pub text: String,
    pub duration_ms: u64,
    pub model_used: Option<String>,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_count: u64,
    pub total_duration_ms: u64,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Paging and search options for history listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn page(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            search: None,
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        Self {
            search: Some(query.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile {
    pub id: String,
    pub job_id: String,
    pub filename: String,
    pub file_path: String,
    pub status: FileStatus,
    pub error: Option<String>,
    pub transcription_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: String,
    pub status: JobStatus,
    pub files: Vec<BatchFile>,
    pub current_file_index: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn count_with(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn report(&self) -> JobReport<'_> {
        JobReport {
            job: self,
            total_files: self.total_files(),
            completed_files: self.count_with(FileStatus::Completed),
            failed_files: self.count_with(FileStatus::Failed),
            skipped_files: self.count_with(FileStatus::Skipped),
        }
    }
}

/// Outbound view of a job with per-status file counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport<'a> {
    #[serde(flatten)]
    pub job: &'a BatchJob,
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
}

/// Snapshot a processing loop reports for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatusUpdate {
    pub status: FileStatus,
    pub error: Option<String>,
    pub transcription_id: Option<String>,
}

impl FileStatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: FileStatus::Processing,
            error: None,
            transcription_id: None,
        }
    }

    pub fn completed(transcription_id: impl Into<String>) -> Self {
        Self {
            status: FileStatus::Completed,
            error: None,
            transcription_id: Some(transcription_id.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: FileStatus::Failed,
            error: Some(error.into()),
            transcription_id: None,
        }
    }

    /// Drop fields that do not belong to the target status: errors live only
    /// on Failed files, transcription links only on Completed ones.
    pub fn normalized(self) -> Self {
        let error = match self.status {
            FileStatus::Failed => self.error,
            _ => None,
        };
        let transcription_id = match self.status {
            FileStatus::Completed => self.transcription_id,
            _ => None,
        };
        Self {
            status: self.status,
            error,
            transcription_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    pub current_file_index: Option<usize>,
}

impl JobStatusUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            current_file_index: None,
        }
    }

    pub fn processing_at(index: usize) -> Self {
        Self {
            status: JobStatus::Processing,
            current_file_index: Some(index),
        }
    }
}

/// Basename of a user-supplied path. Both `/` and `\` separate components
/// so paths from either platform yield the file name.
pub fn file_name_of(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_tags() {
        for s in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse_status(s.as_str()), Some(s));
        }
        for s in [
            FileStatus::Pending,
            FileStatus::Processing,
            FileStatus::Completed,
            FileStatus::Failed,
            FileStatus::Skipped,
        ] {
            assert_eq!(FileStatus::parse_status(s.as_str()), Some(s));
        }
        assert_eq!(JobStatus::parse_status("PENDING"), None);
        assert_eq!(FileStatus::parse_status("done"), None);
    }

    #[test]
    fn serde_tags_match_stored_tags() {
        let tag = serde_json::to_value(FileStatus::Skipped).unwrap();
        assert_eq!(tag, serde_json::json!("skipped"));
        let tag = serde_json::to_value(JobStatus::Cancelled).unwrap();
        assert_eq!(tag, serde_json::json!("cancelled"));
    }

    #[test]
    fn basename_extraction() {
        assert_eq!(file_name_of("/audio/day1/interview.wav"), "interview.wav");
        assert_eq!(file_name_of("C:\\rec\\memo.m4a"), "memo.m4a");
        assert_eq!(file_name_of("clip.mp3"), "clip.mp3");
        assert_eq!(file_name_of("/audio/dir/"), "dir");
        assert_eq!(file_name_of("/"), "/");
    }

    #[test]
    fn update_normalization_drops_foreign_fields() {
        let u = FileStatusUpdate {
            status: FileStatus::Completed,
            error: Some("stale".into()),
            transcription_id: Some("t1".into()),
        }
        .normalized();
        assert_eq!(u.error, None);
        assert_eq!(u.transcription_id.as_deref(), Some("t1"));

        let u = FileStatusUpdate {
            status: FileStatus::Pending,
            error: Some("x".into()),
            transcription_id: Some("t1".into()),
        }
        .normalized();
        assert_eq!(u.error, None);
        assert_eq!(u.transcription_id, None);
    }

    #[test]
    fn report_counts_files_by_status() {
        let file = |id: &str, status| BatchFile {
            id: id.into(),
            job_id: "j".into(),
            filename: format!("{id}.wav"),
            file_path: format!("/a/{id}.wav"),
            status,
            error: None,
            transcription_id: None,
        };
        let job = BatchJob {
            id: "j".into(),
            status: JobStatus::Processing,
            files: vec![
                file("a", FileStatus::Completed),
                file("b", FileStatus::Failed),
                file("c", FileStatus::Skipped),
                file("d", FileStatus::Completed),
            ],
            current_file_index: 2,
            created_at: Utc::now(),
            completed_at: None,
        };
        let report = job.report();
        assert_eq!(report.total_files, 4);
        assert_eq!(report.completed_files, 2);
        assert_eq!(report.failed_files, 1);
        assert_eq!(report.skipped_files, 1);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["currentFileIndex"], 2);
        assert_eq!(value["files"].as_array().unwrap().len(), 4);
    }
}
