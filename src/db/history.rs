use super::{decode_opt_ts, decode_ts, encode_ts};
use crate::error::{Result, StoreError};
use crate::model::{HistoryStats, TranscriptionRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

const RECORD_COLUMNS: &str = "t.id, t.text, t.duration_ms, t.model_used, t.language, t.created_at";

// Same word characters the FTS5 unicode61 tokenizer keeps.
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// Turn free text into an FTS5 query: every word must match a word prefix.
/// Returns `None` when the text holds no searchable word.
pub fn fts_query(search: &str) -> Option<String> {
    let terms: Vec<String> = WORD
        .find_iter(search)
        .map(|m| format!("\"{}\"*", m.as_str()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TranscriptionRecord> {
    let duration: i64 = row.try_get("duration_ms")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(TranscriptionRecord {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        duration_ms: duration.max(0) as u64,
        model_used: row.try_get("model_used")?,
        language: row.try_get("language")?,
        created_at: decode_ts(&created_at)?,
    })
}

pub async fn insert_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &TranscriptionRecord,
) -> Result<()> {
    let duration = i64::try_from(record.duration_ms)
        .map_err(|_| StoreError::InvalidArgument("duration_ms out of range".into()))?;
    sqlx::query(
        "INSERT INTO transcriptions (id, text, duration_ms, model_used, language, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.text)
    .bind(duration)
    .bind(&record.model_used)
    .bind(&record.language)
    .bind(encode_ts(&record.created_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn fetch_record(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
) -> Result<Option<TranscriptionRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM transcriptions t WHERE t.id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Count of records matching `fts` (all records when `None`).
pub async fn count_records(tx: &mut Transaction<'_, Sqlite>, fts: Option<&str>) -> Result<u64> {
    let count: i64 = match fts {
        Some(q) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM transcriptions_fts WHERE transcriptions_fts MATCH ?",
            )
            .bind(q)
            .fetch_one(&mut **tx)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM transcriptions")
                .fetch_one(&mut **tx)
                .await?
        }
    };
    Ok(count.max(0) as u64)
}

/// One page, newest first. Insertion order breaks timestamp ties so pages
/// never overlap.
pub async fn page_records(
    tx: &mut Transaction<'_, Sqlite>,
    fts: Option<&str>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<Vec<TranscriptionRecord>> {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map(i64::from).unwrap_or(-1);
    let offset = i64::from(offset.unwrap_or(0));
    let rows = match fts {
        Some(q) => {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM transcriptions t \
                 JOIN transcriptions_fts ON transcriptions_fts.rowid = t.seq \
                 WHERE transcriptions_fts MATCH ? \
                 ORDER BY t.created_at DESC, t.seq DESC LIMIT ? OFFSET ?"
            );
            sqlx::query(&sql)
                .bind(q)
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut **tx)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM transcriptions t \
                 ORDER BY t.created_at DESC, t.seq DESC LIMIT ? OFFSET ?"
            );
            sqlx::query(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut **tx)
                .await?
        }
    };
    rows.iter().map(record_from_row).collect()
}

pub async fn delete_record(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM transcriptions WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_all_records(tx: &mut Transaction<'_, Sqlite>) -> Result<u64> {
    let res = sqlx::query("DELETE FROM transcriptions")
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected())
}

pub async fn record_stats(tx: &mut Transaction<'_, Sqlite>) -> Result<HistoryStats> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total_count, COALESCE(SUM(duration_ms), 0) AS total_duration_ms, \
                MIN(created_at) AS first_at, MAX(created_at) AS last_at \
         FROM transcriptions",
    )
    .fetch_one(&mut **tx)
    .await?;
    let total_count: i64 = row.try_get("total_count")?;
    let total_duration_ms: i64 = row.try_get("total_duration_ms")?;
    Ok(HistoryStats {
        total_count: total_count.max(0) as u64,
        total_duration_ms: total_duration_ms.max(0) as u64,
        first_timestamp: decode_opt_ts(row.try_get("first_at")?)?,
        last_timestamp: decode_opt_ts(row.try_get("last_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_quotes_words_as_prefixes() {
        assert_eq!(fts_query("fox").as_deref(), Some("\"fox\"*"));
        assert_eq!(
            fts_query("  Quick, brown-fox! ").as_deref(),
            Some("\"Quick\"* \"brown\"* \"fox\"*")
        );
    }

    #[test]
    fn fts_query_neutralizes_operators() {
        // quotes, NEAR groups and column filters never reach FTS5 raw
        assert_eq!(
            fts_query("text:\"a OR b\"").as_deref(),
            Some("\"text\"* \"a\"* \"OR\"* \"b\"*")
        );
        assert_eq!(fts_query("*** ???"), None);
        assert_eq!(fts_query(""), None);
    }

    #[test]
    fn fts_query_keeps_non_ascii_words() {
        assert_eq!(fts_query("café 東京").as_deref(), Some("\"café\"* \"東京\"*"));
    }
}
