//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{CodeBlock, ContentRecord};
use crate::state::{Job, JobId, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{JobUpdate, SourceRecord, StoredContentEntry};
use crate::IngestError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const JOB_COLUMNS: &str = "id, target, status, total_items, items_processed, items_failed,
     items_new, items_updated, items_unchanged, progress, retry_count, scheduled_at,
     started_at, completed_at, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(IngestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, IngestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, v)).transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(idx: usize, value: String) -> rusqlite::Result<JobStatus> {
    JobStatus::from_db_string(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown job status '{}'", value).into(),
        )
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        target: row.get(1)?,
        status: parse_status(2, row.get(2)?)?,
        total_items: row.get(3)?,
        items_processed: row.get(4)?,
        items_failed: row.get(5)?,
        items_new: row.get(6)?,
        items_updated: row.get(7)?,
        items_unchanged: row.get(8)?,
        progress: row.get(9)?,
        retry_count: row.get(10)?,
        scheduled_at: parse_timestamp(11, row.get(11)?)?,
        started_at: parse_optional_timestamp(12, row.get(12)?)?,
        completed_at: parse_optional_timestamp(13, row.get(13)?)?,
        error_message: row.get(14)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Content =====

    fn lookup_fingerprint(&self, url: &str) -> StorageResult<Option<String>> {
        let fingerprint = self
            .conn
            .query_row(
                "SELECT fingerprint FROM content WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }

    fn upsert_content(&mut self, record: &ContentRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let code_blocks = serde_json::to_string(&record.code_blocks)?;
        let keywords = serde_json::to_string(&record.keywords)?;
        let topics = serde_json::to_string(&record.topics)?;

        self.conn.execute(
            "INSERT INTO content (url, target, path, title, body, code_blocks, keywords, topics,
             word_count, char_count, fingerprint, first_seen_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(url) DO UPDATE SET
                target = excluded.target,
                path = excluded.path,
                title = excluded.title,
                body = excluded.body,
                code_blocks = excluded.code_blocks,
                keywords = excluded.keywords,
                topics = excluded.topics,
                word_count = excluded.word_count,
                char_count = excluded.char_count,
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at",
            params![
                record.url,
                record.target,
                record.path,
                record.title,
                record.body,
                code_blocks,
                keywords,
                topics,
                record.word_count as i64,
                record.char_count as i64,
                record.fingerprint,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_content(&self, url: &str) -> StorageResult<Option<StoredContentEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, target, path, title, body, code_blocks, keywords, topics,
             word_count, char_count, fingerprint, first_seen_at, updated_at
             FROM content WHERE url = ?1",
        )?;

        let entry = stmt
            .query_row(params![url], |row| {
                Ok(StoredContentEntry {
                    url: row.get(0)?,
                    target: row.get(1)?,
                    path: row.get(2)?,
                    title: row.get(3)?,
                    body: row.get(4)?,
                    code_blocks: parse_json::<Vec<CodeBlock>>(5, row.get(5)?)?,
                    keywords: parse_json(6, row.get(6)?)?,
                    topics: parse_json(7, row.get(7)?)?,
                    word_count: row.get(8)?,
                    char_count: row.get(9)?,
                    fingerprint: row.get(10)?,
                    first_seen_at: parse_timestamp(11, row.get(11)?)?,
                    updated_at: parse_timestamp(12, row.get(12)?)?,
                })
            })
            .optional()?;

        Ok(entry)
    }

    fn count_content(&self, target: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content WHERE target = ?1",
            params![target],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Sources =====

    fn record_source_run(&mut self, target: &str, page_count: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sources (slug, last_scraped_at, page_count, run_count)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(slug) DO UPDATE SET
                last_scraped_at = excluded.last_scraped_at,
                page_count = excluded.page_count,
                run_count = run_count + 1",
            params![target, now, page_count],
        )?;
        Ok(())
    }

    fn get_source(&self, target: &str) -> StorageResult<Option<SourceRecord>> {
        let source = self
            .conn
            .query_row(
                "SELECT slug, last_scraped_at, page_count, run_count FROM sources WHERE slug = ?1",
                params![target],
                |row| {
                    Ok(SourceRecord {
                        slug: row.get(0)?,
                        last_scraped_at: parse_timestamp(1, row.get(1)?)?,
                        page_count: row.get(2)?,
                        run_count: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(source)
    }

    // ===== Jobs =====

    fn create_job(&mut self, target: &str) -> StorageResult<Job> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO jobs (target, status, scheduled_at) VALUES (?1, ?2, ?3)",
            params![target, JobStatus::Pending.to_db_string(), now.to_rfc3339()],
        )?;
        Ok(Job::new(self.conn.last_insert_rowid(), target, now))
    }

    fn update_job(&mut self, job_id: JobId, update: &JobUpdate) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET
                status = COALESCE(?1, status),
                total_items = COALESCE(?2, total_items),
                items_processed = COALESCE(?3, items_processed),
                items_failed = COALESCE(?4, items_failed),
                items_new = COALESCE(?5, items_new),
                items_updated = COALESCE(?6, items_updated),
                items_unchanged = COALESCE(?7, items_unchanged),
                progress = COALESCE(?8, progress),
                retry_count = COALESCE(?9, retry_count),
                started_at = COALESCE(?10, started_at),
                completed_at = COALESCE(?11, completed_at),
                error_message = COALESCE(?12, error_message)
             WHERE id = ?13",
            params![
                update.status.map(|s| s.to_db_string()),
                update.total_items,
                update.items_processed,
                update.items_failed,
                update.items_new,
                update.items_updated,
                update.items_unchanged,
                update.progress,
                update.retry_count,
                update.started_at.map(|t| t.to_rfc3339()),
                update.completed_at.map(|t| t.to_rfc3339()),
                update.error_message,
                job_id,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn get_job(&self, job_id: JobId) -> StorageResult<Job> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, params![job_id], job_from_row)
            .optional()?
            .ok_or(StorageError::JobNotFound(job_id))
    }

    fn list_jobs(&self, target: Option<&str>) -> StorageResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE (?1 IS NULL OR target = ?1) ORDER BY id DESC",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![target], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, body: &str) -> ContentRecord {
        ContentRecord {
            url: url.to_string(),
            target: "rust".to_string(),
            path: "std/index".to_string(),
            title: "std".to_string(),
            body: body.to_string(),
            code_blocks: vec![CodeBlock {
                language: "rust".to_string(),
                code: "fn main() {}".to_string(),
            }],
            keywords: vec!["standard".to_string()],
            topics: vec!["rust".to_string()],
            word_count: body.split_whitespace().count(),
            char_count: body.chars().count(),
            fingerprint: crate::crawler::fingerprint(body),
            success: true,
            error: None,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_lookup_missing_fingerprint() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.lookup_fingerprint("https://x/rust/a").unwrap(), None);
    }

    #[test]
    fn test_upsert_and_get_content() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let rec = record("https://x/rust/a", "the standard library");
        storage.upsert_content(&rec).unwrap();

        let stored = storage.get_content(&rec.url).unwrap().unwrap();
        assert_eq!(stored.fingerprint, rec.fingerprint);
        assert_eq!(stored.code_blocks, rec.code_blocks);
        assert_eq!(stored.word_count, 3);
        assert_eq!(
            storage.lookup_fingerprint(&rec.url).unwrap(),
            Some(rec.fingerprint.clone())
        );
    }

    #[test]
    fn test_upsert_replaces_and_keeps_first_seen() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = record("https://x/rust/a", "version one");
        storage.upsert_content(&first).unwrap();
        let before = storage.get_content(&first.url).unwrap().unwrap();

        let second = record("https://x/rust/a", "version two");
        storage.upsert_content(&second).unwrap();
        let after = storage.get_content(&first.url).unwrap().unwrap();

        assert_eq!(after.body, "version two");
        assert_eq!(after.first_seen_at, before.first_seen_at);
        assert_eq!(storage.count_content("rust").unwrap(), 1);
    }

    #[test]
    fn test_record_source_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.record_source_run("rust", 10).unwrap();
        storage.record_source_run("rust", 12).unwrap();

        let source = storage.get_source("rust").unwrap().unwrap();
        assert_eq!(source.page_count, 12);
        assert_eq!(source.run_count, 2);
        assert!(storage.get_source("go").unwrap().is_none());
    }

    #[test]
    fn test_create_and_get_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job("rust").unwrap();
        assert!(job.id > 0);

        let loaded = storage.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.target, "rust");
        assert_eq!(loaded.scheduled_at, job.scheduled_at);
    }

    #[test]
    fn test_update_job_is_partial() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job("rust").unwrap();

        storage
            .update_job(
                job.id,
                &JobUpdate {
                    status: Some(JobStatus::Running),
                    total_items: Some(5),
                    ..JobUpdate::default()
                },
            )
            .unwrap();
        storage
            .update_job(
                job.id,
                &JobUpdate {
                    items_processed: Some(1),
                    items_new: Some(1),
                    progress: Some(20),
                    ..JobUpdate::default()
                },
            )
            .unwrap();

        let loaded = storage.get_job(job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert_eq!(loaded.total_items, 5);
        assert_eq!(loaded.items_processed, 1);
        assert_eq!(loaded.progress, 20);
        assert!(loaded.started_at.is_none());
    }

    #[test]
    fn test_update_missing_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.update_job(99, &JobUpdate::default());
        assert!(matches!(result, Err(StorageError::JobNotFound(99))));
        assert!(matches!(
            storage.get_job(99),
            Err(StorageError::JobNotFound(99))
        ));
    }

    #[test]
    fn test_list_jobs_filters_by_target() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.create_job("rust").unwrap();
        storage.create_job("go").unwrap();
        let latest = storage.create_job("rust").unwrap();

        let rust_jobs = storage.list_jobs(Some("rust")).unwrap();
        assert_eq!(rust_jobs.len(), 2);
        assert_eq!(rust_jobs[0].id, latest.id);

        assert_eq!(storage.list_jobs(None).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_status_is_a_conversion_error() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job("rust").unwrap();
        storage
            .conn
            .execute(
                "UPDATE jobs SET status = 'exploded' WHERE id = ?1",
                params![job.id],
            )
            .unwrap();

        assert!(matches!(
            storage.get_job(job.id),
            Err(StorageError::Sqlite(
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, _)
            ))
        ));
        assert!(storage.list_jobs(None).is_err());
    }
}
