//! SQLite-backed attempt repository.
//!
//! Connection work runs on tokio-rusqlite's background thread. Lock
//! contention is absorbed by the connection's busy timeout.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use idcheck_core::{AttemptRepository, NewAttempt, RepositoryError, VerificationAttempt};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS verification_attempts (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    document_path    TEXT    NOT NULL CHECK (length(document_path) BETWEEN 1 AND 500),
    selfie_path      TEXT    NOT NULL CHECK (length(selfie_path) BETWEEN 1 AND 500),
    is_verified      INTEGER NOT NULL,
    confidence_score REAL    NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    attempt_date     TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attempts_date ON verification_attempts(attempt_date);
";

const COLUMNS: &str = "id, document_path, selfie_path, is_verified, confidence_score, attempt_date";

pub struct SqliteAttemptRepository {
    conn: Connection,
}

impl SqliteAttemptRepository {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::Database(format!("{}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path).await.map_err(db_err)?;
        let repo = Self::init(conn, busy_timeout).await?;
        tracing::info!(path = %path.display(), "attempt database opened");
        Ok(repo)
    }

    pub async fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().await.map_err(db_err)?;
        Self::init(conn, Duration::from_secs(5)).await
    }

    async fn init(conn: Connection, busy_timeout: Duration) -> Result<Self, RepositoryError> {
        conn.call(move |c| {
            c.busy_timeout(busy_timeout)?;
            let mode: String =
                c.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "sqlite journal mode");
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(db_err)?;
        Ok(Self { conn })
    }
}

fn db_err(e: tokio_rusqlite::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<VerificationAttempt> {
    let date: String = row.get(5)?;
    let attempt_date = DateTime::parse_from_rfc3339(&date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(VerificationAttempt {
        id: row.get(0)?,
        document_path: row.get(1)?,
        selfie_path: row.get(2)?,
        is_verified: row.get(3)?,
        confidence_score: row.get(4)?,
        attempt_date,
    })
}

#[async_trait]
impl AttemptRepository for SqliteAttemptRepository {
    async fn create(&self, attempt: NewAttempt) -> Result<VerificationAttempt, RepositoryError> {
        let date = attempt
            .attempt_date()
            .to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let row = attempt.clone();

        let id = self
            .conn
            .call(move |c| {
                c.execute(
                    "INSERT INTO verification_attempts
                        (document_path, selfie_path, is_verified, confidence_score, attempt_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row.document_path(),
                        row.selfie_path(),
                        row.is_verified(),
                        row.confidence_score(),
                        date
                    ],
                )?;
                Ok(c.last_insert_rowid())
            })
            .await
            .map_err(db_err)?;

        tracing::debug!(id, "attempt row inserted");
        Ok(attempt.with_id(id))
    }

    async fn get(&self, id: i64) -> Result<Option<VerificationAttempt>, RepositoryError> {
        self.conn
            .call(move |c| {
                let found = c
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM verification_attempts WHERE id = ?1"),
                        params![id],
                        row_to_attempt,
                    )
                    .optional()?;
                Ok(found)
            })
            .await
            .map_err(db_err)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<VerificationAttempt>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.conn
            .call(move |c| {
                let mut stmt = c.prepare(&format!(
                    "SELECT {COLUMNS} FROM verification_attempts ORDER BY id DESC LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(params![limit], row_to_attempt)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(db_err)
    }
}
