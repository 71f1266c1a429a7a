use std::path::Path;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::user::User;

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed user directory.
///
/// The connection is process-local and mutex-guarded. Usage updates are
/// expressed as conditional SQL, not read-modify-write from Rust.
pub struct UserStore {
    conn: Mutex<Connection>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("User not found: {0}")]
    NotFound(String),
}

impl UserStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                subject_id TEXT PRIMARY KEY,
                email TEXT,
                display_name TEXT,
                queries_used_today INTEGER NOT NULL DEFAULT 0,
                last_query_date TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!("User store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Return the existing record for `subject_id`, creating it on first
    /// sight. Safe under concurrent first-time calls: the upsert either
    /// inserts the single row or refreshes email/display name on the one
    /// that won the race. The usage fields are never touched here.
    pub fn get_or_create(
        &self,
        subject_id: &str,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<User, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (subject_id, email, display_name, queries_used_today, last_query_date, created_at)
             VALUES (?1, ?2, ?3, 0, NULL, ?4)
             ON CONFLICT(subject_id) DO UPDATE SET
                 email = COALESCE(excluded.email, email),
                 display_name = COALESCE(excluded.display_name, display_name)",
            params![subject_id, email, display_name, now.to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Self::select_user(&conn, subject_id)?
            .ok_or_else(|| StoreError::NotFound(subject_id.to_string()))
    }

    /// Look up a user by subject identifier.
    pub fn get(&self, subject_id: &str) -> Result<Option<User>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::select_user(&conn, subject_id)
    }

    /// Overwrite the two usage fields.
    pub fn update_usage(
        &self,
        subject_id: &str,
        queries_used_today: u32,
        last_query_date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = conn
            .execute(
                "UPDATE users SET queries_used_today = ?2, last_query_date = ?3 WHERE subject_id = ?1",
                params![
                    subject_id,
                    queries_used_today,
                    last_query_date.map(|d| d.format(DATE_FMT).to_string()),
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StoreError::NotFound(subject_id.to_string()));
        }
        Ok(())
    }

    /// Persist the day rollover when the stored date is absent or not
    /// `today`. Returns whether a reset happened.
    pub fn reset_usage_if_stale(
        &self,
        subject_id: &str,
        today: NaiveDate,
    ) -> Result<bool, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let today = today.format(DATE_FMT).to_string();
        let rows = conn
            .execute(
                "UPDATE users SET queries_used_today = 0, last_query_date = ?2
                 WHERE subject_id = ?1
                   AND (last_query_date IS NULL OR last_query_date <> ?2)",
                params![subject_id, today],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// Atomically spend one query: a single conditional update that rolls
    /// the counter over to a fresh day, or increments while still under
    /// `limit`. Returns the new count, or `None` when today's allowance is
    /// already exhausted. The counter can never exceed `limit`.
    pub fn try_consume(
        &self,
        subject_id: &str,
        today: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let today = today.format(DATE_FMT).to_string();
        let rows = conn
            .execute(
                "UPDATE users SET
                     queries_used_today = CASE
                         WHEN last_query_date IS NULL OR last_query_date <> ?2 THEN 1
                         ELSE queries_used_today + 1
                     END,
                     last_query_date = ?2
                 WHERE subject_id = ?1
                   AND ?3 > 0
                   AND (last_query_date IS NULL
                        OR last_query_date <> ?2
                        OR queries_used_today < ?3)",
                params![subject_id, today, limit],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if rows == 0 {
            // Either exhausted or missing; tell the two apart.
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM users WHERE subject_id = ?1)",
                    params![subject_id],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Database(e.to_string()))?;

            return if exists {
                Ok(None)
            } else {
                Err(StoreError::NotFound(subject_id.to_string()))
            };
        }

        let new_count: u32 = conn
            .query_row(
                "SELECT queries_used_today FROM users WHERE subject_id = ?1",
                params![subject_id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Some(new_count))
    }

    fn select_user(conn: &Connection, subject_id: &str) -> Result<Option<User>, StoreError> {
        let row: Option<(String, Option<String>, Option<String>, u32, Option<String>, String)> =
            conn.query_row(
                "SELECT subject_id, email, display_name, queries_used_today, last_query_date, created_at
                 FROM users WHERE subject_id = ?1",
                params![subject_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(
            |(subject_id, email, display_name, queries_used_today, last_query_date, created_at)| {
                let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                let last_query_date = last_query_date
                    .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FMT).ok());

                User {
                    subject_id,
                    email,
                    display_name,
                    queries_used_today,
                    last_query_date,
                    created_at,
                }
            },
        ))
    }
}
