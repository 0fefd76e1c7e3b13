//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name {0:?}")]
    InvalidTable(String),
    #[error("table {0} is not ready after creation")]
    NotReady(String),
    #[error("stored timestamp {value:?} in column {column} could not be parsed")]
    Corrupt { column: &'static str, value: String },
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe store holding one [`CheckResult`] per URL.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl Store {
    /// Open the database at `path`. The table itself is created lazily by
    /// [`Store::ensure_collection`].
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, DbError> {
        if !valid_table_name(table) {
            return Err(DbError::InvalidTable(table.to_string()));
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Report whether the results table exists. A missing table is not an error.
    pub fn table_exists(&self) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![self.table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Create the results table keyed by URL.
    pub fn create_table(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                url TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                body TEXT NOT NULL,
                status INTEGER NOT NULL,
                description TEXT NOT NULL,
                change_description TEXT NOT NULL,
                last_notification_time TEXT,
                last_check_time TEXT,
                response_time TEXT NOT NULL,
                last_successful_check_time TEXT,
                last_failure_time TEXT,
                success_count INTEGER NOT NULL,
                failure_count INTEGER NOT NULL
            )",
            self.table
        ))?;
        Ok(())
    }

    /// Make sure the results table exists, creating it on first use.
    ///
    /// Returns once the table is visible to subsequent queries.
    pub fn ensure_collection(&self) -> Result<(), DbError> {
        if self.table_exists()? {
            return Ok(());
        }

        tracing::info!("Creating results table {}", self.table);
        self.create_table()?;

        if !self.table_exists()? {
            return Err(DbError::NotReady(self.table.clone()));
        }
        Ok(())
    }

    /// Load the stored result for `url`, if any.
    pub fn find(&self, url: &str) -> Result<Option<CheckResult>, DbError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT name, url, body, status, description, change_description,
                            last_notification_time, last_check_time, response_time,
                            last_successful_check_time, last_failure_time,
                            success_count, failure_count
                     FROM {} WHERE url = ?1",
                    self.table
                ),
                params![url],
                |row| {
                    Ok(StoredRow {
                        result: CheckResult {
                            name: row.get(0)?,
                            url: row.get(1)?,
                            body: row.get(2)?,
                            status: row.get(3)?,
                            description: row.get(4)?,
                            change_description: row.get(5)?,
                            response_time: row.get(8)?,
                            success_count: row.get(11)?,
                            failure_count: row.get(12)?,
                            ..Default::default()
                        },
                        last_notification_time: row.get(6)?,
                        last_check_time: row.get(7)?,
                        last_success_time: row.get(9)?,
                        last_failure_time: row.get(10)?,
                    })
                },
            )
            .optional()?;

        row.map(StoredRow::into_result).transpose()
    }

    /// Load the stored result for `url`, or the zero value if it was never stored.
    pub fn get(&self, url: &str) -> Result<CheckResult, DbError> {
        Ok(self.find(url)?.unwrap_or_default())
    }

    /// Store `result`, replacing any previous record for the same URL.
    pub fn put(&self, result: &CheckResult) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (url, name, body, status, description, change_description,
                                 last_notification_time, last_check_time, response_time,
                                 last_successful_check_time, last_failure_time,
                                 success_count, failure_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(url) DO UPDATE SET
                 name=excluded.name, body=excluded.body, status=excluded.status,
                 description=excluded.description,
                 change_description=excluded.change_description,
                 last_notification_time=excluded.last_notification_time,
                 last_check_time=excluded.last_check_time,
                 response_time=excluded.response_time,
                 last_successful_check_time=excluded.last_successful_check_time,
                 last_failure_time=excluded.last_failure_time,
                 success_count=excluded.success_count,
                 failure_count=excluded.failure_count",
                self.table
            ),
            params![
                result.url,
                result.name,
                result.body,
                result.status,
                result.description,
                result.change_description,
                format_db_time(result.last_notification_time),
                format_db_time(result.last_check_time),
                result.response_time,
                format_db_time(result.last_success_time),
                format_db_time(result.last_failure_time),
                result.success_count,
                result.failure_count,
            ],
        )?;
        Ok(())
    }
}

/// A row as read from SQLite, before its timestamps are parsed.
struct StoredRow {
    result: CheckResult,
    last_notification_time: Option<String>,
    last_check_time: Option<String>,
    last_success_time: Option<String>,
    last_failure_time: Option<String>,
}

impl StoredRow {
    fn into_result(self) -> Result<CheckResult, DbError> {
        let mut result = self.result;
        result.last_notification_time =
            parse_column("last_notification_time", self.last_notification_time)?;
        result.last_check_time = parse_column("last_check_time", self.last_check_time)?;
        result.last_success_time =
            parse_column("last_successful_check_time", self.last_success_time)?;
        result.last_failure_time = parse_column("last_failure_time", self.last_failure_time)?;
        Ok(result)
    }
}

fn parse_column(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DbError> {
    match value {
        None => Ok(None),
        Some(s) => parse_db_time(&s)
            .map(Some)
            .ok_or(DbError::Corrupt { column, value: s }),
    }
}

fn format_db_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.format(TIME_FORMAT).to_string())
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
fn valid_table_name(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
        .is_match(name)
}
