// Rust guideline compliant 2026-07-24

//! Durable tabular store with the strict locking contract.
//!
//! Every statement is wrapped in its own BEGIN..COMMIT transaction; there is
//! no ambient autocommit. Two levels of mutual exclusion apply to every
//! statement:
//!
//! 1. in-process: a single async mutex around the connection handle, so no
//!    two tasks in this process touch the handle concurrently;
//! 2. cross-process: an exclusive advisory lock on a file named from the
//!    logical database, held from before the statement until after commit.
//!
//! On a "database is locked" failure the statement is retried with a fixed
//! backoff and abandoned after five attempts with a discard log line. On any
//! other failure it is abandoned immediately (the engine rolls the
//! transaction back). Callers receive `None` for an abandoned statement --
//! store errors never propagate across the stage boundary, and a dropped
//! statement is never partially applied.

use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Connection as _, Row as _, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

/// Attempts per statement before it is discarded.
const MAX_TRIALS: u32 = 5;

/// Production backoff between locked retries.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// How long the engine itself waits on a busy database before surfacing
/// "database is locked" to the retry loop.
const BUSY_TIMEOUT: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// SqlValue
// ---------------------------------------------------------------------------

/// A parameter bound into a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for p in params {
        query = match p {
            SqlValue::Null => query.bind(Option::<i64>::None),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Real(r) => query.bind(*r),
            SqlValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

// ---------------------------------------------------------------------------
// Cross-process file lock
// ---------------------------------------------------------------------------

/// Exclusive advisory lock on the per-database lock file. Released on drop.
#[derive(Debug)]
struct FileLock {
    file: std::fs::File,
}

impl FileLock {
    /// Acquire the lock, waiting off the async runtime if another process
    /// holds it.
    async fn acquire(path: &Path) -> std::io::Result<Self> {
        let path = path.to_owned();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&path)?;
            fs2::FileExt::lock_exclusive(&file)?;
            Ok(Self { file })
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            log::warn!("store.sqlite.unlock_failed: error={e}");
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

enum StatementOutput {
    Rows(Vec<SqliteRow>),
    Done(u64),
}

#[derive(Debug)]
enum AttemptError {
    /// "database is locked" -- worth retrying.
    Locked(sqlx::Error),
    /// Anything else; the engine already rolled the transaction back.
    Hard(sqlx::Error),
    LockFile(std::io::Error),
}

impl From<sqlx::Error> for AttemptError {
    fn from(e: sqlx::Error) -> Self {
        let locked = matches!(
            &e,
            sqlx::Error::Database(db) if db.message().contains("database is locked")
        );
        if locked { Self::Locked(e) } else { Self::Hard(e) }
    }
}

/// Connection to one logical durable database.
///
/// One instance per worker; the connection handle inside is serialized by
/// the per-connection mutex, and writers across processes are serialized by
/// the advisory lock file derived from `name`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<SqliteConnection>,
    lock_path: PathBuf,
    retry_backoff: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`.
    ///
    /// `name` is the logical database identity; it names the lock file so
    /// different databases never contend on the same lock. Write-ahead
    /// logging is enabled at open, deliberately outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or the WAL pragma fails.
    pub async fn open(db_path: impl AsRef<Path>, name: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let mut conn = SqliteConnection::connect_with(&opts).await?;
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&mut conn)
            .await?;
        Ok(Self {
            conn: Mutex::new(conn),
            lock_path: std::env::temp_dir().join(format!("flowsentry_{name}.lock")),
            retry_backoff: RETRY_BACKOFF,
        })
    }

    /// Override the locked-retry backoff (tests run in milliseconds; the
    /// 5 second production value would stall the suite).
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// `CREATE TABLE IF NOT EXISTS` with the given schema body.
    pub async fn create_table(&self, table: &str, schema: &str) -> Option<()> {
        let sql = format!("CREATE TABLE IF NOT EXISTS {table} ({schema})");
        self.statement(&sql, &[], false).await.map(|_| ())
    }

    /// Insert one row. `columns` is the comma-separated column list;
    /// `values` are bound positionally. Returns the affected row count.
    pub async fn insert(&self, table: &str, columns: &str, values: &[SqlValue]) -> Option<u64> {
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})");
        match self.statement(&sql, values, false).await? {
            StatementOutput::Done(n) => Some(n),
            StatementOutput::Rows(_) => None,
        }
    }

    /// Update rows matching `condition`. Returns the affected row count.
    pub async fn update(
        &self,
        table: &str,
        set_clause: &str,
        condition: &str,
        params: &[SqlValue],
    ) -> Option<u64> {
        let sql = format!("UPDATE {table} SET {set_clause} WHERE {condition}");
        match self.statement(&sql, params, false).await? {
            StatementOutput::Done(n) => Some(n),
            StatementOutput::Rows(_) => None,
        }
    }

    /// Delete rows matching `condition`. Returns the affected row count.
    pub async fn delete(&self, table: &str, condition: &str, params: &[SqlValue]) -> Option<u64> {
        let sql = format!("DELETE FROM {table} WHERE {condition}");
        match self.statement(&sql, params, false).await? {
            StatementOutput::Done(n) => Some(n),
            StatementOutput::Rows(_) => None,
        }
    }

    /// Select rows. `condition` is appended as a WHERE clause when present;
    /// `params` bind its placeholders.
    pub async fn select(
        &self,
        table: &str,
        columns: &str,
        condition: Option<&str>,
        params: &[SqlValue],
    ) -> Option<Vec<SqliteRow>> {
        let mut sql = format!("SELECT {columns} FROM {table}");
        if let Some(cond) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond);
        }
        match self.statement(&sql, params, true).await? {
            StatementOutput::Rows(rows) => Some(rows),
            StatementOutput::Done(_) => None,
        }
    }

    /// Number of rows in `table` matching `condition` (all rows when
    /// `None`).
    pub async fn count(&self, table: &str, condition: Option<&str>, params: &[SqlValue]) -> Option<i64> {
        let rows = self.select(table, "COUNT(*)", condition, params).await?;
        rows.first().map(|r| r.get::<i64, _>(0))
    }

    /// Run one statement under the full contract: connection mutex, file
    /// lock, explicit transaction, locked-retry loop.
    async fn statement(
        &self,
        sql: &str,
        params: &[SqlValue],
        wants_rows: bool,
    ) -> Option<StatementOutput> {
        for trial in 1..=MAX_TRIALS {
            match self.attempt(sql, params, wants_rows).await {
                Ok(out) => return Some(out),
                Err(AttemptError::Locked(e)) => {
                    if trial == MAX_TRIALS {
                        log::error!(
                            "store.sqlite.discard: query='{sql}' error={e} \
                             retried {MAX_TRIALS} times, query discarded"
                        );
                        return None;
                    }
                    log::debug!("store.sqlite.locked: query='{sql}' trial={trial}");
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(AttemptError::Hard(e)) => {
                    log::error!("store.sqlite.error: query='{sql}' error={e}");
                    return None;
                }
                Err(AttemptError::LockFile(e)) => {
                    log::error!("store.sqlite.lockfile: path={:?} error={e}", self.lock_path);
                    return None;
                }
            }
        }
        None
    }

    async fn attempt(
        &self,
        sql: &str,
        params: &[SqlValue],
        wants_rows: bool,
    ) -> Result<StatementOutput, AttemptError> {
        let mut conn = self.conn.lock().await;
        let flock = FileLock::acquire(&self.lock_path)
            .await
            .map_err(AttemptError::LockFile)?;

        let mut tx = conn.begin().await?;
        let result = if wants_rows {
            bind_params(sqlx::query(sql), params)
                .fetch_all(&mut *tx)
                .await
                .map(StatementOutput::Rows)
        } else {
            bind_params(sqlx::query(sql), params)
                .execute(&mut *tx)
                .await
                .map(|done| StatementOutput::Done(done.rows_affected()))
        };
        let out = result?;
        tx.commit().await?;
        // The file lock outlives the commit.
        drop(flock);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
