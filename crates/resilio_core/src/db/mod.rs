//! SQLite connection setup and schema versioning.
//!
//! The schema version lives in `PRAGMA user_version`: migration N (1-based) has been applied
//! exactly when `user_version >= N`.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::AppError;

/// Ordered schema steps. Append only; never edit a shipped entry.
const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
)];

/// How long a writer waits for another connection's IMMEDIATE transaction before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn pragma_err(e: rusqlite::Error) -> AppError {
    AppError::store("DB_PRAGMA_FAILED", "Failed to configure SQLite connection")
        .with_details(e.to_string())
}

/// Open a database file in WAL mode with the store's busy timeout.
pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to open SQLite database")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(pragma_err)?;
    // Readers keep going while an update holds the write lock.
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(pragma_err)?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::store("DB_OPEN_FAILED", "Failed to open in-memory SQLite database")
            .with_details(e.to_string())
    })
}

pub fn schema_version(conn: &Connection) -> Result<usize, AppError> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(pragma_err)?;
    Ok(usize::try_from(version).unwrap_or(0))
}

/// Bring the schema up to date. Returns the names of the migrations applied by this call.
pub fn migrate(conn: &mut Connection) -> Result<Vec<&'static str>, AppError> {
    let current = schema_version(conn)?;
    if current > MIGRATIONS.len() {
        return Err(AppError::store(
            "DB_SCHEMA_TOO_NEW",
            "Database was written by a newer version of this program",
        )
        .with_details(format!("user_version={current}; known={}", MIGRATIONS.len()))
        .with_retryable(false));
    }

    let mut applied = Vec::new();
    for (version, (name, sql)) in MIGRATIONS.iter().enumerate().skip(current) {
        let tx = conn.transaction().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to start migration transaction")
                .with_details(e.to_string())
        })?;
        tx.execute_batch(sql).map_err(|e| {
            AppError::store("DB_MIGRATION_FAILED", format!("Migration {name} failed"))
                .with_details(e.to_string())
                .with_retryable(false)
        })?;
        // Bumped inside the same transaction so a failed step leaves the version untouched.
        tx.pragma_update(None, "user_version", (version + 1) as i64)
            .map_err(pragma_err)?;
        tx.commit().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to commit migration transaction")
                .with_details(e.to_string())
        })?;

        tracing::info!(migration = *name, version = version + 1, "applied migration");
        applied.push(*name);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_gets_every_migration_once() {
        let mut conn = open_in_memory().expect("open");
        assert_eq!(migrate(&mut conn).expect("first"), vec!["0001_init.sql"]);
        assert!(migrate(&mut conn).expect("second").is_empty());
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len());

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='incidents'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn refuses_schema_from_the_future() {
        let mut conn = open_in_memory().expect("open");
        conn.pragma_update(None, "user_version", 99i64).unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert_eq!(err.code, "DB_SCHEMA_TOO_NEW");
        assert!(!err.retryable);
    }

    #[test]
    fn file_databases_use_wal_and_busy_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open(&tmp.path().join("incidents.sqlite")).expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, BUSY_TIMEOUT.as_millis() as i64);
    }
}
