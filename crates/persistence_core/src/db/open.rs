//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure pragmas the document store relies on.
//! - Run schema migrations before handing a connection out.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout set.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection options applied during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbOptions {
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Opens a SQLite database file with default options and applies migrations.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with(path, &DbOptions::default())
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with(path: impl AsRef<Path>, options: &DbOptions) -> DbResult<Connection> {
    open_with_mode("file", options, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with_mode("memory", &DbOptions::default(), Connection::open_in_memory)
}

pub(crate) fn open_db_in_memory_with(options: &DbOptions) -> DbResult<Connection> {
    open_with_mode("memory", options, Connection::open_in_memory)
}

fn open_with_mode<F>(mode: &str, options: &DbOptions, connect: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
            started_at.elapsed().as_millis()
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, options) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, options: &DbOptions) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(options.busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
