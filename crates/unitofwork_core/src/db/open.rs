//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from `DbConfig`.
//! - Configure pragmas and run migrations before handing out a connection.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - `foreign_keys` and `busy_timeout` mirror the supplied config.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::DbConfig;
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

/// Opens the database described by `config` and applies pending migrations.
///
/// `config.path = None` opens a private in-memory database.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(config: &DbConfig) -> DbResult<Connection> {
    let mode = if config.path.is_some() { "file" } else { "memory" };
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match &config.path {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed",
                started_at.elapsed().as_millis()
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Opens an in-memory database with default pragmas.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db(&DbConfig::in_memory())
}

fn bootstrap_connection(conn: &mut Connection, config: &DbConfig) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    apply_migrations(conn).map(|_| ())
}
