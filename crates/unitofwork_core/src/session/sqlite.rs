//! SQLite-backed session with staged change tracking.
//!
//! # Responsibility
//! - Own one SQLite connection for the lifetime of a unit of work.
//! - Stage repository mutations and flush them in a single transaction.
//!
//! # Invariants
//! - A failed flush rolls back and keeps every staged change.
//! - A successful flush clears the tracker.
//! - Reads observe committed state only; staged changes are invisible
//!   until `save_changes` succeeds.
//! - The flush runs on the blocking pool; the async caller only awaits it.

use crate::config::DbConfig;
use crate::db::{open_db, DbError, DbResult};
use crate::session::tracker::{ChangeTracker, PendingChange};
use crate::session::Session;
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("session is closed")]
    Closed,
    #[error("{kind} on `{table}` matched no row for key `{key}`")]
    ConcurrencyConflict {
        kind: &'static str,
        table: &'static str,
        key: String,
    },
    #[error("flush task did not complete: {0}")]
    FlushTask(#[from] JoinError),
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[derive(Debug)]
struct SessionState {
    conn: Option<Connection>,
    tracker: ChangeTracker,
}

impl SessionState {
    fn flush(&mut self) -> SessionResult<usize> {
        let Self { conn, tracker } = self;
        let conn = conn.as_mut().ok_or(SessionError::Closed)?;
        if tracker.is_empty() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut affected = 0;
        for change in tracker.changes() {
            let changed = tx.execute(&change.sql, params_from_iter(change.params.iter()))?;
            if changed == 0 && change.kind.requires_existing_row() {
                // Dropping `tx` rolls back everything applied so far.
                return Err(SessionError::ConcurrencyConflict {
                    kind: change.kind.as_str(),
                    table: change.table,
                    key: change.key_label(),
                });
            }
            affected += changed;
        }
        tx.commit()?;

        debug!(
            "event=session_flush module=session status=ok changes={} affected_rows={affected}",
            tracker.len()
        );
        tracker.clear();
        Ok(affected)
    }

    fn release(&mut self) -> SessionResult<()> {
        self.tracker.clear();
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| err.into()),
            None => Ok(()),
        }
    }
}

/// Session over one SQLite connection.
///
/// The state sits behind an `Arc` so a commit can move to the blocking
/// pool while the session itself stays borrowed by its unit of work.
#[derive(Debug)]
pub struct SqliteSession {
    state: Arc<Mutex<SessionState>>,
}

impl SqliteSession {
    /// Opens the configured database and wraps it in a session.
    pub fn open(config: &DbConfig) -> DbResult<Self> {
        open_db(config).map(Self::from_connection)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(&DbConfig::in_memory())
    }

    /// Wraps an already opened and migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                conn: Some(conn),
                tracker: ChangeTracker::new(),
            })),
        }
    }

    /// Stages one change for the next flush.
    pub fn track(&self, change: PendingChange) -> SessionResult<()> {
        let mut state = self.state.lock();
        if state.conn.is_none() {
            return Err(SessionError::Closed);
        }
        state.tracker.track(change);
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.state.lock().tracker.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.state.lock().tracker.is_empty()
    }

    /// Drops every staged change without touching storage.
    pub fn discard_changes(&self) {
        self.state.lock().tracker.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().conn.is_none()
    }

    /// Runs a read against the committed database state.
    ///
    /// Blocks the calling thread while a commit holds the connection.
    pub fn read<R, E>(&self, f: impl FnOnce(&Connection) -> Result<R, E>) -> Result<R, E>
    where
        E: From<SessionError>,
    {
        let state = self.state.lock();
        let conn = state.conn.as_ref().ok_or(SessionError::Closed)?;
        f(conn)
    }
}

#[async_trait]
impl Session for SqliteSession {
    type Error = SessionError;

    /// Flushes on the blocking pool; requires a running tokio runtime.
    async fn save_changes(&self) -> SessionResult<usize> {
        let state = Arc::clone(&self.state);
        spawn_blocking(move || state.lock().flush()).await?
    }

    fn close(self) -> SessionResult<()> {
        // Waits for a flush task that outlived a cancelled commit.
        self.state.lock().release()
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionError, SqliteSession};
    use crate::session::Session;
    use std::sync::Arc;
    use crate::session::tracker::{ChangeKind, PendingChange};
    use rusqlite::types::Value;

    fn insert_customer(id: &str, email: &str) -> PendingChange {
        PendingChange {
            kind: ChangeKind::Insert,
            table: "customers",
            key: Value::Text(id.to_string()),
            sql: "INSERT INTO customers (id, name, email) VALUES (?1, ?2, ?3);".to_string(),
            params: vec![
                Value::Text(id.to_string()),
                Value::Text("name".to_string()),
                Value::Text(email.to_string()),
            ],
        }
    }

    fn customer_count(session: &SqliteSession) -> i64 {
        session
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM customers;", [], |row| row.get(0))
                    .map_err(SessionError::from)
            })
            .unwrap()
    }

    #[test]
    fn flush_applies_changes_and_clears_tracker() {
        let session = SqliteSession::open_in_memory().unwrap();
        session.track(insert_customer("c1", "a@example.com")).unwrap();
        session.track(insert_customer("c2", "b@example.com")).unwrap();
        assert_eq!(session.pending_changes(), 2);
        assert_eq!(customer_count(&session), 0);

        assert_eq!(session.state.lock().flush().unwrap(), 2);
        assert!(!session.has_changes());
        assert_eq!(customer_count(&session), 2);
    }

    #[test]
    fn flush_with_nothing_staged_returns_zero() {
        let session = SqliteSession::open_in_memory().unwrap();
        assert_eq!(session.state.lock().flush().unwrap(), 0);
    }

    #[test]
    fn failed_flush_rolls_back_and_keeps_changes() {
        let session = SqliteSession::open_in_memory().unwrap();
        session.track(insert_customer("c1", "dup@example.com")).unwrap();
        session.track(insert_customer("c2", "dup@example.com")).unwrap();

        let err = session.state.lock().flush().unwrap_err();
        assert!(matches!(err, SessionError::Db(_)));
        assert_eq!(customer_count(&session), 0);
        assert_eq!(session.pending_changes(), 2);

        session.discard_changes();
        assert_eq!(session.state.lock().flush().unwrap(), 0);
    }

    #[test]
    fn close_releases_connection_and_blocks_later_use() {
        let session = SqliteSession::open_in_memory().unwrap();
        session.track(insert_customer("c1", "a@example.com")).unwrap();
        let state = Arc::clone(&session.state);

        session.close().unwrap();
        let mut state = state.lock();
        assert!(state.conn.is_none());
        assert!(state.tracker.is_empty());
        assert!(matches!(state.flush(), Err(SessionError::Closed)));
        state.release().unwrap();
    }

    #[test]
    fn closed_state_rejects_staging_and_reads() {
        let session = SqliteSession::open_in_memory().unwrap();
        session.state.lock().release().unwrap();

        assert!(session.is_closed());
        assert!(matches!(
            session.track(insert_customer("c2", "b@example.com")),
            Err(SessionError::Closed)
        ));
        let read: Result<(), SessionError> = session.read(|_| Ok(()));
        assert!(matches!(read, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn save_changes_flushes_on_the_blocking_pool() {
        let session = SqliteSession::open_in_memory().unwrap();
        session.track(insert_customer("c1", "a@example.com")).unwrap();

        assert_eq!(session.save_changes().await.unwrap(), 1);
        assert_eq!(customer_count(&session), 1);
        assert!(!session.has_changes());
    }
}
