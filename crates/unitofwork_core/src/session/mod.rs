//! Persistence session contract and the SQLite implementation.
//!
//! # Responsibility
//! - Define what a unit of work consumes from the persistence layer.
//! - Provide a SQLite session that tracks staged changes and flushes
//!   them atomically.
//!
//! # Invariants
//! - `save_changes` applies all staged changes in one transaction or none.
//! - `close` consumes the session, so it can run at most once.

use async_trait::async_trait;

pub mod sqlite;
pub mod tracker;

pub use sqlite::{SessionError, SessionResult, SqliteSession};
pub use tracker::{ChangeKind, ChangeTracker, PendingChange};

/// Persistence context owned by exactly one unit of work.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Error raised by the persistence layer. Passed through unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Flushes every tracked change and returns the affected row count.
    async fn save_changes(&self) -> Result<usize, Self::Error>;

    /// Releases connection/transaction state held by this session.
    ///
    /// Takes the session by value; only its owner can release it.
    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}
