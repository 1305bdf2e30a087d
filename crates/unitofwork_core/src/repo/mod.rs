//! Repository layer: entity mapping contract and typed repositories.
//!
//! # Responsibility
//! - Map entities to table rows through the `Entity` contract.
//! - Stage writes on the owning session; serve reads from committed state.
//!
//! # Invariants
//! - Write paths call `Entity::validate()` before staging.
//! - Repositories never own their session; once the owning unit of work is
//!   disposed every operation fails with `RepoError::Disposed`.

use crate::db::DbError;
use crate::model::ValidationError;
use crate::session::SessionError;
use rusqlite::types::Value;
use rusqlite::Row;
use thiserror::Error;

pub mod repository;

pub use repository::{ListQuery, Repository};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("repository used after its unit of work was disposed")]
    Disposed,
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("unknown column `{column}` for table `{table}`")]
    UnknownColumn {
        table: &'static str,
        column: String,
    },
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Session(SessionError::Db(value))
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Session(SessionError::from(value))
    }
}

/// Row mapping for one persisted entity type.
///
/// `values()` must return one value per entry of `COLUMNS`, in the same
/// order. The key column is not part of `COLUMNS`.
pub trait Entity: Sized + 'static {
    const TABLE: &'static str;
    const KEY: &'static str;
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Value;
    fn values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}
