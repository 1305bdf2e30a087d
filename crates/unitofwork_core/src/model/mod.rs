//! Sample domain model persisted through units of work.
//!
//! # Responsibility
//! - Provide concrete entities implementing `repo::Entity`.
//! - Own field-level validation rules enforced before changes are staged.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID key.

use thiserror::Error;

pub mod customer;
pub mod order;

/// Field rule violations detected before a change is staged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity}.{field} cannot be empty")]
    EmptyField {
        entity: &'static str,
        field: &'static str,
    },
    #[error("invalid email address `{0}`")]
    InvalidEmail(String),
    #[error("order total cannot be negative: {0}")]
    NegativeTotal(i64),
}
