//! Customer entity.

use crate::model::ValidationError;
use crate::repo::{Entity, RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub type CustomerId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Unique across all customers.
    pub email: String,
}

impl Customer {
    /// Creates a customer with a generated id.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Entity for Customer {
    const TABLE: &'static str = "customers";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["name", "email"];

    fn key(&self) -> Value {
        Value::Text(self.id.to_string())
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.email.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let id_text: String = row.get("id")?;
        let id = Uuid::parse_str(&id_text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{id_text}` in customers.id"))
        })?;
        Ok(Self {
            id,
            name: row.get("name")?,
            email: row.get("email")?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                entity: "customer",
                field: "name",
            });
        }
        if !EMAIL_RE.is_match(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }
}
