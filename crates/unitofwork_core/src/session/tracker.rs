//! Ordered log of staged entity changes.

use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the statement must touch exactly one existing row.
    pub fn requires_existing_row(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

/// One staged statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub table: &'static str,
    pub key: Value,
    pub sql: String,
    pub params: Vec<Value>,
}

impl PendingChange {
    /// Human-readable primary key for diagnostics and conflict errors.
    pub fn key_label(&self) -> String {
        match &self.key {
            Value::Null => "NULL".to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Real(value) => value.to_string(),
            Value::Text(value) => value.clone(),
            Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Staged changes in application order.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: Vec<PendingChange>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
