//! Typed repository handle shared through a unit of work.
//!
//! # Responsibility
//! - Provide CRUD entry points for one entity type over one session.
//! - Turn entity writes into staged changes; SQL text stays in this module.
//!
//! # Invariants
//! - A repository holds a weak session reference and never keeps the
//!   session alive on its own.
//! - Writes are staged, never executed directly.

use crate::repo::{Entity, RepoError, RepoResult};
use crate::session::{ChangeKind, PendingChange, SqliteSession};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Repository for entity `T` bound to session type `S`.
///
/// Obtained from `UnitOfWork::get_repository`; the same instance is handed
/// out for every request of `T` on one unit of work.
pub struct Repository<T, S> {
    session: Weak<S>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S> Repository<T, S> {
    pub(crate) fn new(session: &Arc<S>) -> Self {
        Self {
            session: Arc::downgrade(session),
            _entity: PhantomData,
        }
    }

    /// Returns whether the owning unit of work is still active.
    pub fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }

    fn session(&self) -> RepoResult<Arc<S>> {
        self.session.upgrade().ok_or(RepoError::Disposed)
    }
}

impl<T, S> Debug for Repository<T, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<T>())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Filter and pagination options for `Repository::list`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Column equality filters, combined with `AND`.
    pub filters: Vec<(String, Value)>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

impl<T: Entity> Repository<T, SqliteSession> {
    /// Stages an insert for `entity`.
    pub fn add(&self, entity: &T) -> RepoResult<()> {
        entity.validate()?;
        let mut params = vec![entity.key()];
        params.extend(entity.values());
        self.stage(ChangeKind::Insert, entity.key(), insert_sql::<T>(), params)
    }

    /// Stages a full-row update for `entity`.
    ///
    /// A missing row surfaces as a concurrency conflict at commit time.
    pub fn update(&self, entity: &T) -> RepoResult<()> {
        entity.validate()?;
        let mut params = entity.values();
        params.push(entity.key());
        self.stage(ChangeKind::Update, entity.key(), update_sql::<T>(), params)
    }

    /// Stages a delete for `entity`.
    pub fn remove(&self, entity: &T) -> RepoResult<()> {
        self.remove_by_key(entity.key())
    }

    /// Stages a delete by primary key.
    pub fn remove_by_key(&self, key: impl Into<Value>) -> RepoResult<()> {
        let key = key.into();
        let sql = format!("DELETE FROM {} WHERE {} = ?1;", T::TABLE, T::KEY);
        self.stage(ChangeKind::Delete, key.clone(), sql, vec![key])
    }

    /// Loads one committed entity by primary key.
    pub fn find(&self, key: impl Into<Value>) -> RepoResult<Option<T>> {
        let key = key.into();
        let sql = format!("{} WHERE {} = ?1;", select_sql::<T>(), T::KEY);
        let session = self.session()?;
        session.read(|conn| -> RepoResult<Option<T>> {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([key])?;
            let entity = match rows.next()? {
                Some(row) => Some(T::from_row(row)?),
                None => None,
            };
            Ok(entity)
        })
    }

    /// Lists committed entities ordered by primary key.
    pub fn list(&self, query: &ListQuery) -> RepoResult<Vec<T>> {
        let mut sql = format!("{} WHERE 1 = 1", select_sql::<T>());
        let mut bind_values: Vec<Value> = Vec::new();

        for (column, value) in &query.filters {
            let column = known_column::<T>(column)?;
            sql.push_str(&format!(" AND {column} = ?"));
            bind_values.push(value.clone());
        }

        sql.push_str(&format!(" ORDER BY {} ASC", T::KEY));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let session = self.session()?;
        session.read(|conn| -> RepoResult<Vec<T>> {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut entities = Vec::new();
            while let Some(row) = rows.next()? {
                entities.push(T::from_row(row)?);
            }
            Ok(entities)
        })
    }

    /// Counts committed rows.
    pub fn count(&self) -> RepoResult<u64> {
        let count: i64 = self.session()?.read(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {};", T::TABLE), [], |row| {
                row.get(0)
            })
            .map_err(RepoError::from)
        })?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn stage(
        &self,
        kind: ChangeKind,
        key: Value,
        sql: String,
        params: Vec<Value>,
    ) -> RepoResult<()> {
        self.session()?.track(PendingChange {
            kind,
            table: T::TABLE,
            key,
            sql,
            params,
        })?;
        Ok(())
    }
}

fn select_sql<T: Entity>() -> String {
    format!(
        "SELECT {}, {} FROM {}",
        T::KEY,
        T::COLUMNS.join(", "),
        T::TABLE
    )
}

fn insert_sql<T: Entity>() -> String {
    let placeholders = (1..=T::COLUMNS.len() + 1)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}, {}) VALUES ({placeholders});",
        T::TABLE,
        T::KEY,
        T::COLUMNS.join(", ")
    )
}

fn update_sql<T: Entity>() -> String {
    let assignments = T::COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {assignments} WHERE {} = ?{};",
        T::TABLE,
        T::KEY,
        T::COLUMNS.len() + 1
    )
}

fn known_column<T: Entity>(column: &str) -> RepoResult<&'static str> {
    if column == T::KEY {
        return Ok(T::KEY);
    }
    T::COLUMNS
        .iter()
        .copied()
        .find(|known| *known == column)
        .ok_or_else(|| RepoError::UnknownColumn {
            table: T::TABLE,
            column: column.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{insert_sql, known_column, update_sql};
    use crate::model::order::Order;
    use crate::repo::RepoError;

    #[test]
    fn generates_positional_insert_and_update() {
        assert_eq!(
            insert_sql::<Order>(),
            "INSERT INTO orders (id, customer_id, total_cents, status) VALUES (?1, ?2, ?3, ?4);"
        );
        assert_eq!(
            update_sql::<Order>(),
            "UPDATE orders SET customer_id = ?1, total_cents = ?2, status = ?3 WHERE id = ?4;"
        );
    }

    #[test]
    fn known_column_accepts_key_and_mapped_columns_only() {
        assert_eq!(known_column::<Order>("id").unwrap(), "id");
        assert_eq!(known_column::<Order>("status").unwrap(), "status");
        let err = known_column::<Order>("status; DROP TABLE orders").unwrap_err();
        assert!(matches!(err, RepoError::UnknownColumn { table: "orders", .. }));
    }
}
