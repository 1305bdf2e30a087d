//! Schema steps for the customers/orders store.
//!
//! # Invariants
//! - Steps are listed in strictly increasing `version` order.
//! - `PRAGMA user_version` holds the last applied step.
//! - All pending steps commit together or not at all.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "customers",
        sql: include_str!("0001_customers.sql"),
    },
    SchemaStep {
        version: 2,
        name: "orders",
        sql: include_str!("0002_orders.sql"),
    },
];

/// Outcome of bringing one database up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: usize,
}

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Reads the schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

fn pending_steps(current: u32) -> &'static [SchemaStep] {
    let first_pending = SCHEMA_STEPS.partition_point(|step| step.version <= current);
    &SCHEMA_STEPS[first_pending..]
}

/// Applies every step newer than the recorded version.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = schema_version(conn)?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let steps = pending_steps(from_version);
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        applied: 0,
    };
    if steps.is_empty() {
        return Ok(report);
    }

    let tx = conn.transaction()?;
    for step in steps {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        report.to_version = step.version;
        report.applied += 1;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={} to={} steps={}",
        report.from_version,
        report.to_version,
        steps
            .iter()
            .map(|step| step.name)
            .collect::<Vec<_>>()
            .join(",")
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{latest_version, pending_steps, SCHEMA_STEPS};

    #[test]
    fn steps_are_strictly_increasing_from_one() {
        assert_eq!(SCHEMA_STEPS[0].version, 1);
        assert!(SCHEMA_STEPS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
    }

    #[test]
    fn pending_steps_skip_applied_versions() {
        assert_eq!(pending_steps(0).len(), SCHEMA_STEPS.len());
        assert_eq!(pending_steps(1)[0].name, "orders");
        assert!(pending_steps(latest_version()).is_empty());
    }
}
