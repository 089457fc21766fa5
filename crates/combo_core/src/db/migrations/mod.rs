//! Ledger schema migrations.
//!
//! # Responsibility
//! - List the ledger schema steps in order.
//! - Apply whatever is pending inside one transaction.
//!
//! # Invariants
//! - Step versions are contiguous, starting at 1.
//! - The last applied version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, name, sql)` for each schema step.
const STEPS: &[(u32, &str, &str)] = &[
    (1, "ledger", include_str!("0001_ledger.sql")),
    (2, "invocations", include_str!("0002_invocations.sql")),
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

/// Names of the steps a connection at `user_version` still needs.
pub fn pending_migrations(conn: &Connection) -> DbResult<Vec<&'static str>> {
    let current = schema_version(conn)?;
    Ok(STEPS
        .iter()
        .filter(|(version, _, _)| *version > current)
        .map(|(_, name, _)| *name)
        .collect())
}

/// Brings `conn` up to [`latest_version`]; refuses newer schemas.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let tx = conn.transaction()?;
    for (version, name, sql) in STEPS.iter().filter(|(version, _, _)| *version > current) {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        info!("event=db_migrate module=db status=ok version={version} name={name}");
    }
    tx.commit()?;
    Ok(())
}

/// Fails unless `conn` is exactly at [`latest_version`].
pub fn require_current(conn: &Connection) -> DbResult<()> {
    let db_version = schema_version(conn)?;
    let latest_supported = latest_version();
    match db_version.cmp(&latest_supported) {
        std::cmp::Ordering::Equal => Ok(()),
        std::cmp::Ordering::Greater => Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }),
        std::cmp::Ordering::Less => Err(DbError::OutdatedSchema {
            db_version,
            latest_supported,
        }),
    }
}

fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
