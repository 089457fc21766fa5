//! Ledger storage bootstrap.
//!
//! # Responsibility
//! - Open the SQLite file (or in-memory database) that backs balances and
//!   the invocation audit trail.
//! - Bring its schema to the version this build understands.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`.
//! - A connection is handed out only after migrations succeeded.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_read_only};

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open or migrate a ledger database.
#[derive(Debug)]
pub enum DbError {
    /// The parent directory of a ledger file could not be created.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build; it is left untouched.
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
    /// A read-only open found a schema that still needs migrating.
    OutdatedSchema { db_version: u32, latest_supported: u32 },
}

impl DbError {
    /// Stable code used in `event=db_open` log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "ledger_dir_unavailable",
            Self::Sqlite(_) => "sqlite_failure",
            Self::UnsupportedSchemaVersion { .. } => "ledger_schema_too_new",
            Self::OutdatedSchema { .. } => "ledger_schema_outdated",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot prepare ledger directory `{}`: {source}", path.display())
            }
            Self::Sqlite(err) => write!(f, "ledger storage error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "ledger schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::OutdatedSchema {
                db_version,
                latest_supported,
            } => write!(
                f,
                "ledger schema version {db_version} predates {latest_supported}; open it writable to migrate"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::OutdatedSchema { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
