//! Asset ledger: the world state every step of an invocation reads and mutates.
//!
//! # Responsibility
//! - Define the balance access contract used by dispatcher, handlers and
//!   external protocols.
//! - Isolate SQLite query details from execution orchestration.
//!
//! # Invariants
//! - All balance mutations of one invocation run inside the single transaction
//!   the dispatcher opened for it.

pub mod balance_ledger;

pub use balance_ledger::{InvocationRecord, Ledger, LedgerError, LedgerResult, SqliteLedger};
