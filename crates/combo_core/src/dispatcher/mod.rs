//! Dispatcher (proxy): atomic sequencing of handler calls.

pub mod execution;
mod proxy;

pub use execution::{ExecutionContext, ValueError};
pub use proxy::{Dispatcher, ExecutionReceipt};
