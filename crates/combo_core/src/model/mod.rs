//! Engine value types shared by registry, handlers and dispatcher.
//!
//! # Responsibility
//! - Define addresses, assets and amounts with stable string forms.
//! - Define the instruction shapes callers submit for execution.
//!
//! # Invariants
//! - Model types carry no execution state; per-invocation state lives in the
//!   dispatcher's execution context.

pub mod address;
pub mod amount;
pub mod instruction;
