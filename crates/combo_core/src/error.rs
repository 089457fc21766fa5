//! Engine-wide failure value.
//!
//! # Responsibility
//! - Carry one classified failure out of `execute` and the registry APIs.
//! - Render the observable reason string `<Component>_<operation>: <reason>`.
//!
//! # Invariants
//! - Every failure path produces exactly one `Revert`; there is no partial
//!   success value.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevertKind {
    /// Caller lacks admin rights.
    Unauthorized,
    DuplicateIdentifier,
    NotFound,
    InactiveOrUnknown,
    /// Net output below the caller's minimum.
    SlippageExceeded,
    /// Measured output delta is zero or negative.
    InvalidOutputAmount,
    /// The wrapped protocol call itself failed.
    ExternalCallFailed,
    ReentrancyDetected,
    /// Attached or allotted native value is less than required.
    InsufficientValue,
    InsufficientBalance,
    /// Malformed instruction or unsupported entry point.
    InvalidInput,
    /// Final refund or sweep could not be transferred.
    TransferFailed,
    Storage,
}

impl RevertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::DuplicateIdentifier => "duplicate_identifier",
            Self::NotFound => "not_found",
            Self::InactiveOrUnknown => "inactive_or_unknown",
            Self::SlippageExceeded => "slippage_exceeded",
            Self::InvalidOutputAmount => "invalid_output_amount",
            Self::ExternalCallFailed => "external_call_failed",
            Self::ReentrancyDetected => "reentrancy_detected",
            Self::InsufficientValue => "insufficient_value",
            Self::InsufficientBalance => "insufficient_balance",
            Self::InvalidInput => "invalid_input",
            Self::TransferFailed => "transfer_failed",
            Self::Storage => "storage",
        }
    }
}

/// Classified failure with its component/operation origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert {
    component: String,
    operation: String,
    kind: RevertKind,
    message: String,
}

impl Revert {
    pub fn new(
        component: impl Into<String>,
        operation: impl Into<String>,
        kind: RevertKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> RevertKind {
        self.kind
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Full reason string as surfaced to callers.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl Display for Revert {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}: {}", self.component, self.operation, self.message)
    }
}

impl Error for Revert {}
