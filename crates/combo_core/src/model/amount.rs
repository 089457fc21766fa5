//! Amounts, run-time amount specs and the return-data word codec.
//!
//! # Invariants
//! - Amount arithmetic is checked; callers surface overflow as a revert.
//! - Return data for a single amount is exactly one 32-byte big-endian word.

use serde::{Deserialize, Serialize};

/// Asset quantity in the smallest unit.
pub type Amount = u128;

/// Denominator for basis-point shares (`10_000` = 100%).
pub const BPS_DENOMINATOR: u32 = 10_000;
/// Width of one encoded return-data word.
pub const WORD_BYTES: usize = 32;

/// How an amount is resolved at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AmountSpec {
    /// Exactly this amount.
    Fixed(Amount),
    /// Everything currently spendable.
    AllBalance,
    /// Basis-point share of the spendable balance.
    Percentage(u32),
    /// Basis-point share of the previous step's net amount.
    PreviousOutput(u32),
}

impl AmountSpec {
    pub fn zero() -> Self {
        Self::Fixed(0)
    }
}

impl Default for AmountSpec {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<Amount> for AmountSpec {
    fn from(value: Amount) -> Self {
        Self::Fixed(value)
    }
}

/// Amount-resolution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountResolveError {
    /// Share outside `0..=10_000` bps.
    InvalidShare(u32),
    /// `PreviousOutput` used on the first step.
    NoPreviousOutput,
    /// Multiplication overflowed.
    Overflow,
}

impl std::fmt::Display for AmountResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidShare(bps) => write!(f, "share must be within 0..=10000 bps, got {bps}"),
            Self::NoPreviousOutput => write!(f, "no previous step output to reference"),
            Self::Overflow => write!(f, "amount overflow"),
        }
    }
}

impl std::error::Error for AmountResolveError {}

/// Resolves `spec` against the spendable balance and the previous net amount.
pub fn resolve_amount(
    spec: &AmountSpec,
    spendable: Amount,
    previous_output: Option<Amount>,
) -> Result<Amount, AmountResolveError> {
    match spec {
        AmountSpec::Fixed(amount) => Ok(*amount),
        AmountSpec::AllBalance => Ok(spendable),
        AmountSpec::Percentage(bps) => share_of(spendable, *bps),
        AmountSpec::PreviousOutput(bps) => {
            let previous = previous_output.ok_or(AmountResolveError::NoPreviousOutput)?;
            share_of(previous, *bps)
        }
    }
}

/// Floors `amount * bps / 10_000`.
pub fn share_of(amount: Amount, bps: u32) -> Result<Amount, AmountResolveError> {
    if bps > BPS_DENOMINATOR {
        return Err(AmountResolveError::InvalidShare(bps));
    }
    if bps == BPS_DENOMINATOR {
        return Ok(amount);
    }
    // Split to keep the product inside u128 for large balances.
    let denominator = Amount::from(BPS_DENOMINATOR);
    let bps = Amount::from(bps);
    let whole = (amount / denominator)
        .checked_mul(bps)
        .ok_or(AmountResolveError::Overflow)?;
    let remainder = (amount % denominator) * bps / denominator;
    whole
        .checked_add(remainder)
        .ok_or(AmountResolveError::Overflow)
}

/// Encodes one amount as a 32-byte big-endian word.
pub fn encode_amount(amount: Amount) -> Vec<u8> {
    let mut word = vec![0u8; WORD_BYTES];
    word[WORD_BYTES - 16..].copy_from_slice(&amount.to_be_bytes());
    word
}

/// Decodes a single-word return value; `None` for any other shape.
pub fn decode_amount(data: &[u8]) -> Option<Amount> {
    if data.len() != WORD_BYTES {
        return None;
    }
    let (high, low) = data.split_at(WORD_BYTES - 16);
    if high.iter().any(|byte| *byte != 0) {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(low);
    Some(Amount::from_be_bytes(bytes))
}
