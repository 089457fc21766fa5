//! Account and asset identity.
//!
//! # Responsibility
//! - Parse and normalize 20-byte account addresses.
//! - Distinguish the native asset from token assets.
//!
//! # Invariants
//! - `Address` display form is always lowercase `0x` + 40 hex digits.
//! - The native-asset sentinel address never appears as `Asset::Token`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0[xX][0-9a-fA-F]{40}$").expect("valid address regex"));

/// Address routers use to denote the native asset.
pub const NATIVE_SENTINEL_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";
/// Ledger storage key for the native asset.
pub const NATIVE_ASSET_KEY: &str = "native";

/// 20-byte account identifier shared by callers, the dispatcher and protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Builds a deterministic address whose low 8 bytes carry `value`.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn parse(value: &str) -> Result<Self, AddressParseError> {
        let trimmed = value.trim();
        if !ADDRESS_RE.is_match(trimmed) {
            return Err(AddressParseError(trimmed.to_string()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(&trimmed[2..], &mut bytes)
            .map_err(|_| AddressParseError(trimmed.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

/// Address parse failure carrying the rejected input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(pub String);

impl Display for AddressParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "address is invalid: `{}` (expected 0x + 40 hex digits)",
            self.0
        )
    }
}

impl Error for AddressParseError {}

/// Asset held in the ledger: the chain's native asset or one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Asset {
    Native,
    Token(Address),
}

impl Asset {
    pub fn token(address: Address) -> Self {
        if address.to_string() == NATIVE_SENTINEL_ADDRESS {
            return Self::Native;
        }
        Self::Token(address)
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Stable ledger key (`native` or the token address).
    pub fn storage_key(&self) -> String {
        match self {
            Self::Native => NATIVE_ASSET_KEY.to_string(),
            Self::Token(address) => address.to_string(),
        }
    }

    pub fn parse(value: &str) -> Result<Self, AddressParseError> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(NATIVE_ASSET_KEY) {
            return Ok(Self::Native);
        }
        Address::parse(trimmed).map(Self::token)
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

impl TryFrom<String> for Asset {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<Asset> for String {
    fn from(value: Asset) -> Self {
        value.storage_key()
    }
}
