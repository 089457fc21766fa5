//! Fixed-width handler identifiers.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Maximum tag length in bytes.
pub const HANDLER_ID_BYTES: usize = 32;

/// 32-byte registry key derived from a human-chosen tag such as `OneInchV3`.
///
/// The tag is stored left-aligned and zero-padded, so equal tags always map to
/// equal keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HandlerId([u8; HANDLER_ID_BYTES]);

impl HandlerId {
    pub fn from_tag(tag: &str) -> Result<Self, HandlerIdError> {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(HandlerIdError::Empty);
        }
        if trimmed.len() > HANDLER_ID_BYTES {
            return Err(HandlerIdError::TooLong(trimmed.to_string()));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(HandlerIdError::InvalidCharacter(trimmed.to_string()));
        }

        let mut bytes = [0u8; HANDLER_ID_BYTES];
        bytes[..trimmed.len()].copy_from_slice(trimmed.as_bytes());
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HANDLER_ID_BYTES] {
        &self.0
    }

    /// Human tag without padding.
    pub fn tag(&self) -> String {
        let end = self
            .0
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(HANDLER_ID_BYTES);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl Display for HandlerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl Debug for HandlerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerId({})", self.tag())
    }
}

impl TryFrom<String> for HandlerId {
    type Error = HandlerIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_tag(value.as_str())
    }
}

impl From<HandlerId> for String {
    fn from(value: HandlerId) -> Self {
        value.tag()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerIdError {
    Empty,
    TooLong(String),
    InvalidCharacter(String),
}

impl Display for HandlerIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "handler id must not be empty"),
            Self::TooLong(value) => {
                write!(f, "handler id exceeds {HANDLER_ID_BYTES} bytes: {value}")
            }
            Self::InvalidCharacter(value) => {
                write!(f, "handler id contains unsupported characters: {value}")
            }
        }
    }
}

impl Error for HandlerIdError {}
