//! Participant identity.
//!
//! An `Identity` is the caller-chosen name a client connects with. It is only
//! unique among concurrently registered sessions, never across time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Longest identity accepted, in characters.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Validated, caller-supplied participant name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap a raw identity string.
    ///
    /// Surrounding whitespace is trimmed. The result must be non-empty, at
    /// most [`MAX_IDENTITY_LEN`] characters, and free of control characters
    /// (a newline in a name would forge extra rendered lines).
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, IdentityError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }

        let len = trimmed.chars().count();
        if len > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong {
                max: MAX_IDENTITY_LEN,
                len,
            });
        }

        if trimmed.chars().any(char::is_control) {
            return Err(IdentityError::ControlCharacter);
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Identity {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
