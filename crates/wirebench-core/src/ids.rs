//! Branded identifiers.
//!
//! Session ids are `sess_<uuid v7>`. UUID v7 is time-ordered, so ids sort in
//! creation order and never repeat within a process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one logical operation tracked by the engine.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    const PREFIX: &'static str = "sess";

    /// Allocate a fresh id.
    pub fn new() -> Self {
        Self(format!("{}_{}", Self::PREFIX, Uuid::now_v7()))
    }

    /// Wrap an existing id string without validation.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last 8 characters, for compact status lines.
    pub fn short(&self) -> &str {
        let len = self.0.len();
        if len <= 8 {
            &self.0
        } else {
            &self.0[len - 8..]
        }
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
