//! Channel resource identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// Maximum resource name length.
const MAX_LENGTH: usize = 128;

/// The name of a remote resource a duplex channel is bound to.
///
/// Resource names are collection names produced by the server, e.g.
/// `reports-42`. They are embedded in the channel URL path, so only ASCII
/// alphanumerics, `-`, `_` and `.` are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();

        if s.is_empty() {
            return Err(invalid(s, "cannot be empty"));
        }

        if s.len() > MAX_LENGTH {
            return Err(invalid(s, &format!("exceeds {} characters", MAX_LENGTH)));
        }

        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(invalid(s, &format!("invalid character '{}'", c)));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn invalid(value: &str, reason: &str) -> Error {
    InvalidInputError::ResourceId {
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
