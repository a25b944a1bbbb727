use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const MAX_ALIAS_LEN: usize = 50;

/// A short human-readable label for a task, room, or node identity.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Alias(String);

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidAlias {
    #[error("alias length {0} exceeds maximum length {MAX_ALIAS_LEN}")]
    TooLong(usize),
}

impl Alias {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Alias {
    type Error = InvalidAlias;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() > MAX_ALIAS_LEN {
            return Err(InvalidAlias::TooLong(value.len()));
        }
        Ok(Self(value))
    }
}

impl FromStr for Alias {
    type Err = InvalidAlias;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl From<Alias> for String {
    fn from(alias: Alias) -> Self {
        alias.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Alias {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Alias {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::try_from(s).map_err(DeError::custom)
    }
}
