use core::fmt;
use core::ops::Deref;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::common::DIGEST_SIZE;

/// A content hash: sha256 of some bytes, displayed and serialized as base58.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash([u8; DIGEST_SIZE]);

impl Hash {
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl From<[u8; DIGEST_SIZE]> for Hash {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Deref for Hash {
    type Target = [u8; DIGEST_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.as_str())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidHash {
    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("expected {DIGEST_SIZE} bytes, got {0}")]
    WrongLength(usize),
}

impl core::str::FromStr for Hash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s).into_vec()?;
        let bytes: [u8; DIGEST_SIZE] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| InvalidHash::WrongLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}
