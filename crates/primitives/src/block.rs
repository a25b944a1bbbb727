use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::{Hash, InvalidHash};

/// DAG node codec tags. `Raw` wraps an opaque blob; `DagNode` is a node with
/// typed links to other [`BlockId`]s.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Codec {
    Raw,
    DagNode,
}

impl Codec {
    const fn tag(self) -> u8 {
        match self {
            Self::Raw => 0x00,
            Self::DagNode => 0x01,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Raw),
            0x01 => Some(Self::DagNode),
            _ => None,
        }
    }
}

/// A content identifier: codec tag plus the hash of the encoded node bytes.
///
/// Two nodes with identical encoded bytes and codec produce identical `BlockId`s.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockId {
    codec: Codec,
    digest: Hash,
}

impl BlockId {
    #[must_use]
    pub fn of(codec: Codec, encoded: &[u8]) -> Self {
        Self {
            codec,
            digest: Hash::new(encoded),
        }
    }

    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    #[must_use]
    pub const fn digest(&self) -> &Hash {
        &self.digest
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        format!("{:02x}{}", self.codec.tag(), self.digest.as_str())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.as_str())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidBlockId {
    #[error("block id too short")]
    TooShort,
    #[error("unknown codec tag")]
    UnknownCodec,
    #[error("invalid digest: {0}")]
    Hash(#[from] InvalidHash),
}

impl FromStr for BlockId {
    type Err = InvalidBlockId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 2 {
            return Err(InvalidBlockId::TooShort);
        }
        let (tag, rest) = s.split_at(2);
        let tag = u8::from_str_radix(tag, 16).map_err(|_err| InvalidBlockId::UnknownCodec)?;
        let codec = Codec::from_tag(tag).ok_or(InvalidBlockId::UnknownCodec)?;
        Ok(Self {
            codec,
            digest: rest.parse()?,
        })
    }
}

impl Serialize for BlockId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}
