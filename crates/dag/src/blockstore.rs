//! Content-addressed node store (C1): `Put`/`Get`/`HasBlock` over a
//! [`Database`] column, keyed by [`BlockId`]. Independent of the causal
//! delta DAG tracked by [`crate::DagStore`] — this module stores the raw
//! encoded DAG nodes that deltas (and other content) link to.

use taskmesh_primitives::block::{BlockId, Codec};
use taskmesh_store::db::{Column, Database, StoreError};
use taskmesh_store::slice::Slice;
use thiserror::Error;

/// A DAG node: opaque payload bytes plus typed links to child [`BlockId`]s.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub payload: Vec<u8>,
    pub links: Vec<BlockId>,
}

impl Node {
    #[must_use]
    pub fn new(payload: Vec<u8>, links: Vec<BlockId>) -> Self {
        Self { payload, links }
    }

    /// A node with no links, e.g. a leaf chunk.
    #[must_use]
    pub fn leaf(payload: Vec<u8>) -> Self {
        Self {
            payload,
            links: Vec::new(),
        }
    }

    fn codec(&self) -> Codec {
        if self.links.is_empty() {
            Codec::Raw
        } else {
            Codec::DagNode
        }
    }

    /// Deterministically encodes the node to the bytes that [`BlockStore::put`]
    /// hashes to produce its `BlockId`. Exposed so callers (e.g. a block
    /// accessor validating a fetched node, or test fixtures) can precompute
    /// the id a node will be stored under.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.links.len() * 40 + self.payload.len());
        #[allow(clippy::cast_possible_truncation, reason = "link counts stay small")]
        out.extend_from_slice(&(self.links.len() as u32).to_be_bytes());
        for link in &self.links {
            let encoded = link.as_str();
            #[allow(clippy::cast_possible_truncation, reason = "block ids are short strings")]
            out.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
            out.extend_from_slice(encoded.as_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Inverse of [`Node::encode`]; used by callers (the block accessor,
    /// test fixtures) that reconstruct a node from bytes fetched over the
    /// wire rather than read back from the local store.
    pub fn decode(bytes: &[u8]) -> Result<Self, BlockStoreError> {
        let malformed = || BlockStoreError::Malformed;
        let link_count = u32::from_be_bytes(bytes.get(0..4).ok_or_else(malformed)?.try_into().map_err(|_| BlockStoreError::Malformed)?);
        let mut offset = 4usize;
        let mut links = Vec::with_capacity(link_count as usize);
        for _ in 0..link_count {
            let len_bytes = bytes.get(offset..offset + 4).ok_or_else(malformed)?;
            let len = u32::from_be_bytes(len_bytes.try_into().map_err(|_| BlockStoreError::Malformed)?) as usize;
            offset += 4;
            let raw = bytes.get(offset..offset + len).ok_or_else(malformed)?;
            offset += len;
            let text = core::str::from_utf8(raw).map_err(|_| BlockStoreError::Malformed)?;
            links.push(text.parse().map_err(|_| BlockStoreError::Malformed)?);
        }
        let payload = bytes.get(offset..).ok_or_else(malformed)?.to_vec();
        Ok(Self { payload, links })
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlockStoreError {
    #[error("block not found")]
    NotFound,
    #[error("stored node bytes are malformed")]
    Malformed,
    #[error("store backend error: {0}")]
    Backend(#[from] StoreError),
}

/// Content-addressed node store, layered over any [`Database`].
#[derive(Debug)]
pub struct BlockStore<D> {
    db: D,
}

impl<D: Database> BlockStore<D> {
    pub const fn new(db: D) -> Self {
        Self { db }
    }

    /// Idempotent: putting a node whose `BlockId` already exists is a no-op
    /// that returns the existing id.
    pub fn put(&self, node: &Node) -> Result<BlockId, BlockStoreError> {
        let encoded = node.encode();
        let id = BlockId::of(node.codec(), &encoded);
        if !self.db.has(Column::Blocks, Slice::from(id.as_str().as_bytes()))? {
            self.db.put(
                Column::Blocks,
                Slice::from(id.as_str().as_bytes()),
                Slice::from(encoded),
            )?;
        }
        Ok(id)
    }

    pub fn get(&self, id: &BlockId) -> Result<Node, BlockStoreError> {
        let bytes = self
            .db
            .get(Column::Blocks, Slice::from(id.as_str().as_bytes()))?
            .ok_or(BlockStoreError::NotFound)?;
        Node::decode(bytes.as_ref())
    }

    pub fn has_block(&self, id: &BlockId) -> Result<bool, BlockStoreError> {
        Ok(self.db.has(Column::Blocks, Slice::from(id.as_str().as_bytes()))?)
    }
}
