use strum::EnumIter;
use thiserror::Error;

use crate::slice::Slice;

/// Column families of the local backend. `Identity` is a catch-all used by
/// tests and by callers that do not need column separation; the others are
/// the ones the CRDT datastore and the DAG store actually write into.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, EnumIter)]
#[non_exhaustive]
pub enum Column {
    /// Untyped scratch space; used by tests and ad-hoc callers.
    Identity,
    /// `<ns>/s/`, `<ns>/t/`, `<ns>/k/` rows of the delta-CRDT set.
    State,
    /// Content-addressed DAG nodes, keyed by [`taskmesh_primitives::block::BlockId`].
    Blocks,
    /// Causal-delta DAG bookkeeping (heads, pending set).
    DeltaDag,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Local key/value backend. Implementors provide atomic single-key
/// operations plus a forward cursor per column; every write is expected to
/// be durable once the call returns (no implicit batching across calls).
pub trait Database: Send + Sync + 'static {
    /// Owns its own snapshot/handle rather than borrowing `&self`, so a
    /// cursor can outlive the call that created it.
    type Iter: DbIterator + 'static;

    fn get(&self, column: Column, key: Slice<'_>) -> Result<Option<Slice<'static>>, StoreError>;

    fn has(&self, column: Column, key: Slice<'_>) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }

    fn put(&self, column: Column, key: Slice<'_>, value: Slice<'_>) -> Result<(), StoreError>;

    fn delete(&self, column: Column, key: Slice<'_>) -> Result<(), StoreError>;

    fn iter(&self, column: Column) -> Result<Self::Iter, StoreError>;
}

/// A boxed iterator over the remaining `(key, value)` pairs of a column,
/// starting wherever the cursor that produced it last [`DbIterator::seek`]ed.
pub type DbEntries<'a> = Box<
    dyn Iterator<Item = (Result<Slice<'static>, StoreError>, Result<Slice<'static>, StoreError>)>
        + 'a,
>;

/// A forward cursor over one column.
pub trait DbIterator {
    /// Moves the cursor to the first key greater than or equal to `key`,
    /// returning that key (or `None` if the column has no such key).
    fn seek(&mut self, key: Slice<'_>) -> Result<Option<Slice<'static>>, StoreError>;

    /// The value at the cursor's current position.
    fn read(&self) -> Result<&Slice<'static>, StoreError>;

    /// Consumes the cursor, yielding every `(key, value)` pair from the
    /// current position onward.
    fn entries(self) -> DbEntries<'static>
    where
        Self: Sized + 'static;
}

pub mod memory;

pub use memory::InMemoryDB;
