//! Add-wins observed-remove set (C4): per-key `elems`/`tombs` membership rows
//! plus a `value`/`priority` winner cache, over a [`Database`] column. Row
//! layout follows the namespace scheme:
//!
//! ```text
//! /<ns>/s/<hex key>/<hex id>   elems membership (value: priority prefix + witnessed bytes)
//! /<ns>/t/<hex key>/<hex id>   tombs membership
//! /<ns>/k/<hex key>/v          winner cache: stored value
//! /<ns>/k/<hex key>/p          winner cache: stored priority (ASCII decimal)
//! ```
//!
//! The elems row value is not itself spec-visible wire format; it lets
//! [`CrdtSet::recompute_winner`] re-derive `value(key)`/`priority(key)` over
//! the ids still live after a merge's tombstones are applied, rather than
//! leaving the winner cache pointed at an id a concurrent tombstone just
//! removed.

use std::sync::Arc;

use taskmesh_primitives::delta::{Delta, DeltaElement, DeltaTombstone, ElementId};
use taskmesh_primitives::hash::Hash;
use taskmesh_store::db::{Column, Database, DbIterator, StoreError};
use taskmesh_store::slice::Slice;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("stored priority row is not valid ASCII decimal")]
    MalformedPriority,
    #[error("stored elem row is too short to contain a priority prefix")]
    MalformedElemRow,
}

/// Observes value and membership transitions as a merge is applied.
/// Default methods are no-ops so callers that don't need notifications can
/// implement the trait with an empty block.
pub trait CrdtHooks: Send + Sync {
    fn on_put(&self, _key: &[u8], _value: &[u8]) {}
    fn on_delete(&self, _key: &[u8]) {}
}

/// A [`CrdtHooks`] that does nothing.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl CrdtHooks for NoopHooks {}

fn elem_prefix(ns: &str, key: &[u8]) -> Vec<u8> {
    format!("/{ns}/s/{}/", hex::encode(key)).into_bytes()
}

fn tomb_prefix(ns: &str, key: &[u8]) -> Vec<u8> {
    format!("/{ns}/t/{}/", hex::encode(key)).into_bytes()
}

fn elem_row(ns: &str, key: &[u8], id: &ElementId) -> Vec<u8> {
    format!("/{ns}/s/{}/{}", hex::encode(key), hex::encode(id.as_bytes())).into_bytes()
}

fn tomb_row(ns: &str, key: &[u8], id: &ElementId) -> Vec<u8> {
    format!("/{ns}/t/{}/{}", hex::encode(key), hex::encode(id.as_bytes())).into_bytes()
}

fn value_row(ns: &str, key: &[u8]) -> Vec<u8> {
    format!("/{ns}/k/{}/v", hex::encode(key)).into_bytes()
}

fn priority_row(ns: &str, key: &[u8]) -> Vec<u8> {
    format!("/{ns}/k/{}/p", hex::encode(key)).into_bytes()
}

/// Packs `(priority, value)` into an elems-row payload: an 8-byte
/// big-endian priority prefix followed by the witnessed value bytes.
fn encode_elem_payload(priority: u64, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + value.len());
    buf.extend_from_slice(&priority.to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

fn decode_elem_payload(bytes: &[u8]) -> Result<(u64, Vec<u8>), SetError> {
    if bytes.len() < 8 {
        return Err(SetError::MalformedElemRow);
    }
    let mut priority_bytes = [0_u8; 8];
    priority_bytes.copy_from_slice(&bytes[..8]);
    Ok((u64::from_be_bytes(priority_bytes), bytes[8..].to_vec()))
}

/// Scans every row under `prefix`, yielding `(row_key, row_value)` pairs.
fn scan_prefix<D: Database>(db: &D, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    let mut iter = db.iter(Column::State)?;
    let _ = iter.seek(Slice::from(prefix))?;

    let mut out = Vec::new();
    for (k, v) in iter.entries() {
        let k = k?.as_ref().to_vec();
        if !k.starts_with(prefix) {
            break;
        }
        out.push((k, v?.as_ref().to_vec()));
    }
    Ok(out)
}

/// The add-wins observed-remove set itself.
pub struct CrdtSet<D> {
    ns: String,
    db: Arc<D>,
}

impl<D: Database> CrdtSet<D> {
    pub fn new(ns: impl Into<String>, db: Arc<D>) -> Self {
        Self { ns: ns.into(), db }
    }

    /// Stages one element. Its witness id is a placeholder until
    /// [`CrdtSet::merge`] fills it in with the id of the delta being
    /// published.
    #[must_use]
    pub fn create_delta_add(&self, key: &[u8], value: &[u8]) -> Delta {
        Delta {
            priority: 0,
            elements: vec![DeltaElement {
                key: key.to_vec(),
                value: value.to_vec(),
                id: Hash::from([0; 32]),
            }],
            tombstones: vec![],
        }
    }

    /// Reads the current live `elems(key)` ids and emits a tombstone for
    /// each; ids already tombstoned are omitted.
    pub fn create_delta_remove(&self, key: &[u8]) -> Result<Delta, SetError> {
        let live = self.live_elem_ids(key)?;
        Ok(Delta {
            priority: 0,
            elements: vec![],
            tombstones: live
                .into_iter()
                .map(|id| DeltaTombstone {
                    key: key.to_vec(),
                    id,
                })
                .collect(),
        })
    }

    /// Applies tombstones then elements, firing hooks for each key whose
    /// stored value or membership observably changed. `id_of_delta` becomes
    /// the witness id of every element in `delta` (tombstone ids are left
    /// untouched — they already name the element they cancel).
    pub fn merge(
        &self,
        mut delta: Delta,
        id_of_delta: ElementId,
        hooks: &dyn CrdtHooks,
    ) -> Result<(), SetError> {
        for element in &mut delta.elements {
            element.id = id_of_delta;
        }

        let mut touched: Vec<Vec<u8>> = Vec::new();
        for tombstone in &delta.tombstones {
            if !touched.contains(&tombstone.key) {
                touched.push(tombstone.key.clone());
            }
        }
        for element in &delta.elements {
            if !touched.contains(&element.key) {
                touched.push(element.key.clone());
            }
        }

        let mut before = Vec::with_capacity(touched.len());
        for key in &touched {
            before.push((self.is_present(key)?, self.stored_value(key)?));
        }

        let mut tombstoned_keys: Vec<Vec<u8>> = Vec::new();
        for tombstone in &delta.tombstones {
            self.write_tombstone(tombstone)?;
            if !tombstoned_keys.contains(&tombstone.key) {
                tombstoned_keys.push(tombstone.key.clone());
            }
        }
        // A tombstone may have just removed the id the winner cache pointed
        // at; recompute it over whatever ids are still live before any new
        // elements are applied, so `apply_element`'s overwrite-if-greater
        // check compares against a cache that reflects reality again.
        for key in &tombstoned_keys {
            self.recompute_winner(key)?;
        }
        for element in &delta.elements {
            self.apply_element(delta.priority, element)?;
        }

        for (key, (was_present, before_value)) in touched.iter().zip(before) {
            let now_present = self.is_present(key)?;
            if was_present && !now_present {
                hooks.on_delete(key);
            }

            let after_value = self.stored_value(key)?;
            if after_value != before_value {
                if let Some(value) = &after_value {
                    hooks.on_put(key, value);
                }
            }
        }

        Ok(())
    }

    fn apply_element(&self, priority: u64, element: &DeltaElement) -> Result<(), SetError> {
        if self.is_tombstoned(&element.key, &element.id)? {
            return Ok(());
        }

        self.db.put(
            Column::State,
            Slice::from(elem_row(&self.ns, &element.key, &element.id)),
            Slice::from(encode_elem_payload(priority, &element.value)),
        )?;

        let stored = self.stored_priority_value(&element.key)?;
        let should_overwrite = match &stored {
            None => true,
            Some((stored_priority, stored_value)) => {
                (priority, element.value.as_slice()) > (*stored_priority, stored_value.as_slice())
            }
        };

        if should_overwrite {
            self.write_winner(&element.key, priority, &element.value)?;
        }

        Ok(())
    }

    /// Recomputes `value(key)`/`priority(key)` over the ids still live
    /// after tombstones have been applied, taking the maximal
    /// `(priority, value)` tuple per the §4.3 winner rule, or clearing the
    /// winner cache entirely once membership is empty.
    fn recompute_winner(&self, key: &[u8]) -> Result<(), SetError> {
        let live = self.live_elem_entries(key)?;
        match live
            .into_iter()
            .max_by(|a, b| (a.0, a.1.as_slice()).cmp(&(b.0, b.1.as_slice())))
        {
            Some((priority, value)) => self.write_winner(key, priority, &value),
            None => self.clear_winner(key),
        }
    }

    fn write_winner(&self, key: &[u8], priority: u64, value: &[u8]) -> Result<(), SetError> {
        self.db.put(
            Column::State,
            Slice::from(value_row(&self.ns, key)),
            Slice::from(value.to_vec()),
        )?;
        self.db.put(
            Column::State,
            Slice::from(priority_row(&self.ns, key)),
            Slice::from(priority.to_string().into_bytes()),
        )?;
        Ok(())
    }

    fn clear_winner(&self, key: &[u8]) -> Result<(), SetError> {
        self.db
            .delete(Column::State, Slice::from(value_row(&self.ns, key)))?;
        self.db
            .delete(Column::State, Slice::from(priority_row(&self.ns, key)))?;
        Ok(())
    }

    fn write_tombstone(&self, tombstone: &DeltaTombstone) -> Result<(), SetError> {
        self.db.put(
            Column::State,
            Slice::from(tomb_row(&self.ns, &tombstone.key, &tombstone.id)),
            Slice::from(Vec::new()),
        )?;
        Ok(())
    }

    fn is_tombstoned(&self, key: &[u8], id: &ElementId) -> Result<bool, SetError> {
        Ok(self
            .db
            .has(Column::State, Slice::from(tomb_row(&self.ns, key, id)))?)
    }

    fn live_elem_ids(&self, key: &[u8]) -> Result<Vec<ElementId>, SetError> {
        let prefix = elem_prefix(&self.ns, key);
        let rows = scan_prefix(&*self.db, &prefix)?;

        let mut ids = Vec::new();
        for (row_key, _) in rows {
            let hex_id = row_key
                .get(prefix.len()..)
                .and_then(|bytes| core::str::from_utf8(bytes).ok())
                .unwrap_or_default();
            let Ok(bytes) = hex::decode(hex_id) else {
                continue;
            };
            let Ok(raw): Result<[u8; 32], _> = bytes.try_into() else {
                continue;
            };
            let id = Hash::from(raw);
            if !self.is_tombstoned(key, &id)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Live ids for `key` together with the `(priority, value)` each one
    /// witnessed, used by [`CrdtSet::recompute_winner`] to re-derive the
    /// winner cache without the id a tombstone just removed.
    fn live_elem_entries(&self, key: &[u8]) -> Result<Vec<(u64, Vec<u8>)>, SetError> {
        let prefix = elem_prefix(&self.ns, key);
        let rows = scan_prefix(&*self.db, &prefix)?;

        let mut out = Vec::new();
        for (row_key, row_value) in rows {
            let hex_id = row_key
                .get(prefix.len()..)
                .and_then(|bytes| core::str::from_utf8(bytes).ok())
                .unwrap_or_default();
            let Ok(bytes) = hex::decode(hex_id) else {
                continue;
            };
            let Ok(raw): Result<[u8; 32], _> = bytes.try_into() else {
                continue;
            };
            let id = Hash::from(raw);
            if self.is_tombstoned(key, &id)? {
                continue;
            }
            out.push(decode_elem_payload(&row_value)?);
        }
        Ok(out)
    }

    /// `elems(key) \ tombs(key) != {}`.
    pub fn is_present(&self, key: &[u8]) -> Result<bool, SetError> {
        Ok(!self.live_elem_ids(key)?.is_empty())
    }

    pub fn stored_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SetError> {
        Ok(self
            .db
            .get(Column::State, Slice::from(value_row(&self.ns, key)))?
            .map(|slice| slice.as_ref().to_vec()))
    }

    fn stored_priority_value(&self, key: &[u8]) -> Result<Option<(u64, Vec<u8>)>, SetError> {
        let Some(value) = self.stored_value(key)? else {
            return Ok(None);
        };
        let Some(raw_priority) = self
            .db
            .get(Column::State, Slice::from(priority_row(&self.ns, key)))?
        else {
            return Ok(None);
        };
        let priority_str =
            core::str::from_utf8(raw_priority.as_ref()).map_err(|_| SetError::MalformedPriority)?;
        let priority: u64 = priority_str
            .parse()
            .map_err(|_| SetError::MalformedPriority)?;
        Ok(Some((priority, value)))
    }
}
