//! Delta-CRDT set (C4) and replicated key/value datastore (C5) built on top
//! of it, plus the causal delta DAG from `taskmesh-dag`.

pub mod datastore;
pub mod set;
