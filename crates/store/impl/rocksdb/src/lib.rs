//! RocksDB-backed [`Database`] implementation.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use strum::IntoEnumIterator;
use taskmesh_store::config::StoreConfig;
use taskmesh_store::db::{Column, DbEntries, DbIterator, StoreError};
use taskmesh_store::slice::Slice;

fn cf_name(column: Column) -> &'static str {
    match column {
        Column::Identity => "identity",
        Column::State => "state",
        Column::Blocks => "blocks",
        Column::DeltaDag => "delta_dag",
        _ => "identity",
    }
}

/// On-disk backend. Each [`Column`] maps to its own RocksDB column family so
/// that the CRDT datastore, the block store and the DAG's pending-delta
/// bookkeeping never collide on key ranges.
#[derive(Debug)]
pub struct RocksDB {
    db: Arc<DB>,
}

impl RocksDB {
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened at `config.path`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open_at(config.path.as_std_path())
    }

    fn open_at(path: &Path) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Column::iter()
            .map(|column| ColumnFamilyDescriptor::new(cf_name(column), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)
            .map_err(|err| StoreError::Backend(err.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, column: Column) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(cf_name(column))
            .ok_or_else(|| StoreError::Backend(format!("missing column family {column:?}")))
    }
}

impl taskmesh_store::db::Database for RocksDB {
    type Iter = RocksDBIter;

    fn get(&self, column: Column, key: Slice<'_>) -> Result<Option<Slice<'static>>, StoreError> {
        let cf = self.cf(column)?;
        self.db
            .get_cf(cf, key.as_ref())
            .map(|maybe| maybe.map(Slice::from))
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn put(&self, column: Column, key: Slice<'_>, value: Slice<'_>) -> Result<(), StoreError> {
        let cf = self.cf(column)?;
        self.db
            .put_cf(cf, key.as_ref(), value.as_ref())
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn delete(&self, column: Column, key: Slice<'_>) -> Result<(), StoreError> {
        let cf = self.cf(column)?;
        self.db
            .delete_cf(cf, key.as_ref())
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn iter(&self, column: Column) -> Result<Self::Iter, StoreError> {
        let cf = self.cf(column)?;
        let entries: Vec<(Box<[u8]>, Box<[u8]>)> = self
            .db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                item.map(|(k, v)| (Box::from(k.as_ref()), Box::from(v.as_ref())))
                    .map_err(|err| StoreError::Backend(err.to_string()))
            })
            .collect::<Result<_, _>>()?;

        Ok(RocksDBIter {
            entries,
            position: 0,
            current: None,
        })
    }
}

/// A snapshot cursor taken at the time [`Database::iter`] was called;
/// concurrent writes to the column are not observed.
#[derive(Debug)]
pub struct RocksDBIter {
    entries: Vec<(Box<[u8]>, Box<[u8]>)>,
    position: usize,
    current: Option<Slice<'static>>,
}

impl DbIterator for RocksDBIter {
    fn seek(&mut self, key: Slice<'_>) -> Result<Option<Slice<'static>>, StoreError> {
        let key = key.as_ref();
        self.position = self.entries.partition_point(|(k, _)| k.as_ref() < key);
        let found = self.entries.get(self.position);
        self.current = found.map(|(_, v)| Slice::from(v.clone()));
        Ok(found.map(|(k, _)| Slice::from(k.clone())))
    }

    fn read(&self) -> Result<&Slice<'static>, StoreError> {
        self.current.as_ref().ok_or(StoreError::NotFound)
    }

    fn entries(self) -> DbEntries<'static>
    where
        Self: Sized + 'static,
    {
        Box::new(
            self.entries
                .into_iter()
                .skip(self.position)
                .map(|(k, v)| (Ok(Slice::from(k)), Ok(Slice::from(v)))),
        )
    }
}
