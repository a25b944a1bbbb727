use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use strum::IntoEnumIterator;

use crate::db::{Column, DbEntries, DbIterator, StoreError};
use crate::slice::Slice;

type ColumnMap = BTreeMap<Box<[u8]>, Box<[u8]>>;

/// A non-persistent [`Database`](crate::db::Database), for tests and
/// in-process fixtures. `owned` and `referenced` are two constructors kept
/// around only to exercise [`Slice`]'s owned-vs-borrowed split in tests; both
/// produce an identical backend.
#[derive(Debug, Default)]
pub struct InMemoryDB {
    columns: Arc<Mutex<Vec<ColumnMap>>>,
}

impl InMemoryDB {
    #[must_use]
    pub fn owned() -> Self {
        Self::new()
    }

    #[must_use]
    pub fn referenced() -> Self {
        Self::new()
    }

    #[must_use]
    pub fn new() -> Self {
        let columns = Column::iter().map(|_| ColumnMap::new()).collect();
        Self {
            columns: Arc::new(Mutex::new(columns)),
        }
    }
}

impl crate::db::Database for InMemoryDB {
    type Iter = MemoryIter;

    fn get(&self, column: Column, key: Slice<'_>) -> Result<Option<Slice<'static>>, StoreError> {
        let columns = self.columns.lock().expect("memory db mutex poisoned");
        Ok(columns[column as usize]
            .get(key.as_ref())
            .map(|value| Slice::from(value.clone())))
    }

    fn put(&self, column: Column, key: Slice<'_>, value: Slice<'_>) -> Result<(), StoreError> {
        let mut columns = self.columns.lock().expect("memory db mutex poisoned");
        let _ignored = columns[column as usize].insert(key.into_boxed(), value.into_boxed());
        Ok(())
    }

    fn delete(&self, column: Column, key: Slice<'_>) -> Result<(), StoreError> {
        let mut columns = self.columns.lock().expect("memory db mutex poisoned");
        let _ignored = columns[column as usize].remove(key.as_ref());
        Ok(())
    }

    fn iter(&self, column: Column) -> Result<Self::Iter, StoreError> {
        let columns = self.columns.lock().expect("memory db mutex poisoned");
        let snapshot: Vec<(Box<[u8]>, Box<[u8]>)> = columns[column as usize]
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(MemoryIter {
            entries: snapshot,
            position: 0,
            current: None,
        })
    }
}

/// A point-in-time snapshot cursor. Writes made after `iter()` was called are
/// not observed by an in-flight iterator, matching the semantics a real
/// backend's snapshot-read would give.
#[derive(Debug)]
pub struct MemoryIter {
    entries: Vec<(Box<[u8]>, Box<[u8]>)>,
    position: usize,
    current: Option<Slice<'static>>,
}

impl DbIterator for MemoryIter {
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
