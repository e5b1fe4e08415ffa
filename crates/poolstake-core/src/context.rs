use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{CacheStore, KvStore};
use crate::Result;

/// Height and Unix-seconds time of the block being processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub time: u64,
}

impl BlockHeader {
    pub fn new(height: u64, time: u64) -> BlockHeader {
        BlockHeader { height, time }
    }
}

/// Store handle plus the current block header.
///
/// Keepers never hold a store themselves; every operation borrows one through a context.
pub struct Context<'a> {
    store: &'a mut dyn KvStore,
    header: BlockHeader,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut dyn KvStore, header: BlockHeader) -> Self {
        Self { store, header }
    }

    pub fn header(&self) -> BlockHeader {
        self.header
    }

    pub fn set_header(&mut self, header: BlockHeader) {
        self.header = header;
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn time(&self) -> u64 {
        self.header.time
    }

    pub fn store(&self) -> &dyn KvStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn KvStore {
        &mut *self.store
    }

    /// Runs `f` against a cached view; its writes are committed only if it returns `Ok`.
    pub fn cached<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let header = self.header;
        let mut cache = CacheStore::new(&mut *self.store);
        let out = f(&mut Context::new(&mut cache, header));
        match &out {
            Ok(_) => cache.write(),
            Err(e) => debug!(error = %e, fatal = e.is_fatal(), "discarding cached writes"),
        }
        out
    }

    /// Runs `f` against a cached view whose writes are always discarded.
    pub fn discarded<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let header = self.header;
        let mut cache = CacheStore::new(&mut *self.store);
        f(&mut Context::new(&mut cache, header))
    }
}
