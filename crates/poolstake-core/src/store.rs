//! Ordered key-value store and its cached (write-buffered) view.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Ordered byte-keyed storage.
///
/// Iteration results are returned in ascending key order.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Entries with `start <= key < end`; `end = None` is unbounded above.
    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// Entries whose key starts with `prefix`.
    fn prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        match prefix_end(prefix) {
            Some(end) => self.range(prefix, Some(&end)),
            None => self.range(prefix, None),
        }
    }
}

/// Smallest key strictly greater than every key with the given prefix, if one exists.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn bounds<'a>(start: &'a [u8], end: Option<&'a [u8]>) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
    match end {
        Some(e) if e <= start => None,
        Some(e) => Some((Bound::Included(start), Bound::Excluded(e))),
        None => Some((Bound::Included(start), Bound::Unbounded)),
    }
}

/// In-memory store backed by an ordered map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    fn has(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let Some(b) = bounds(start, end) else {
            return Vec::new();
        };
        self.data
            .range::<[u8], _>(b)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Write-buffered view over a parent store.
///
/// Reads fall through to the parent unless shadowed by a buffered write. Buffered writes
/// reach the parent only through [`CacheStore::write`]; dropping the cache discards them.
pub struct CacheStore<'a> {
    parent: &'a mut dyn KvStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Number of buffered writes (sets and deletes).
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Flushes buffered writes into the parent.
    pub fn write(self) {
        for (key, value) in self.writes {
            match value {
                Some(v) => self.parent.set(key, v),
                None => self.parent.delete(&key),
            }
        }
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(buffered) => buffered.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let Some(b) = bounds(start, end) else {
            return Vec::new();
        };
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.range(start, end).into_iter().collect();
        for (k, v) in self.writes.range::<[u8], _>(b) {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        merged.into_iter().collect()
    }
}
