//! HashTable: separately chained buckets over an arena of entry nodes.

use crate::error::{Error, Result};
use crate::value::Value;
use core::fmt;
use slotmap::{new_key_type, SlotMap};
use std::collections::TryReserveError;

/// Bucket count used by [`HashTable::new`].
pub const DEFAULT_CAPACITY: usize = 100;

// Grow once `len / capacity >= 7 / 10`.
const MAX_LOAD_NUMERATOR: usize = 7;
const MAX_LOAD_DENOMINATOR: usize = 10;

new_key_type! {
    struct EntryKey;
}

#[derive(Debug)]
struct Entry {
    key: i64,
    value: Value,
    next: Option<EntryKey>,
}

/// An integer-keyed table of [`Value`]s with one collision chain per bucket.
///
/// Inserting a key that is already present appends a second entry instead of
/// replacing the first; lookups return the earliest one still stored.
#[derive(Debug)]
pub struct HashTable {
    buckets: Vec<Option<EntryKey>>, // chain heads
    entries: SlotMap<EntryKey, Entry>,
}

/// Maps a key to its bucket. Negative keys use the Euclidean remainder so the
/// result always lies in `0..capacity`.
#[inline]
fn bucket_for(key: i64, capacity: usize) -> usize {
    (i128::from(key).rem_euclid(capacity as i128)) as usize
}

impl HashTable {
    /// Creates an empty table with [`DEFAULT_CAPACITY`] buckets.
    pub fn new() -> Self {
        Self {
            buckets: vec![None; DEFAULT_CAPACITY],
            entries: SlotMap::with_key(),
        }
    }

    /// Creates an empty table with `capacity` buckets.
    ///
    /// Fails with [`Error::InvalidCapacity`] when `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }
        Ok(Self {
            buckets: vec![None; capacity],
            entries: SlotMap::with_key(),
        })
    }

    /// Like [`HashTable::with_capacity`], but reports a bucket array that
    /// cannot be allocated instead of aborting. `capacity` must be non-zero.
    pub(crate) fn try_with_capacity(capacity: usize) -> core::result::Result<Self, TryReserveError> {
        debug_assert!(capacity > 0);
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(capacity)?;
        buckets.resize(capacity, None);
        Ok(Self {
            buckets,
            entries: SlotMap::with_key(),
        })
    }

    /// Number of live entries, duplicates included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Live entries per bucket.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Bucket that `key` hashes to under the current capacity.
    pub fn bucket_index(&self, key: i64) -> usize {
        bucket_for(key, self.capacity())
    }

    /// Appends `key -> value` to the tail of its bucket's chain, then grows
    /// the table if the load factor reached its limit.
    pub fn insert(&mut self, key: i64, value: Value) {
        let slot = self.bucket_index(key);
        let tail = self.tail_of(slot);
        let node = self.entries.insert(Entry {
            key,
            value,
            next: None,
        });
        match tail {
            Some(t) => self.entries[t].next = Some(node),
            None => self.buckets[slot] = Some(node),
        }
        self.grow_if_needed();
    }

    /// First value stored under `key`, in insertion order.
    pub fn lookup(&self, key: i64) -> Option<&Value> {
        self.bucket(self.bucket_index(key))
            .find(|&(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether at least one entry is stored under `key`.
    pub fn contains_key(&self, key: i64) -> bool {
        self.lookup(key).is_some()
    }

    /// Every value stored under `key`, oldest first.
    pub fn lookup_all(&self, key: i64) -> impl Iterator<Item = &Value> + '_ {
        self.bucket(self.bucket_index(key))
            .filter(move |&(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Unlinks the first entry stored under `key` and returns its value.
    pub fn delete(&mut self, key: i64) -> Option<Value> {
        let slot = self.bucket_index(key);
        let mut prev: Option<EntryKey> = None;
        let mut cur = self.buckets[slot];
        while let Some(k) = cur {
            let entry = &self.entries[k];
            if entry.key == key {
                let next = entry.next;
                match prev {
                    Some(p) => self.entries[p].next = next,
                    None => self.buckets[slot] = next,
                }
                return self.entries.remove(k).map(|e| e.value);
            }
            prev = Some(k);
            cur = entry.next;
        }
        None
    }

    /// Drops every entry; the capacity is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.fill(None);
    }

    /// Entries of bucket `index` in chain order. Out-of-range buckets are empty.
    pub fn bucket(&self, index: usize) -> Chain<'_> {
        Chain {
            entries: &self.entries,
            cur: self.buckets.get(index).copied().flatten(),
        }
    }

    /// All entries as `(bucket, key, value)`, by ascending bucket then chain order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            bucket: 0,
            chain: self.bucket(0),
        }
    }

    fn tail_of(&self, slot: usize) -> Option<EntryKey> {
        let mut cur = self.buckets[slot]?;
        while let Some(next) = self.entries[cur].next {
            cur = next;
        }
        Some(cur)
    }

    fn over_max_load(&self) -> bool {
        self.len().saturating_mul(MAX_LOAD_DENOMINATOR)
            >= self.capacity().saturating_mul(MAX_LOAD_NUMERATOR)
    }

    fn grow_if_needed(&mut self) {
        while self.over_max_load() {
            let doubled = self
                .capacity()
                .checked_mul(2)
                .expect("hash table capacity overflow");
            self.resize(doubled);
        }
    }

    /// Re-links every node into a fresh bucket array of `new_capacity`.
    /// Nodes stay in the arena; only links move. Relative chain order is kept,
    /// so duplicates of a key still resolve oldest first.
    fn resize(&mut self, new_capacity: usize) {
        let old_capacity = self.capacity();
        let old = std::mem::replace(&mut self.buckets, vec![None; new_capacity]);
        let mut tails: Vec<Option<EntryKey>> = vec![None; new_capacity];

        for head in old {
            let mut cur = head;
            while let Some(k) = cur {
                let (key, next) = {
                    let e = &mut self.entries[k];
                    (e.key, e.next.take())
                };
                let slot = bucket_for(key, new_capacity);
                match tails[slot] {
                    Some(t) => self.entries[t].next = Some(k),
                    None => self.buckets[slot] = Some(k),
                }
                tails[slot] = Some(k);
                cur = next;
            }
        }

        log::trace!(
            "Resized hash table from {old_capacity} to {new_capacity} buckets ({} entries)",
            self.len()
        );
    }
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one collision chain.
pub struct Chain<'a> {
    entries: &'a SlotMap<EntryKey, Entry>,
    cur: Option<EntryKey>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (i64, &'a Value);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let e = self.entries.get(self.cur?)?;
        self.cur = e.next;
        Some((e.key, &e.value))
    }
}

/// Iterator over every entry in bucket order.
pub struct Iter<'a> {
    table: &'a HashTable,
    bucket: usize,
    chain: Chain<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (usize, i64, &'a Value);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.chain.next() {
                return Some((self.bucket, k, v));
            }
            self.bucket += 1;
            if self.bucket >= self.table.capacity() {
                return None;
            }
            self.chain = self.table.bucket(self.bucket);
        }
    }
}

impl<'a> IntoIterator for &'a HashTable {
    type Item = (usize, i64, &'a Value);
    type IntoIter = Iter<'a>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Dump of occupied buckets: `(len/capacity):` then `\t[i]: (k, v) ...` per line.
impl fmt::Display for HashTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "({}/{}):", self.len(), self.capacity())?;
        for i in 0..self.capacity() {
            let mut chain = self.bucket(i).peekable();
            if chain.peek().is_none() {
                continue;
            }
            write!(f, "\t[{i}]: ")?;
            for (k, v) in chain {
                write!(f, "({k}, {v}) ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
