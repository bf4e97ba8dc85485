//! Open-addressed Robin-Hood multimap with tombstone deletion.
//!
//! # Features
//!
//! - **Multimap semantics**: any number of entries may share a key; lookups
//!   resume from a probe-distance cursor, so all of them are reachable.
//! - **Robin-Hood displacement**: an insert that has probed farther than the
//!   bucket's current owner evicts it and keeps probing on its behalf.
//! - **Tombstone deletion**: a removed bucket keeps its hash so probe chains
//!   running through it stay intact.
//! - **One-way growth**: the table doubles when the load factor threshold is
//!   crossed and never shrinks.
//!
//! Values are meant to be small handles (indices, ids). The map owns the keys
//! it is given; looking anything up only ever needs `&K`.

#![warn(missing_docs)]
#![no_std]

extern crate alloc;

pub mod hash;

use alloc::vec::Vec;
use alloc::{boxed::Box, vec};
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;

use crate::hash::MurmurState;

/// Initial bucket count.
const INITIAL_SIZE: usize = 8;

/// Fraction of the table that may fill before it grows.
const DEFAULT_LOAD_FACTOR: f64 = 0.8;

/// Hash cell value of a bucket that has never held an entry.
const HASH_FREE: u32 = 0;

/// High bit marks a tombstone; the low 31 bits keep the evicted hash.
const HASH_DELETED_BIT: u32 = 0x8000_0000;

/// An open-addressed Robin-Hood multimap.
///
/// `S` supplies the hash function; the default [`MurmurState`] runs integer
/// keys through the MurmurHash3 finalizers and byte-region keys through the
/// full MurmurHash3 x86-32. The hash is truncated to 32 bits and sanitized so
/// it never collides with the free or tombstone encodings.
pub struct RhMap<K, V, S = MurmurState> {
    /// Bucket states. `HASH_FREE`, tombstone bit set, or a sanitized hash.
    hashes: Box<[u32]>,
    /// Key/value pairs of occupied buckets, `None` for free and tombstoned.
    slots: Box<[Option<(K, V)>]>,
    count: usize,
    threshold: usize,
    max_load_factor: f64,
    hasher: S,
}

impl<K: Hash + Eq, V> RhMap<K, V, MurmurState> {
    /// Creates an empty map with the default hasher and load factor.
    pub fn new() -> Self {
        Self::with_hasher(MurmurState)
    }

    /// Creates an empty map with the given load factor threshold.
    ///
    /// `max_load_factor` is a fraction between 0 and 1; passing `0.0` selects
    /// the default (0.8). Lower values trade memory for shorter probe chains.
    pub fn with_load_factor(max_load_factor: f64) -> Self {
        Self::with_load_factor_and_hasher(max_load_factor, MurmurState)
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> RhMap<K, V, S> {
    /// Creates an empty map with the given hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_load_factor_and_hasher(0.0, hasher)
    }

    /// Creates an empty map with the given load factor threshold and hasher.
    pub fn with_load_factor_and_hasher(max_load_factor: f64, hasher: S) -> Self {
        let max_load_factor = if max_load_factor == 0.0 {
            DEFAULT_LOAD_FACTOR
        } else {
            max_load_factor
        };

        Self {
            hashes: vec![HASH_FREE; INITIAL_SIZE].into_boxed_slice(),
            slots: empty_slots(INITIAL_SIZE),
            count: 0,
            threshold: threshold_for(INITIAL_SIZE, max_load_factor),
            max_load_factor,
            hasher,
        }
    }

    /// Number of entries in the map.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current bucket count. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.hashes.len()
    }

    #[inline(always)]
    fn index(&self, hash: u32, distance: usize) -> usize {
        (hash as usize + distance) & (self.hashes.len() - 1)
    }

    /// How far `hash` has travelled from its ideal bucket to land at `idx`.
    #[inline(always)]
    fn probe_distance(&self, idx: usize, hash: u32) -> usize {
        let size = self.hashes.len();
        (idx + size - (hash as usize & (size - 1))) & (size - 1)
    }

    /// Hashes a key and munges the result clear of the free and tombstone
    /// encodings.
    fn calc_hash(&self, key: &K) -> u32 {
        let mut hash = self.hasher.hash_one(key) as u32;
        hash &= !HASH_DELETED_BIT;
        if hash == HASH_FREE {
            hash = 1;
        }
        hash
    }

    /// Looks up an entry by key, resuming from `cursor`.
    ///
    /// `cursor` iterates over multiple entries with the same key: initialize
    /// it to 0 for the first call, then pass it back unchanged to get the
    /// next entry. `None` means the iteration is finished. The map must not
    /// be modified between resumed calls.
    pub fn lookup(&self, key: &K, cursor: &mut u32) -> Option<&V> {
        let hash = self.calc_hash(key);
        let size = self.hashes.len();
        let mut distance = *cursor as usize;

        while distance < size {
            let idx = self.index(hash, distance);
            let bucket_hash = self.hashes[idx];
            if bucket_hash == hash {
                if let Some((bucket_key, value)) = &self.slots[idx] {
                    if bucket_key == key {
                        *cursor = (distance + 1) as u32;
                        return Some(value);
                    }
                }
            } else if bucket_hash == HASH_FREE
                || (bucket_hash & HASH_DELETED_BIT == 0
                    && self.probe_distance(idx, bucket_hash) < distance)
            {
                // A shallower occupant means no entry of ours can live past
                // this bucket. Tombstones never short-circuit: a live entry
                // of our chain may sit beyond them.
                break;
            }
            distance += 1;
        }

        None
    }

    /// Returns the first entry found for `key`, if any.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut cursor = 0;
        self.lookup(key, &mut cursor)
    }

    /// Iterates over every value stored under `key`, in probe order.
    pub fn get_all<'a>(&'a self, key: &'a K) -> GetAll<'a, K, V, S> {
        GetAll {
            map: self,
            key,
            cursor: 0,
        }
    }

    /// Inserts an entry. Entries with equal keys accumulate; nothing is
    /// replaced.
    pub fn insert(&mut self, key: K, value: V) {
        if self.count >= self.threshold {
            self.grow();
        }

        let hash = self.calc_hash(&key);
        self.insert_with_hash(hash, key, value);
    }

    /// Placement loop shared by `insert` and `grow`. Uses the given hash and
    /// never grows.
    fn insert_with_hash(&mut self, mut hash: u32, mut key: K, mut value: V) {
        let size = self.hashes.len();
        let mut distance = 0;

        while distance < size {
            let idx = self.index(hash, distance);
            let bucket_hash = self.hashes[idx];
            let bucket_distance = self.probe_distance(idx, bucket_hash);
            let should_steal = distance > bucket_distance;

            if bucket_hash == HASH_FREE
                || (bucket_hash & HASH_DELETED_BIT != 0 && should_steal)
            {
                // A tombstone is only taken when we have out-probed it;
                // taking it earlier would cut off the chain it belonged to.
                self.hashes[idx] = hash;
                self.slots[idx] = Some((key, value));
                self.count += 1;
                return;
            } else if should_steal {
                // Swap with the current bucket owner and keep going to find
                // a new bucket for it.
                match self.slots[idx].replace((key, value)) {
                    Some((evicted_key, evicted_value)) => {
                        key = evicted_key;
                        value = evicted_value;
                    }
                    None => unreachable!("occupied bucket without a slot"),
                }
                self.hashes[idx] = hash;
                hash = bucket_hash;
                distance = bucket_distance;
            }

            distance += 1;
        }

        unreachable!("no free bucket below the load factor threshold");
    }

    /// Removes the entry holding exactly `value` under `key`.
    ///
    /// The entry must be present; removing an absent entry is a precondition
    /// violation and panics.
    pub fn remove(&mut self, key: &K, value: &V)
    where
        V: PartialEq,
    {
        let hash = self.calc_hash(key);
        let size = self.hashes.len();

        for distance in 0..size {
            let idx = self.index(hash, distance);
            if self.hashes[idx] == hash {
                if let Some((_, bucket_value)) = &self.slots[idx] {
                    if bucket_value == value {
                        self.hashes[idx] = hash | HASH_DELETED_BIT;
                        self.slots[idx] = None;
                        self.count -= 1;
                        return;
                    }
                }
            }
        }

        panic!("RhMap::remove: entry not present");
    }

    /// Doubles the table, re-inserting live entries with their stored hashes.
    fn grow(&mut self) {
        let new_size = self.hashes.len() * 2;

        let old_hashes = mem::replace(
            &mut self.hashes,
            vec![HASH_FREE; new_size].into_boxed_slice(),
        );
        let old_slots = mem::replace(&mut self.slots, empty_slots(new_size));

        self.count = 0;
        self.threshold = threshold_for(new_size, self.max_load_factor);

        for (&hash, slot) in old_hashes.iter().zip(old_slots.into_vec()) {
            if hash != HASH_FREE && hash & HASH_DELETED_BIT == 0 {
                if let Some((key, value)) = slot {
                    self.insert_with_hash(hash, key, value);
                }
            }
        }
    }

    /// Computes probe-chain statistics for diagnostics.
    pub fn stats(&self) -> MapStats {
        let mut distance_sum = 0.0;
        let mut distance_squared_sum = 0.0;

        for (idx, &bucket_hash) in self.hashes.iter().enumerate() {
            if bucket_hash != HASH_FREE && bucket_hash & HASH_DELETED_BIT == 0 {
                let distance = self.probe_distance(idx, bucket_hash) as f64;
                distance_sum += distance;
                distance_squared_sum += distance * distance;
            }
        }

        let count = self.count as f64;
        let (mean, variance) = if self.count == 0 {
            (0.0, 0.0)
        } else {
            (
                distance_sum / count,
                (distance_squared_sum - distance_sum * distance_sum / count) / count,
            )
        };

        MapStats {
            count: self.count,
            capacity: self.hashes.len(),
            load: count / self.hashes.len() as f64,
            mean_distance: mean,
            distance_variance: variance,
            memory_bytes: self.hashes.len()
                * (mem::size_of::<u32>() + mem::size_of::<Option<(K, V)>>()),
        }
    }
}

impl<K: Hash + Eq, V> Default for RhMap<K, V, MurmurState> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_slots<K, V>(size: usize) -> Box<[Option<(K, V)>]> {
    (0..size).map(|_| None).collect::<Vec<_>>().into_boxed_slice()
}

fn threshold_for(size: usize, max_load_factor: f64) -> usize {
    (size as f64 * max_load_factor) as usize
}

/// Iterator over every value stored under one key.
///
/// Returned by [`RhMap::get_all`]. Wraps the probe-distance cursor of
/// [`RhMap::lookup`]; the map must not be modified while iterating.
pub struct GetAll<'a, K, V, S> {
    map: &'a RhMap<K, V, S>,
    key: &'a K,
    cursor: u32,
}

impl<'a, K: Hash + Eq, V, S: BuildHasher> Iterator for GetAll<'a, K, V, S> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.map.lookup(self.key, &mut self.cursor)
    }
}

/// Probe-chain statistics, as reported by [`RhMap::stats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapStats {
    /// Live entry count.
    pub count: usize,
    /// Bucket count.
    pub capacity: usize,
    /// `count / capacity`.
    pub load: f64,
    /// Mean probe distance over live entries; 0 for an empty map.
    pub mean_distance: f64,
    /// Probe distance variance over live entries; 0 for an empty map.
    pub distance_variance: f64,
    /// Approximate heap footprint of the bucket arrays.
    pub memory_bytes: usize,
}

impl fmt::Display for MapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "count={} size={} load={:.6}",
            self.count, self.capacity, self.load
        )?;
        writeln!(f, "memory consumption: {} kilobytes", self.memory_bytes / 1024)?;
        writeln!(f, "mean={:.6}", self.mean_distance)?;
        write!(f, "variance={:.6}", self.distance_variance)
    }
}
