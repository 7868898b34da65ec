use std::collections::HashMap;
use std::hash::Hash;
use parking_lot::Mutex;

use crate::common::types::{PageId, Rid};

/// Stable hash used for directory addressing. Bucket placement depends on
/// the low bits of this value, so it must not vary between runs; integer
/// keys hash to themselves.
pub trait StableHash {
    fn stable_hash(&self) -> usize;
}

impl StableHash for i32 {
    fn stable_hash(&self) -> usize {
        *self as u32 as usize
    }
}

impl StableHash for u32 {
    fn stable_hash(&self) -> usize {
        *self as usize
    }
}

impl StableHash for i64 {
    fn stable_hash(&self) -> usize {
        *self as u64 as usize
    }
}

impl StableHash for usize {
    fn stable_hash(&self) -> usize {
        *self
    }
}

impl StableHash for Rid {
    fn stable_hash(&self) -> usize {
        (self.page_id as u32 as usize) << 16 ^ self.slot_num as usize
    }
}

struct Bucket<K, V> {
    /// Canonical directory slot: the low `local_depth` bits shared by every
    /// slot that references this bucket.
    id: usize,
    local_depth: usize,
    items: HashMap<K, V>,
}

impl<K, V> Bucket<K, V> {
    fn new(id: usize, local_depth: usize) -> Self {
        Self {
            id,
            local_depth,
            items: HashMap::new(),
        }
    }
}

struct Directory<K, V> {
    global_depth: usize,
    /// Bucket arena; directory slots hold indices into it.
    buckets: Vec<Bucket<K, V>>,
    slots: Vec<usize>,
}

/// In-memory extendible hash table. The buffer pool uses it as its page
/// table (PageId -> FrameId); splitting grows the directory, removal never
/// shrinks it. Thread-safe through a single mutex.
pub struct ExtendibleHashTable<K, V> {
    bucket_capacity: usize,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone + StableHash,
    V: Clone,
{
    pub fn new(bucket_capacity: usize) -> Self {
        assert!(bucket_capacity > 0);
        let inner = Directory {
            global_depth: 1,
            buckets: vec![Bucket::new(0, 1), Bucket::new(1, 1)],
            slots: vec![0, 1],
        };
        Self {
            bucket_capacity,
            inner: Mutex::new(inner),
        }
    }

    fn slot_of(key: &K, global_depth: usize) -> usize {
        key.stable_hash() & ((1 << global_depth) - 1)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let slot = Self::slot_of(key, inner.global_depth);
        inner.buckets[inner.slots[slot]].items.get(key).cloned()
    }

    /// Insert or replace. A full target bucket is split (doubling the
    /// directory when its local depth has caught up with the global depth)
    /// until the key fits; one split can be insufficient when every resident
    /// key shares the new low bits.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        loop {
            let slot = Self::slot_of(&key, inner.global_depth);
            let bucket_idx = inner.slots[slot];
            let bucket = &mut inner.buckets[bucket_idx];
            if bucket.items.contains_key(&key) || bucket.items.len() < self.bucket_capacity {
                bucket.items.insert(key, value);
                return;
            }
            Self::split(&mut inner, bucket_idx);
        }
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let slot = Self::slot_of(key, inner.global_depth);
        let bucket_idx = inner.slots[slot];
        inner.buckets[bucket_idx].items.remove(key).is_some()
    }

    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket at a directory slot; None for slots past
    /// the directory or holding an empty bucket.
    pub fn local_depth(&self, slot: usize) -> Option<usize> {
        let inner = self.inner.lock();
        if slot >= inner.slots.len() {
            return None;
        }
        let bucket = &inner.buckets[inner.slots[slot]];
        if bucket.items.is_empty() {
            None
        } else {
            Some(bucket.local_depth)
        }
    }

    /// Count of distinct occupied buckets, identified by the slot that
    /// matches their canonical id.
    pub fn num_buckets(&self) -> usize {
        let inner = self.inner.lock();
        (0..inner.slots.len())
            .filter(|&slot| {
                let bucket = &inner.buckets[inner.slots[slot]];
                bucket.id == slot && !bucket.items.is_empty()
            })
            .count()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.buckets.iter().map(|b| b.items.len()).sum()
    }

    /// Snapshot of every (key, value) pair.
    pub fn entries(&self) -> Vec<(K, V)> {
        let inner = self.inner.lock();
        inner
            .buckets
            .iter()
            .flat_map(|b| b.items.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split(inner: &mut Directory<K, V>, bucket_idx: usize) {
        if inner.buckets[bucket_idx].local_depth == inner.global_depth {
            // Double the directory; each new slot aliases the slot one old
            // directory length below it.
            let old_len = inner.slots.len();
            for s in 0..old_len {
                let alias = inner.slots[s];
                inner.slots.push(alias);
            }
            inner.global_depth += 1;
        }

        let old_id = inner.buckets[bucket_idx].id;
        inner.buckets[bucket_idx].local_depth += 1;
        let new_depth = inner.buckets[bucket_idx].local_depth;
        let new_id = old_id + (1 << (new_depth - 1));

        let new_idx = inner.buckets.len();
        inner.buckets.push(Bucket::new(new_id, new_depth));

        // Every slot whose low new_depth bits equal new_id must reference
        // the sibling, not just the canonical slot; local depth can still
        // trail global depth.
        let mask = (1 << new_depth) - 1;
        for s in 0..inner.slots.len() {
            if s & mask == new_id {
                inner.slots[s] = new_idx;
            }
        }

        let (moved, kept): (HashMap<K, V>, HashMap<K, V>) = inner.buckets[bucket_idx]
            .items
            .drain()
            .partition(|(k, _)| k.stable_hash() & mask == new_id);
        inner.buckets[bucket_idx].items = kept;
        inner.buckets[new_idx].items = moved;
    }
}


// The page table instantiation used by the buffer pool.
pub type PageTable = ExtendibleHashTable<PageId, crate::common::types::FrameId>;
