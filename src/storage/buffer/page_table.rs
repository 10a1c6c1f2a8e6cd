use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use log::trace;
use parking_lot::Mutex;

/// An extendible hash table with dynamic directory doubling.
///
/// The buffer pool instantiates this as its page table (page id → frame id).
/// The directory holds `2^global_depth` slots, each referring to a bucket
/// with a bounded entry list and a local depth; slot `i` refers to the
/// unique bucket whose low `local_depth` bits match `i`, so several slots
/// may share a bucket. Buckets split (and the directory doubles) on
/// overflow; they are never merged.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    global_depth: usize,
    bucket_size: usize,
    /// Directory of indices into `buckets`
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

struct Bucket<K, V> {
    local_depth: usize,
    entries: Vec<(K, V)>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Copy,
    V: Copy,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0);
        Self {
            inner: Mutex::new(Inner {
                global_depth: 0,
                bucket_size,
                dir: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    entries: Vec::new(),
                }],
            }),
        }
    }

    fn hash(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].local_depth
    }

    /// Number of live entries across all buckets
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let slot = Self::hash(key) & ((1 << inner.global_depth) - 1);
        let bucket = &inner.buckets[inner.dir[slot]];
        bucket
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    /// Insert or overwrite. A full bucket splits, which may cascade when
    /// every entry lands in the same half.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        loop {
            let slot = Self::hash(&key) & ((1 << inner.global_depth) - 1);
            let bucket_idx = inner.dir[slot];
            let bucket_size = inner.bucket_size;
            let bucket = &mut inner.buckets[bucket_idx];

            if let Some(entry) = bucket.entries.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.entries.len() < bucket_size {
                bucket.entries.push((key, value));
                return;
            }

            inner.split_bucket(bucket_idx);
        }
    }

    /// Remove the entry for `key`; returns true if it was present
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let slot = Self::hash(key) & ((1 << inner.global_depth) - 1);
        let bucket_idx = inner.dir[slot];
        let bucket = &mut inner.buckets[bucket_idx];
        if let Some(pos) = bucket.entries.iter().position(|(k, _)| k == key) {
            bucket.entries.swap_remove(pos);
            true
        } else {
            false
        }
    }
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Copy,
    V: Copy,
{
    /// Split the overflowing bucket: bump its local depth, keep the
    /// 0-pattern entries in place, move the 1-pattern entries to a new
    /// bucket, and rewire every directory slot that referred to the old
    /// bucket. Doubles the directory first when local depth equals global.
    fn split_bucket(&mut self, bucket_idx: usize) {
        let old_local = self.buckets[bucket_idx].local_depth;

        if old_local == self.global_depth {
            let len = self.dir.len();
            self.dir.extend_from_within(0..len);
            self.global_depth += 1;
            trace!("page table directory doubled to depth {}", self.global_depth);
        }

        let new_local = old_local + 1;
        let high_bit = 1 << old_local;

        let entries = std::mem::take(&mut self.buckets[bucket_idx].entries);
        let (stay, moved): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|(k, _)| ExtendibleHashTable::<K, V>::hash(k) & high_bit == 0);

        self.buckets[bucket_idx].local_depth = new_local;
        self.buckets[bucket_idx].entries = stay;

        let new_idx = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: new_local,
            entries: moved,
        });

        for slot in 0..self.dir.len() {
            if self.dir[slot] == bucket_idx && slot & high_bit != 0 {
                self.dir[slot] = new_idx;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let table: ExtendibleHashTable<u32, usize> = ExtendibleHashTable::new(4);

        for i in 0..32u32 {
            table.insert(i, (i * 10) as usize);
        }
        for i in 0..32u32 {
            assert_eq!(table.find(&i), Some((i * 10) as usize));
        }
        assert_eq!(table.find(&100), None);
        assert_eq!(table.len(), 32);

        assert!(table.remove(&5));
        assert!(!table.remove(&5));
        assert_eq!(table.find(&5), None);
        assert_eq!(table.len(), 31);
    }

    #[test]
    fn test_overwrite_existing_key() {
        let table: ExtendibleHashTable<u32, usize> = ExtendibleHashTable::new(2);
        table.insert(1, 10);
        table.insert(1, 20);
        assert_eq!(table.find(&1), Some(20));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_directory_grows_under_pressure() {
        let table: ExtendibleHashTable<u32, usize> = ExtendibleHashTable::new(1);
        for i in 0..64u32 {
            table.insert(i, i as usize);
        }
        assert!(table.global_depth() > 0);
        for i in 0..64u32 {
            assert_eq!(table.find(&i), Some(i as usize));
        }
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;
        let table: Arc<ExtendibleHashTable<u32, usize>> = Arc::new(ExtendibleHashTable::new(4));
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let table = table.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u32 {
                    let key = t * 100 + i;
                    table.insert(key, key as usize);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for key in 0..400u32 {
            assert_eq!(table.find(&key), Some(key as usize));
        }
    }
}
