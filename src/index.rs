use anyhow::{Result, bail};
use std::collections::{BTreeMap, btree_map};

use crate::bucket::Bucket;

pub const DEFAULT_BUCKET_SIZE: usize = 1000;

/// Sparse set of enabled `u64` keys.
///
/// Keys are grouped into buckets of `bucket_size` flags. A bucket is allocated
/// the first time any key in its range is written and is kept afterwards, even
/// if every flag in it is cleared again.
///
/// `count` is adjusted by one on every write: `+1` for `set(key, true)` and
/// `-1` for `set(key, false)`, whatever the key held before. Repeated enables
/// of one key count more than once and disabling an untouched key drives the
/// count below zero. Use [`BitmapIndex::enabled_keys`] when the exact number
/// of enabled keys matters.
#[derive(Clone, Debug)]
pub struct BitmapIndex {
    buckets: BTreeMap<u64, Bucket>,
    bucket_size: usize,
    count: i64,
}

impl Default for BitmapIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::with_bucket_size(DEFAULT_BUCKET_SIZE)
    }

    /// # Panics
    ///
    /// Panics if `bucket_size` is zero.
    #[must_use]
    pub fn with_bucket_size(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be non-zero");
        Self {
            buckets: BTreeMap::new(),
            bucket_size,
            count: 0,
        }
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn try_with_bucket_size(bucket_size: usize) -> Result<Self> {
        if bucket_size == 0 {
            bail!("bucket size must be non-zero");
        }
        Ok(Self::with_bucket_size(bucket_size))
    }

    #[must_use]
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Number of allocated buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn get(&self, key: u64) -> bool {
        let (bucket_index, pos) = self.locate(key);
        self.buckets
            .get(&bucket_index)
            .is_some_and(|bucket| bucket.get(pos))
    }

    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.get(key)
    }

    pub fn set(&mut self, key: u64, value: bool) {
        self.count += if value { 1 } else { -1 };
        let (bucket_index, pos) = self.locate(key);
        let bucket_size = self.bucket_size;
        self.buckets
            .entry(bucket_index)
            .or_insert_with(|| Bucket::new(bucket_size))
            .set(pos, value);
    }

    pub fn enable(&mut self, key: u64) {
        self.set(key, true);
    }

    pub fn disable(&mut self, key: u64) {
        self.set(key, false);
    }

    /// Clears `key`. Storage is kept.
    pub fn delete(&mut self, key: u64) {
        self.disable(key);
    }

    #[must_use]
    pub fn count(&self) -> i64 {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Enabled keys in ascending order. Each call starts a fresh traversal.
    #[must_use]
    pub fn enabled_keys(&self) -> EnabledKeys<'_> {
        EnabledKeys {
            buckets: self.buckets.iter(),
            bucket_size: self.bucket_size as u64,
            current: None,
        }
    }

    #[must_use]
    pub fn to_list(&self) -> Vec<u64> {
        self.enabled_keys().collect()
    }

    #[must_use]
    pub fn ints(&self) -> Vec<u64> {
        self.to_list()
    }

    // Position is below `bucket_size`, so it always fits in a usize.
    #[allow(clippy::cast_possible_truncation)]
    fn locate(&self, key: u64) -> (u64, usize) {
        let bucket_size = self.bucket_size as u64;
        (key / bucket_size, (key % bucket_size) as usize)
    }
}

impl Extend<u64> for BitmapIndex {
    fn extend<T: IntoIterator<Item = u64>>(&mut self, keys: T) {
        for key in keys {
            self.enable(key);
        }
    }
}

impl FromIterator<u64> for BitmapIndex {
    fn from_iter<T: IntoIterator<Item = u64>>(keys: T) -> Self {
        let mut index = Self::new();
        index.extend(keys);
        index
    }
}

pub struct EnabledKeys<'a> {
    buckets: btree_map::Iter<'a, u64, Bucket>,
    bucket_size: u64,
    // (first key of the bucket, bucket, next position to look at)
    current: Option<(u64, &'a Bucket, usize)>,
}

impl Iterator for EnabledKeys<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            if let Some((base, bucket, next_pos)) = &mut self.current
                && let Some(pos) = bucket.next_enabled(*next_pos)
            {
                *next_pos = pos + 1;
                return Some(*base + pos as u64);
            }
            let (&bucket_index, bucket) = self.buckets.next()?;
            self.current = Some((bucket_index * self.bucket_size, bucket, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_touched_keys_are_false_and_allocate_nothing() {
        let index = BitmapIndex::new();
        assert!(!index.get(0));
        assert!(!index.contains(5));
        assert!(!index.get(u64::MAX));
        assert_eq!(index.bucket_count(), 0);
        assert_eq!(index.count(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn set_then_get() {
        let mut index = BitmapIndex::new();
        index.set(0, true);
        assert!(index.get(0));
        assert!(!index.get(1));

        index.set(0, false);
        assert!(!index.get(0));
        assert_eq!(index.bucket_count(), 1);
    }

    #[test]
    fn enable_disable_delete() {
        let mut index = BitmapIndex::new();
        index.enable(42);
        assert!(index.contains(42));
        index.disable(42);
        assert!(!index.contains(42));
        index.enable(42);
        index.delete(42);
        assert!(!index.contains(42));
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn count_follows_distinct_enables() {
        let mut index = BitmapIndex::new();
        for (n, key) in [1, 5, 7, 8, 10].into_iter().enumerate() {
            index.enable(key);
            assert_eq!(index.count(), n as i64 + 1);
        }
    }

    #[test]
    fn count_moves_on_every_write() {
        let mut index = BitmapIndex::new();
        index.enable(3);
        index.enable(3);
        assert_eq!(index.count(), 2);
        assert_eq!(index.to_list(), vec![3]);

        let mut index = BitmapIndex::new();
        index.disable(0);
        assert_eq!(index.count(), -1);
        assert!(!index.is_empty());
        // the write still allocates the bucket
        assert_eq!(index.bucket_count(), 1);

        let mut index = BitmapIndex::new();
        index.delete(17);
        assert_eq!(index.count(), -1);
    }

    #[test]
    fn keys_across_a_bucket_boundary() {
        let mut index = BitmapIndex::new();
        let size = index.bucket_size() as u64;
        for key in size - 5..size + 5 {
            index.set(key, true);
        }
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.to_list(), (size - 5..size + 5).collect::<Vec<_>>());
    }

    #[test]
    fn to_list_is_ascending() {
        let mut index = BitmapIndex::new();
        for key in [10, 1, 8, 5, 7] {
            index.enable(key);
        }
        let ints = index.ints();
        assert_eq!(ints, vec![1, 5, 7, 8, 10]);
        assert_eq!(ints.len(), 5);
    }

    #[test]
    fn enabled_keys_walk_buckets_in_order() {
        let mut index = BitmapIndex::with_bucket_size(4);
        for key in [1_000_003, 9, 0, 4, 3, 77] {
            index.enable(key);
        }
        index.disable(4);
        let expected = vec![0, 3, 9, 77, 1_000_003];
        assert_eq!(index.enabled_keys().collect::<Vec<_>>(), expected);
        // restartable
        assert_eq!(index.enabled_keys().collect::<Vec<_>>(), expected);
        assert_eq!(index.bucket_count(), 5);
    }

    #[test]
    fn large_keys() {
        let mut index = BitmapIndex::new();
        index.enable(u64::MAX);
        index.enable(u64::MAX - 1);
        assert!(index.get(u64::MAX));
        assert_eq!(index.to_list(), vec![u64::MAX - 1, u64::MAX]);
    }

    #[test]
    fn bucket_size_must_be_positive() {
        assert!(BitmapIndex::try_with_bucket_size(0).is_err());
        let index = BitmapIndex::try_with_bucket_size(64).unwrap();
        assert_eq!(index.bucket_size(), 64);
    }

    #[test]
    #[should_panic(expected = "bucket size must be non-zero")]
    fn zero_bucket_size_panics() {
        let _ = BitmapIndex::with_bucket_size(0);
    }

    #[test]
    fn collect_and_extend() {
        let mut index: BitmapIndex = [5, 2, 2000].into_iter().collect();
        index.extend([1, 3]);
        assert_eq!(index.to_list(), vec![1, 2, 3, 5, 2000]);
        assert_eq!(index.count(), 5);
    }
}
