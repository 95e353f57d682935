//! One buffering epoch of a batch buffer.

use crate::core::Fingerprint;
use ahash::AHashMap;
use std::time::Instant;

/// Rows accepted between two swaps, grouped by fingerprint.
///
/// Once swapped out of the buffer a generation is owned by the flush worker
/// alone; nothing can append to it anymore.
#[derive(Debug)]
pub struct Generation<T> {
    rows: AHashMap<Fingerprint, Vec<T>>,
    len: usize,
    sequence: u64,
    opened_at: Instant,
}

impl<T> Generation<T> {
    pub(crate) fn new(sequence: u64) -> Self {
        Self {
            rows: AHashMap::new(),
            len: 0,
            sequence,
            opened_at: Instant::now(),
        }
    }

    /// Appends a row to its key's list, keeping insertion order.
    #[inline]
    pub(crate) fn push(&mut self, key: Fingerprint, row: T) {
        self.rows.entry(key).or_default().push(row);
        self.len += 1;
    }

    /// Total rows across all keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.rows.len()
    }

    /// Monotonic generation number within its buffer
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since the generation started accepting rows
    pub fn age(&self) -> std::time::Duration {
        self.opened_at.elapsed()
    }

    /// Rows buffered for one key, in insertion order
    pub fn rows_for(&self, key: Fingerprint) -> &[T] {
        self.rows.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Consumes the generation into per-key batches.
    pub fn into_batches(self) -> impl Iterator<Item = (Fingerprint, Vec<T>)> {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_groups_by_key_in_order() {
        let mut generation = Generation::new(3);
        let a = Fingerprint::from_u64(1);
        let b = Fingerprint::from_u64(2);

        generation.push(a, "a1");
        generation.push(b, "b1");
        generation.push(a, "a2");

        assert_eq!(generation.len(), 3);
        assert_eq!(generation.key_count(), 2);
        assert_eq!(generation.sequence(), 3);
        assert_eq!(generation.rows_for(a), &["a1", "a2"]);
        assert_eq!(generation.rows_for(b), &["b1"]);
        assert!(generation.rows_for(Fingerprint::from_u64(9)).is_empty());
    }

    #[test]
    fn test_into_batches() {
        let mut generation = Generation::new(0);
        assert!(generation.is_empty());
        for i in 0..4u64 {
            generation.push(Fingerprint::from_u64(i % 2), i);
        }

        let mut batches: Vec<_> = generation.into_batches().collect();
        batches.sort_by_key(|(k, _)| *k);
        assert_eq!(
            batches,
            vec![
                (Fingerprint::from_u64(0), vec![0, 2]),
                (Fingerprint::from_u64(1), vec![1, 3]),
            ]
        );
    }
}
