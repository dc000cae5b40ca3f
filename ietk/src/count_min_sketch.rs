//! Count-min sketch.

use crate::hashing::hash64;

const DEFAULT_DEPTH: usize = 8;

/// Approximate frequency table.
///
/// Estimated counts are never smaller than the true counts.
pub struct CountMinSketch {
    width: usize,
    counts: Vec<Vec<u32>>,
}

impl CountMinSketch {
    /// Creates a sketch with 8 rows of `width` counters.
    pub fn new(width: usize) -> Self {
        Self::with_depth(width, DEFAULT_DEPTH)
    }

    pub fn with_depth(width: usize, depth: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            counts: vec![vec![0; width]; depth.max(1)],
        }
    }

    #[inline(always)]
    fn bucket(&self, item: &[u8], row: usize) -> usize {
        (hash64(item, row as u64) % self.width as u64) as usize
    }

    pub fn increment(&mut self, item: &str) {
        self.increment_by(item, 1);
    }

    pub fn increment_by(&mut self, item: &str, n: u32) {
        for row in 0..self.counts.len() {
            let b = self.bucket(item.as_bytes(), row);
            let c = &mut self.counts[row][b];
            *c = c.saturating_add(n);
        }
    }

    /// Returns the estimated count of `item`.
    pub fn count(&self, item: &str) -> u32 {
        (0..self.counts.len())
            .map(|row| self.counts[row][self.bucket(item.as_bytes(), row)])
            .min()
            .unwrap_or(0)
    }
}
