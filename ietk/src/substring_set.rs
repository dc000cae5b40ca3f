//! Approximate substring set.

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};

/// Marks the start or the end of a word in a registered substring.
pub const ANCHOR: u8 = b'*';

/// Only this many leading bytes of a query are searched.
pub const MAX_QUERY_LEN: usize = 50;

const DEFAULT_BITS: u32 = 13;
const INIT_HASH: u32 = 0xFFFF_FFFF;
const EMPTY: u32 = u32::MAX;

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

#[inline(always)]
fn add_to_hash(h: u32, byte: u8) -> u32 {
    (h >> 8) ^ CRC_TABLE[((h ^ u32::from(byte)) & 0xFF) as usize]
}

/// A probabilistic membership oracle for a bag of substrings.
///
/// Each bucket stores the high bits of the CRC-32 hash of the last substring inserted into it.
/// Later insertions may evict earlier ones, and unrelated substrings may collide with a
/// registered one. A `*` at the start or end of a registered substring anchors it to the start
/// or end of the searched word.
#[derive(Clone, Debug, Decode, Encode)]
pub struct ApproximateSubstringSet {
    mask_bits: u32,
    max_substr_len: u32,
    tags: Vec<u32>,
}

impl Default for ApproximateSubstringSet {
    fn default() -> Self {
        Self::with_bits(DEFAULT_BITS)
    }
}

impl ApproximateSubstringSet {
    /// Creates an empty set with 8192 buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with `2^bits` buckets.
    ///
    /// # Panics
    ///
    /// `bits` must be in `1..=24`.
    pub fn with_bits(bits: u32) -> Self {
        assert!((1..=24).contains(&bits), "bits must be in 1..=24");
        Self {
            mask_bits: bits,
            max_substr_len: 0,
            tags: vec![EMPTY; 1 << bits],
        }
    }

    #[inline(always)]
    fn mask(&self) -> u32 {
        (1 << self.mask_bits) - 1
    }

    /// Inserts a substring and returns its bucket ID.
    ///
    /// # Errors
    ///
    /// An error variant will be returned if `s` is empty.
    pub fn add(&mut self, s: &str) -> Result<u32> {
        if s.is_empty() {
            return Err(IetkError::invalid_argument(
                "s",
                "substrings must not be empty",
            ));
        }
        let h = s.bytes().fold(INIT_HASH, add_to_hash);
        let len = u32::try_from(s.len())?;
        if len > self.max_substr_len {
            self.max_substr_len = len;
        }
        let bucket = h & self.mask();
        self.tags[bucket as usize] = h >> self.mask_bits;
        Ok(bucket)
    }

    /// Returns the largest ID this set can return.
    pub fn max_id(&self) -> u32 {
        self.mask()
    }

    /// Returns the number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.tags.len()
    }

    /// Returns the length of the longest substring inserted so far.
    pub fn max_substring_len(&self) -> usize {
        self.max_substr_len as usize
    }

    #[inline(always)]
    fn check(&self, h: u32, hits: &mut Vec<u32>) {
        let bucket = h & self.mask();
        if self.tags[bucket as usize] == h >> self.mask_bits {
            hits.push(bucket);
        }
    }

    /// Finds IDs of registered substrings contained in `text`.
    ///
    /// The result is sorted and contains no duplicates.
    pub fn find(&self, text: &str) -> Vec<u32> {
        let mut hits = vec![];
        self.find_into(text, &mut hits);
        hits
    }

    /// Same as [`Self::find()`], but reuses the caller's buffer.
    pub fn find_into(&self, text: &str, hits: &mut Vec<u32>) {
        hits.clear();
        let bytes = text.as_bytes();
        let bytes = &bytes[..bytes.len().min(MAX_QUERY_LEN)];
        let n = bytes.len();
        if n == 0 {
            return;
        }

        // partial[s] holds the hash of bytes[s..s + len].
        let mut partial = [INIT_HASH; MAX_QUERY_LEN];
        let mut prefix = add_to_hash(INIT_HASH, ANCHOR);
        let max_len = n.min(self.max_substr_len as usize);
        for len in 1..=max_len {
            prefix = add_to_hash(prefix, bytes[len - 1]);
            self.check(prefix, hits);
            if len == n {
                self.check(add_to_hash(prefix, ANCHOR), hits);
            }
            for s in 0..=n - len {
                partial[s] = add_to_hash(partial[s], bytes[s + len - 1]);
                self.check(partial[s], hits);
            }
            self.check(add_to_hash(partial[n - len], ANCHOR), hits);
        }
        hits.sort_unstable();
        hits.dedup();
    }

    /// Returns the fraction of queries for which [`Self::find()`] reports at least one of the
    /// expected IDs.
    ///
    /// Queries without expected IDs are ignored. Returns 1 if no query is left.
    pub fn measure_recall<'a, I>(&self, queries: I) -> f64
    where
        I: IntoIterator<Item = (&'a str, &'a [u32])>,
    {
        let mut hits = vec![];
        let mut num_queries = 0;
        let mut num_found = 0;
        for (text, expected) in queries {
            if expected.is_empty() {
                continue;
            }
            num_queries += 1;
            self.find_into(text, &mut hits);
            if expected.iter().any(|id| hits.binary_search(id).is_ok()) {
                num_found += 1;
            }
        }
        if num_queries == 0 {
            1.0
        } else {
            f64::from(num_found) / f64::from(num_queries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_empty() {
        let mut set = ApproximateSubstringSet::new();
        assert_eq!(
            "InvalidArgumentError: s: substrings must not be empty",
            set.add("").unwrap_err().to_string()
        );
    }

    #[test]
    fn test_find_unanchored() {
        let mut set = ApproximateSubstringSet::new();
        let id = set.add("ing").unwrap();
        assert!(id <= set.max_id());
        assert!(set.find("walking").contains(&id));
        assert!(set.find("ingot").contains(&id));
        assert!(!set.find("walk").contains(&id));
    }

    #[test]
    fn test_find_anchored() {
        let mut set = ApproximateSubstringSet::new();
        let prefix = set.add("*un").unwrap();
        let suffix = set.add("ed*").unwrap();
        let whole = set.add("*cat*").unwrap();

        assert!(set.find("undo").contains(&prefix));
        assert!(!set.find("fun").contains(&prefix));
        assert!(set.find("walked").contains(&suffix));
        assert!(!set.find("editor").contains(&suffix));
        assert!(set.find("cat").contains(&whole));
        assert!(!set.find("cats").contains(&whole));
    }

    #[test]
    fn test_find_respects_max_length() {
        let mut set = ApproximateSubstringSet::new();
        set.add("ab").unwrap();
        assert_eq!(2, set.max_substring_len());
        let mut hits = vec![];
        set.find_into("", &mut hits);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_find_query_cap() {
        let mut set = ApproximateSubstringSet::new();
        let id = set.add("zz").unwrap();
        let mut text = "a".repeat(MAX_QUERY_LEN);
        text.push_str("zz");
        assert!(!set.find(&text).contains(&id));
    }

    #[test]
    fn test_find_sorted_unique() {
        let mut set = ApproximateSubstringSet::new();
        set.add("a").unwrap();
        set.add("b").unwrap();
        let hits = set.find("abababab");
        let mut expected = hits.clone();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(expected, hits);
        assert_eq!(2, hits.len());
    }

    #[test]
    fn test_measure_recall() {
        let mut set = ApproximateSubstringSet::new();
        let ing = set.add("ing*").unwrap();
        let un = set.add("*un").unwrap();
        let queries: Vec<(&str, Vec<u32>)> = vec![
            ("walking", vec![ing]),
            ("undo", vec![un]),
            ("ingot", vec![ing]),
            ("cat", vec![]),
        ];
        let recall =
            set.measure_recall(queries.iter().map(|(q, ids)| (*q, ids.as_slice())));
        assert!((recall - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ids_below_bucket_count() {
        let mut set = ApproximateSubstringSet::with_bits(4);
        for w in ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"] {
            for id in set.find(w) {
                assert!(id <= set.max_id());
            }
            assert!(set.add(w).unwrap() < 16);
        }
        assert_eq!(15, set.max_id());
        assert_eq!(16, set.num_buckets());
    }
}
