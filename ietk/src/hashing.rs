//! Seeded hashing used by feature expansion and fingerprints.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::utils::SparseVector;

// Mixed into the seed of the second half of a 128-bit hash.
const HIGH_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Weight magnitude of a hashed feature.
pub const HASHED_FEATURE_WEIGHT: f64 = 1.5;

/// Computes a 128-bit hash of `data` as `(low64, high64)`.
#[inline]
pub fn hash128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut low = XxHash64::with_seed(seed);
    low.write(data);
    let mut high = XxHash64::with_seed(seed ^ HIGH_SEED_SALT);
    high.write(data);
    (low.finish(), high.finish())
}

/// Computes a 64-bit hash of `data`.
#[inline]
pub fn hash64(data: &[u8], seed: u64) -> u64 {
    let mut h = XxHash64::with_seed(seed);
    h.write(data);
    h.finish()
}

/// Combines two hash values into one.
#[inline]
pub fn combine(a: u64, b: u64) -> u64 {
    let mut h = XxHash64::with_seed(a);
    h.write_u64(b);
    h.finish()
}

/// Maps a 128-bit hash to a signed feature.
///
/// The index is `low64 mod num_dims` and the sign comes from the top bit of `high64`.
#[inline]
pub fn signed_feature(hash: (u64, u64), num_dims: u32) -> (u32, f64) {
    let idx = (hash.0 % u64::from(num_dims)) as u32;
    if hash.1 >> 63 == 0 {
        (idx, HASHED_FEATURE_WEIGHT)
    } else {
        (idx, -HASHED_FEATURE_WEIGHT)
    }
}

/// Collects signed hashed features into a sparse vector.
#[derive(Debug)]
pub struct FeatureHasher {
    num_dims: u32,
    feats: SparseVector,
}

impl FeatureHasher {
    pub fn new(num_dims: u32) -> Self {
        Self {
            num_dims,
            feats: vec![],
        }
    }

    /// Adds the feature of the string `s` in the family `seed`.
    #[inline]
    pub fn add(&mut self, s: &str, seed: u64) {
        self.add_bytes(s.as_bytes(), seed);
    }

    #[inline]
    pub fn add_bytes(&mut self, data: &[u8], seed: u64) {
        self.feats
            .push(signed_feature(hash128(data, seed), self.num_dims));
    }

    /// Adds an indicator feature that has no string payload.
    #[inline]
    pub fn add_indicator(&mut self, seed: u64) {
        self.add_bytes(&[], seed);
    }

    /// Adds a feature from a precomputed hash value.
    #[inline]
    pub fn add_hash(&mut self, value: u64, seed: u64) {
        self.add_bytes(&value.to_le_bytes(), seed);
    }

    pub fn num_dims(&self) -> u32 {
        self.num_dims
    }

    /// Returns the collected features, unsorted and possibly with duplicated indices.
    pub fn into_features(self) -> SparseVector {
        self.feats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash128_is_seeded() {
        assert_eq!(hash128(b"Boston", 3), hash128(b"Boston", 3));
        assert_ne!(hash128(b"Boston", 3), hash128(b"Boston", 4));
        let (lo, hi) = hash128(b"Boston", 3);
        assert_ne!(lo, hi);
    }

    #[test]
    fn test_signed_feature_range() {
        for seed in 0..100 {
            let (idx, value) = signed_feature(hash128(b"abc", seed), 17);
            assert!(idx < 17);
            assert_eq!(HASHED_FEATURE_WEIGHT, value.abs());
        }
    }

    #[test]
    fn test_feature_hasher_collects() {
        let mut hasher = FeatureHasher::new(1000);
        hasher.add("word", 0);
        hasher.add_indicator(21);
        hasher.add_hash(42, 7);
        let feats = hasher.into_features();
        assert_eq!(3, feats.len());
        assert!(feats.iter().all(|&(i, _)| i < 1000));
    }
}
