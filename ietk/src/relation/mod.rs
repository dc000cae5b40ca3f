//! Binary relations between two entity mentions.

#[cfg(feature = "train")]
mod trainer;

use std::io::{Read, Write};
use std::ops::Range;

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};
use crate::hashing::{combine, hash128, hash64};
use crate::linear::BinaryLinear;
use crate::model_file::{expect_header, read_payload, write_model, ModelKind};
use crate::ner::NamedEntityExtractor;
use crate::utils::{make_sparse_vector, SparseVector};
use crate::word_features::TotalWordFeatureExtractor;

#[cfg(feature = "train")]
pub use trainer::BinaryRelationDetectorTrainer;

const MODEL_VERSION: u32 = 1;

/// Number of hashed dimensions that follow the dense argument vectors.
pub const RELATION_HASH_DIMS: u32 = 100_000;

const REVERSED_SEED: u64 = 100_000;
const NARROW_WINDOW: usize = 2;
const WIDE_WINDOW: usize = 5;

/// Returns the number of relation feature dimensions for word vectors of `vector_dims`.
pub fn num_relation_feature_dims(vector_dims: usize) -> usize {
    2 * vector_dims + RELATION_HASH_DIMS as usize
}

/// Returns `true` if the two ranges share a token.
pub fn entities_overlap(arg1: &Range<usize>, arg2: &Range<usize>) -> bool {
    arg1.start < arg2.end && arg2.start < arg1.end
}

/// Features of an ordered pair of mentions.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryRelation {
    features: SparseVector,
    fingerprint: u64,
}

impl BinaryRelation {
    pub fn features(&self) -> &[(u32, f64)] {
        &self.features
    }

    /// Returns the fingerprint of the word feature extractor that built this relation.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

#[inline]
fn signed_unit(hash: (u64, u64), offset: u32) -> (u32, f64) {
    let idx = (hash.0 % u64::from(RELATION_HASH_DIMS)) as u32 + offset;
    if hash.1 & 1 == 1 {
        (idx, 1.0)
    } else {
        (idx, -1.0)
    }
}

fn hash_triple(a: u64, b: u64, c: u64) -> (u64, u64) {
    let mut buf = [0; 24];
    buf[..8].copy_from_slice(&a.to_le_bytes());
    buf[8..16].copy_from_slice(&b.to_le_bytes());
    buf[16..].copy_from_slice(&c.to_le_bytes());
    hash128(&buf, 0)
}

fn add_ngrams<S>(
    feats: &mut SparseVector,
    tokens: &[S],
    range: Range<usize>,
    offset: u32,
    seed: u64,
) where
    S: AsRef<str>,
{
    let mut h = [0u64; 3];
    for (k, i) in range.enumerate() {
        h = [0, h[0], h[1]];
        let unigram = hash128(tokens[i].as_ref().as_bytes(), seed);
        h[0] = unigram.0;
        feats.push(signed_unit(unigram, offset));
        if k >= 1 {
            feats.push(signed_unit(hash_triple(h[0], h[1], 0), offset));
        }
        if k >= 2 {
            feats.push(signed_unit(hash_triple(h[0], h[1], h[2]), offset));
        }
    }
}

fn hash_range<S>(tokens: &[S], range: Range<usize>, seed: u64) -> u64
where
    S: AsRef<str>,
{
    tokens[range]
        .iter()
        .fold(seed, |h, t| combine(h, hash64(t.as_ref().as_bytes(), 0)))
}

/// Builds the features of the mention pair `(arg1, arg2)`.
///
/// The mean word vectors of both arguments come first. Hashed 1-, 2-, and 3-gram features of
/// the tokens around and between the arguments follow. When `arg1` comes after `arg2` a
/// different seed ladder is used so that the argument order is part of the features.
///
/// # Errors
///
/// If a range is empty or out of bounds, an error variant will be returned.
pub fn extract_binary_relation<S>(
    tokens: &[S],
    arg1: Range<usize>,
    arg2: Range<usize>,
    fe: &TotalWordFeatureExtractor,
) -> Result<BinaryRelation>
where
    S: AsRef<str>,
{
    for (name, r) in [("arg1", &arg1), ("arg2", &arg2)] {
        if r.start >= r.end || r.end > tokens.len() {
            return Err(IetkError::invalid_argument(
                name,
                format!("invalid range {:?} for a sentence of {} tokens", r, tokens.len()),
            ));
        }
    }
    let mut feats = vec![];
    let mut offset = 0u32;
    for r in [&arg1, &arg2] {
        for x in fe.mean_vector(&tokens[r.clone()]) {
            feats.push((offset, f64::from(x)));
            offset += 1;
        }
    }

    let (mut first, mut second) = (arg1, arg2);
    let mut seed = 0;
    if first.start > second.start {
        std::mem::swap(&mut first, &mut second);
        seed = REVERSED_SEED;
    }
    let n = tokens.len();
    let before = first.start.saturating_sub(NARROW_WINDOW)..first.start;
    let before_wide = first.start.saturating_sub(WIDE_WINDOW)..first.start;
    let between = first.end.min(second.start)..second.start;
    let after = second.end..(second.end + NARROW_WINDOW).min(n);
    let after_wide = second.end..(second.end + WIDE_WINDOW).min(n);

    for r in [
        before.clone(),
        before_wide,
        between.clone(),
        after.clone(),
        after_wide,
    ] {
        add_ngrams(&mut feats, tokens, r, offset, seed);
        seed += 1;
    }
    let h1 = hash_range(tokens, before, seed);
    let h2 = hash_range(tokens, between, seed);
    let h3 = hash_range(tokens, after, seed);
    for (a, b, c) in [(h1, h2, 0), (0, h2, 0), (0, h2, h3), (h1, h2, h3)] {
        feats.push(signed_unit(hash_triple(a, b, c), offset));
    }

    Ok(BinaryRelation {
        features: make_sparse_vector(feats),
        fingerprint: fe.fingerprint(),
    })
}

impl NamedEntityExtractor {
    /// Builds the relation features of two mentions with this extractor's word features.
    pub fn extract_binary_relation<S>(
        &self,
        tokens: &[S],
        arg1: Range<usize>,
        arg2: Range<usize>,
    ) -> Result<BinaryRelation>
    where
        S: AsRef<str>,
    {
        extract_binary_relation(tokens, arg1, arg2, self.word_feature_extractor())
    }
}

/// Decides whether a mention pair is an instance of one named relation.
#[derive(Clone, Debug, Decode, Encode)]
pub struct BinaryRelationDetector {
    name: String,
    fingerprint: u64,
    classifier: BinaryLinear,
}

impl BinaryRelationDetector {
    pub fn new(name: String, fingerprint: u64, classifier: BinaryLinear) -> Self {
        Self {
            name,
            fingerprint,
            classifier,
        }
    }

    /// Returns the name of the relation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Scores a relation. Positive values mean the relation holds.
    ///
    /// # Errors
    ///
    /// If the relation was built with a different word feature extractor,
    /// [`IetkError::FingerprintMismatch`] will be returned.
    pub fn score(&self, rel: &BinaryRelation) -> Result<f64> {
        if rel.fingerprint != self.fingerprint {
            return Err(IetkError::fingerprint_mismatch(
                self.fingerprint,
                rel.fingerprint,
            ));
        }
        Ok(self.classifier.score(&rel.features))
    }

    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        write_model(wtr, ModelKind::BinaryRelationDetector, MODEL_VERSION, self)
    }

    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        expect_header(&mut rdr, ModelKind::BinaryRelationDetector, &[MODEL_VERSION])?;
        read_payload(&mut rdr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::word_features::tests::make_test_extractor;

    const TOKENS: [&str; 6] = ["Ben", "Franklin", "was", "born", "in", "Boston"];

    #[test]
    fn test_entities_overlap() {
        assert!(entities_overlap(&(0..2), &(1..3)));
        assert!(!entities_overlap(&(0..2), &(2..3)));
        assert!(!entities_overlap(&(4..5), &(0..4)));
    }

    #[test]
    fn test_argument_order_matters() {
        let fe = make_test_extractor(&["was", "born", "in"]);
        let fwd = extract_binary_relation(&TOKENS, 0..2, 5..6, &fe).unwrap();
        let rev = extract_binary_relation(&TOKENS, 5..6, 0..2, &fe).unwrap();
        assert_ne!(fwd.features(), rev.features());
        assert_eq!(fe.fingerprint(), fwd.fingerprint());
        let d = fe.dimensions() as u32;
        assert!(fwd
            .features()
            .iter()
            .all(|&(i, _)| i < 2 * d + RELATION_HASH_DIMS));
        assert!(fwd.features().windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_invalid_arguments() {
        let fe = make_test_extractor(&["was"]);
        assert!(extract_binary_relation(&TOKENS, 0..0, 5..6, &fe).is_err());
        assert!(extract_binary_relation(&TOKENS, 0..2, 5..7, &fe).is_err());
    }

    #[test]
    fn test_fingerprint_gating() {
        let fe_a = make_test_extractor(&["was", "born"]);
        let fe_b = make_test_extractor(&["was", "in"]);
        let rel = extract_binary_relation(&TOKENS, 0..2, 5..6, &fe_a).unwrap();
        let dims = num_relation_feature_dims(fe_a.dimensions());
        let detector = BinaryRelationDetector::new(
            "born_in".to_string(),
            fe_b.fingerprint(),
            BinaryLinear::new(vec![0.0; dims], 1.0),
        );
        assert!(matches!(
            detector.score(&rel),
            Err(IetkError::FingerprintMismatch(_))
        ));
        let detector = BinaryRelationDetector::new(
            "born_in".to_string(),
            fe_a.fingerprint(),
            BinaryLinear::new(vec![0.0; dims], 1.0),
        );
        assert_eq!(1.0, detector.score(&rel).unwrap());
    }

    #[test]
    fn test_write_read() {
        let detector = BinaryRelationDetector::new(
            "born_in".to_string(),
            42,
            BinaryLinear::new(vec![0.5, -0.5], 0.25),
        );
        let mut buf = vec![];
        detector.write(&mut buf).unwrap();
        let loaded = BinaryRelationDetector::read(buf.as_slice()).unwrap();
        assert_eq!("born_in", loaded.name());
        assert_eq!(42, loaded.fingerprint());
    }
}
