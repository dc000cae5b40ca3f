//! Word morphology feature extractor.

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};
use crate::substring_set::ApproximateSubstringSet;

/// Maps a word to the sum of the projection rows selected by its substring hits.
#[derive(Clone, Debug, Decode, Encode)]
pub struct WordMorphologyFeatureExtractor {
    substrings: ApproximateSubstringSet,
    num_dims: u32,

    // Row-major matrix with one row per substring bucket.
    projection: Vec<f32>,
}

impl WordMorphologyFeatureExtractor {
    /// Creates a new extractor.
    ///
    /// # Arguments
    ///
    /// * `substrings` - A substring set.
    /// * `projection` - A row-major matrix of shape `(substrings.num_buckets(), num_dims)`.
    /// * `num_dims` - The number of output dimensions.
    ///
    /// # Errors
    ///
    /// If the size of `projection` does not match, an error variant will be returned.
    pub fn new(
        substrings: ApproximateSubstringSet,
        projection: Vec<f32>,
        num_dims: usize,
    ) -> Result<Self> {
        if projection.len() != substrings.num_buckets() * num_dims {
            return Err(IetkError::invalid_argument(
                "projection",
                format!(
                    "expected {} x {} values, got {}",
                    substrings.num_buckets(),
                    num_dims,
                    projection.len()
                ),
            ));
        }
        Ok(Self {
            substrings,
            num_dims: u32::try_from(num_dims)?,
            projection,
        })
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dims as usize
    }

    pub fn substrings(&self) -> &ApproximateSubstringSet {
        &self.substrings
    }

    /// Multiplies every projection row by `scale`.
    pub fn premultiply_vectors_by(&mut self, scale: f32) {
        for w in &mut self.projection {
            *w *= scale;
        }
    }

    /// Returns the morphology vector of `word`.
    pub fn feature_vector(&self, word: &str) -> Vec<f32> {
        let mut out = vec![0.0; self.num_dimensions()];
        self.add_feature_vector(word, &mut vec![], &mut out);
        out
    }

    /// Adds the morphology vector of `word` to `out`.
    ///
    /// `hits` is a scratch buffer owned by the caller.
    pub fn add_feature_vector(&self, word: &str, hits: &mut Vec<u32>, out: &mut [f32]) {
        debug_assert_eq!(self.num_dimensions(), out.len());
        self.substrings.find_into(word, hits);
        let d = self.num_dimensions();
        for &id in hits.iter() {
            let row = &self.projection[id as usize * d..(id as usize + 1) * d];
            for (o, w) in out.iter_mut().zip(row) {
                *o += w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_extractor() -> (WordMorphologyFeatureExtractor, u32, u32) {
        let mut set = ApproximateSubstringSet::with_bits(6);
        let ing = set.add("ing*").unwrap();
        let un = set.add("*un").unwrap();
        let mut projection = vec![0.0; 64 * 2];
        projection[ing as usize * 2] = 1.0;
        projection[un as usize * 2 + 1] = 2.0;
        (
            WordMorphologyFeatureExtractor::new(set, projection, 2).unwrap(),
            ing,
            un,
        )
    }

    #[test]
    fn test_new_checks_shape() {
        let set = ApproximateSubstringSet::with_bits(6);
        assert!(WordMorphologyFeatureExtractor::new(set, vec![0.0; 10], 2).is_err());
    }

    #[test]
    fn test_feature_vector_sums_rows() {
        let (fe, _, _) = make_extractor();
        assert_eq!(vec![1.0, 2.0], fe.feature_vector("undoing"));
        assert_eq!(vec![1.0, 0.0], fe.feature_vector("walking"));
        assert_eq!(vec![0.0, 0.0], fe.feature_vector("xyz"));
    }

    #[test]
    fn test_premultiply() {
        let (mut fe, _, _) = make_extractor();
        fe.premultiply_vectors_by(0.5);
        assert_eq!(vec![0.5, 1.0], fe.feature_vector("undoing"));
    }
}
