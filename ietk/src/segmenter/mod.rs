//! Sequence segmenter.
//!
//! The segmenter is a linear-chain model over the states `outside` and `inside at position k`
//! for `k` in `1..=max_segment_len`. A segment starts at every `inside 1` state, so decoded
//! segments are disjoint and never longer than `max_segment_len`.

use std::ops::Range;

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};
use crate::tuning::Counts;
use crate::utils::{make_sparse_vector, SparseVector};

#[cfg(feature = "train")]
mod trainer;

#[cfg(feature = "train")]
pub use trainer::{SegmenterParams, SegmenterTrainer};

/// Default maximum segment length.
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 3;

// Number of neighbors on each side whose vectors feed the emission score.
const WINDOW_RADIUS: usize = 1;
const WINDOW_SIZE: usize = 2 * WINDOW_RADIUS + 1;

const OUTSIDE: usize = 0;
const BEGIN: usize = 1;

/// Positions of each feature group in the weight vector.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Layout {
    num_states: usize,
    num_dims: usize,
}

impl Layout {
    pub(crate) fn new(max_segment_len: usize, num_dims: usize) -> Self {
        Self {
            num_states: max_segment_len + 1,
            num_dims,
        }
    }

    #[inline(always)]
    fn emission(&self, state: usize, offset: usize) -> usize {
        (state * WINDOW_SIZE + offset) * self.num_dims
    }

    #[inline(always)]
    fn bias(&self, state: usize) -> usize {
        self.num_states * WINDOW_SIZE * self.num_dims + state
    }

    #[inline(always)]
    fn transition(&self, prev: usize, cur: usize) -> usize {
        self.bias(self.num_states) + prev * self.num_states + cur
    }

    #[inline(always)]
    fn start(&self, state: usize) -> usize {
        self.transition(self.num_states, 0) + state
    }

    pub(crate) fn len(&self) -> usize {
        self.start(self.num_states)
    }

    #[inline(always)]
    fn allowed(&self, prev: usize, cur: usize) -> bool {
        cur == OUTSIDE || cur == BEGIN || (prev != OUTSIDE && cur == prev + 1)
    }

    /// Computes the joint feature vector of a sentence and a state sequence.
    pub(crate) fn joint_features(&self, sentence: &[Vec<f32>], states: &[usize]) -> SparseVector {
        let mut feats = vec![];
        for (t, &s) in states.iter().enumerate() {
            for offset in 0..WINDOW_SIZE {
                let Some(v) = (t + offset)
                    .checked_sub(WINDOW_RADIUS)
                    .and_then(|pos| sentence.get(pos))
                else {
                    continue;
                };
                let base = self.emission(s, offset);
                for (d, &x) in v.iter().enumerate() {
                    if x != 0.0 {
                        feats.push(((base + d) as u32, f64::from(x)));
                    }
                }
            }
            feats.push((self.bias(s) as u32, 1.0));
            if t == 0 {
                feats.push((self.start(s) as u32, 1.0));
            } else {
                feats.push((self.transition(states[t - 1], s) as u32, 1.0));
            }
        }
        make_sparse_vector(feats)
    }

    /// Finds the best state sequence.
    ///
    /// `segment_loss(b, e)` is added to the score of every decoded segment `[b, e)`. Ties are
    /// broken in favor of the smaller state index, so `outside` wins over any segment.
    pub(crate) fn viterbi<L>(
        &self,
        weights: &[f64],
        sentence: &[Vec<f32>],
        mut segment_loss: L,
    ) -> Vec<usize>
    where
        L: FnMut(usize, usize) -> f64,
    {
        let n = sentence.len();
        let ns = self.num_states;
        if n == 0 {
            return vec![];
        }

        let mut emit = vec![0.0; n * ns];
        for t in 0..n {
            for s in 0..ns {
                let mut score = weights[self.bias(s)];
                for offset in 0..WINDOW_SIZE {
                    let Some(v) = (t + offset)
                        .checked_sub(WINDOW_RADIUS)
                        .and_then(|pos| sentence.get(pos))
                    else {
                        continue;
                    };
                    let base = self.emission(s, offset);
                    score += v
                        .iter()
                        .zip(&weights[base..base + self.num_dims])
                        .map(|(&x, w)| f64::from(x) * w)
                        .sum::<f64>();
                }
                emit[t * ns + s] = score;
            }
        }

        let mut scores = vec![f64::NEG_INFINITY; n * ns];
        let mut back = vec![0; n * ns];
        for s in [OUTSIDE, BEGIN] {
            scores[s] = weights[self.start(s)] + emit[s];
        }
        for t in 1..n {
            for s in 0..ns {
                let mut best = f64::NEG_INFINITY;
                let mut best_prev = 0;
                for p in 0..ns {
                    let prev_score = scores[(t - 1) * ns + p];
                    if !self.allowed(p, s) || prev_score == f64::NEG_INFINITY {
                        continue;
                    }
                    let mut cand = prev_score + weights[self.transition(p, s)];
                    if p != OUTSIDE && (s == OUTSIDE || s == BEGIN) {
                        cand += segment_loss(t - p, t);
                    }
                    if cand > best {
                        best = cand;
                        best_prev = p;
                    }
                }
                scores[t * ns + s] = best + emit[t * ns + s];
                back[t * ns + s] = best_prev;
            }
        }

        let mut best = f64::NEG_INFINITY;
        let mut state = OUTSIDE;
        for s in 0..ns {
            let mut score = scores[(n - 1) * ns + s];
            if score == f64::NEG_INFINITY {
                continue;
            }
            if s != OUTSIDE {
                score += segment_loss(n - s, n);
            }
            if score > best {
                best = score;
                state = s;
            }
        }

        let mut states = vec![0; n];
        for t in (0..n).rev() {
            states[t] = state;
            state = back[t * ns + state];
        }
        states
    }
}

/// Converts a state sequence to segments.
pub(crate) fn states_to_chunks(states: &[usize]) -> Vec<Range<usize>> {
    let mut chunks: Vec<Range<usize>> = vec![];
    for (t, &s) in states.iter().enumerate() {
        if s == BEGIN {
            chunks.push(t..t + 1);
        } else if s != OUTSIDE {
            if let Some(c) = chunks.last_mut() {
                c.end = t + 1;
            }
        }
    }
    chunks
}

/// Converts segments to a state sequence.
///
/// # Errors
///
/// If a segment is empty, out of range, overlaps another, or is longer than
/// `max_segment_len`, an error variant will be returned.
pub(crate) fn chunks_to_states(
    len: usize,
    chunks: &[Range<usize>],
    max_segment_len: usize,
) -> Result<Vec<usize>> {
    let mut states = vec![OUTSIDE; len];
    for c in chunks {
        if c.start >= c.end || c.end > len {
            return Err(IetkError::invalid_argument(
                "chunks",
                format!("invalid range {:?} for a sentence of {} tokens", c, len),
            ));
        }
        if c.len() > max_segment_len {
            return Err(IetkError::invalid_argument(
                "chunks",
                format!(
                    "range {:?} is longer than the maximum segment length {}",
                    c, max_segment_len
                ),
            ));
        }
        for (k, t) in c.clone().enumerate() {
            if states[t] != OUTSIDE {
                return Err(IetkError::invalid_argument(
                    "chunks",
                    format!("range {:?} overlaps another range", c),
                ));
            }
            states[t] = BEGIN + k;
        }
    }
    Ok(states)
}

/// Splits a sequence of word vectors into non-overlapping segments.
#[derive(Clone, Debug, Decode, Encode)]
pub struct SequenceSegmenter {
    max_segment_len: u32,
    num_dims: u32,
    weights: Vec<f64>,
}

impl SequenceSegmenter {
    /// Creates a segmenter from trained weights.
    ///
    /// # Errors
    ///
    /// If the number of weights does not fit the layout, an error variant will be returned.
    pub fn new(max_segment_len: usize, num_dims: usize, weights: Vec<f64>) -> Result<Self> {
        if max_segment_len == 0 {
            return Err(IetkError::invalid_argument(
                "max_segment_len",
                "must be at least 1",
            ));
        }
        let expected = Layout::new(max_segment_len, num_dims).len();
        if weights.len() != expected {
            return Err(IetkError::invalid_argument(
                "weights",
                format!("expected {} weights, got {}", expected, weights.len()),
            ));
        }
        Ok(Self {
            max_segment_len: u32::try_from(max_segment_len)?,
            num_dims: u32::try_from(num_dims)?,
            weights,
        })
    }

    pub fn max_segment_len(&self) -> usize {
        self.max_segment_len as usize
    }

    /// Returns the expected size of each input vector.
    pub fn num_dimensions(&self) -> usize {
        self.num_dims as usize
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn layout(&self) -> Layout {
        Layout::new(self.max_segment_len(), self.num_dimensions())
    }

    /// Finds the best segmentation of `sentence`.
    ///
    /// The returned ranges are sorted and disjoint.
    ///
    /// # Errors
    ///
    /// If a vector has the wrong size, an error variant will be returned.
    pub fn segment(&self, sentence: &[Vec<f32>]) -> Result<Vec<Range<usize>>> {
        if let Some(v) = sentence.iter().find(|v| v.len() != self.num_dimensions()) {
            return Err(IetkError::invalid_argument(
                "sentence",
                format!(
                    "expected vectors of {} dimensions, got {}",
                    self.num_dimensions(),
                    v.len()
                ),
            ));
        }
        let states = self.layout().viterbi(&self.weights, sentence, |_, _| 0.0);
        Ok(states_to_chunks(&states))
    }

    /// Counts matched, predicted, and gold segments over a labeled set.
    pub fn evaluate<'a, I>(&self, samples: I) -> Result<Counts>
    where
        I: IntoIterator<Item = (&'a [Vec<f32>], &'a [Range<usize>])>,
    {
        let mut counts = Counts::default();
        for (sentence, gold) in samples {
            let predicted = self.segment(sentence)?;
            counts.correct += predicted.iter().filter(|c| gold.contains(c)).count();
            counts.predicted += predicted.len();
            counts.gold += gold.len();
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sentence(xs: &[f32]) -> Vec<Vec<f32>> {
        xs.iter().map(|&x| vec![x]).collect()
    }

    // Weights that open a segment on positive tokens and extend it while the next one is
    // positive too.
    fn hand_weights(max_len: usize) -> Vec<f64> {
        let layout = Layout::new(max_len, 1);
        let mut w = vec![0.0; layout.len()];
        for s in 1..=max_len {
            w[layout.emission(s, WINDOW_RADIUS)] = 2.0;
            w[layout.bias(s)] = -1.0;
        }
        w[layout.emission(OUTSIDE, WINDOW_RADIUS)] = -2.0;
        for p in 1..max_len {
            w[layout.transition(p, p + 1)] = 1.0;
        }
        w
    }

    #[test]
    fn test_layout_size() {
        let layout = Layout::new(3, 5);
        assert_eq!(4 * 3 * 5 + 4 + 16 + 4, layout.len());
    }

    #[test]
    fn test_segment() {
        let seg = SequenceSegmenter::new(3, 1, hand_weights(3)).unwrap();
        let s = unit_sentence(&[-1.0, 1.0, 1.0, -1.0, 1.0]);
        assert_eq!(vec![1..3, 4..5], seg.segment(&s).unwrap());
    }

    #[test]
    fn test_segment_length_bound() {
        let seg = SequenceSegmenter::new(2, 1, hand_weights(2)).unwrap();
        let s = unit_sentence(&[1.0; 5]);
        let chunks = seg.segment(&s).unwrap();
        assert!(chunks.iter().all(|c| (1..=2).contains(&c.len())));
        assert_eq!(5, chunks.iter().map(|c| c.len()).sum::<usize>());
    }

    #[test]
    fn test_tie_prefers_outside() {
        let layout = Layout::new(3, 1);
        let seg = SequenceSegmenter::new(3, 1, vec![0.0; layout.len()]).unwrap();
        assert!(seg.segment(&unit_sentence(&[1.0, 1.0])).unwrap().is_empty());
    }

    #[test]
    fn test_segment_empty_sentence() {
        let seg = SequenceSegmenter::new(3, 1, hand_weights(3)).unwrap();
        assert!(seg.segment(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_segment_dimension_mismatch() {
        let seg = SequenceSegmenter::new(3, 1, hand_weights(3)).unwrap();
        assert!(seg.segment(&[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_new_rejects_wrong_size() {
        assert!(SequenceSegmenter::new(3, 1, vec![0.0; 3]).is_err());
        assert!(SequenceSegmenter::new(0, 1, vec![]).is_err());
    }

    #[test]
    fn test_states_round_trip() {
        let chunks = vec![0..2, 2..3, 5..8];
        let states = chunks_to_states(8, &chunks, 3).unwrap();
        assert_eq!(vec![1, 2, 1, 0, 0, 1, 2, 3], states);
        assert_eq!(chunks, states_to_chunks(&states));
    }

    #[test]
    fn test_chunks_to_states_errors() {
        assert!(chunks_to_states(3, &[0..4], 3).is_err());
        assert!(chunks_to_states(3, &[1..1], 3).is_err());
        assert!(chunks_to_states(3, &[0..2, 1..3], 3).is_err());
        assert!(chunks_to_states(5, &[0..4], 3).is_err());
    }

    #[test]
    fn test_joint_features_score_matches_viterbi() {
        let w = hand_weights(3);
        let layout = Layout::new(3, 1);
        let s = unit_sentence(&[-1.0, 1.0, 1.0, -1.0]);
        let states = layout.viterbi(&w, &s, |_, _| 0.0);
        let phi = layout.joint_features(&s, &states);
        let score = crate::utils::sparse_dot(&phi, &w);
        // Any other sequence scores no higher.
        for alt in [vec![0, 0, 0, 0], vec![0, 1, 1, 0], vec![1, 2, 3, 0]] {
            let alt_score = crate::utils::sparse_dot(&layout.joint_features(&s, &alt), &w);
            assert!(score >= alt_score);
        }
    }

    #[test]
    fn test_segment_loss_is_applied() {
        let layout = Layout::new(3, 1);
        let w = vec![0.0; layout.len()];
        let s = unit_sentence(&[0.0, 0.0, 0.0]);
        let states = layout.viterbi(&w, &s, |b, e| if (b, e) == (1, 3) { 5.0 } else { -1.0 });
        assert_eq!(vec![1..3], states_to_chunks(&states));
    }

    #[test]
    fn test_evaluate() {
        let seg = SequenceSegmenter::new(3, 1, hand_weights(3)).unwrap();
        let s = unit_sentence(&[-1.0, 1.0, 1.0, -1.0, 1.0]);
        let gold = vec![1..3, 3..4];
        let counts = seg.evaluate([(s.as_slice(), gold.as_slice())]).unwrap();
        assert_eq!(1, counts.correct);
        assert_eq!(2, counts.predicted);
        assert_eq!(2, counts.gold);
    }
}
