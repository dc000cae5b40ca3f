//! Feature expansion of a chunk in a sentence.

use std::ops::Range;

use crate::errors::{IetkError, Result};
use crate::hashing::FeatureHasher;
use crate::stem::stem_word;
use crate::utils::{make_sparse_vector, SparseVector};

/// Number of hashed feature dimensions. Dense features start at this index.
pub const NER_HASH_DIMS: u32 = 500_000;

// Tokens this far from the chunk still contribute bag-of-words features.
const WIDE_WINDOW: usize = 8;

const SEED_WIDE_BEFORE: u64 = 1000;
const SEED_WIDE_AFTER: u64 = 1001;
const SEED_CAPS_PATTERN: u64 = 12345;

/// Seeds of one token position.
struct Family {
    word: u64,
    stem: u64,
    prefix: u64,
    suffix: u64,
    shape: u64,
}

const INSIDE: Family = Family {
    word: 0,
    stem: 10,
    prefix: 50,
    suffix: 51,
    shape: 200,
};
const FIRST: Family = Family {
    word: 1,
    stem: 11,
    prefix: 52,
    suffix: 53,
    shape: 220,
};
const LAST: Family = Family {
    word: 2,
    stem: 12,
    prefix: 54,
    suffix: 55,
    shape: 240,
};
const PREV: Family = Family {
    word: 3,
    stem: 13,
    prefix: 56,
    suffix: 57,
    shape: 260,
};
const PREV2: Family = Family {
    word: 103,
    stem: 113,
    prefix: 156,
    suffix: 157,
    shape: 280,
};
const NEXT: Family = Family {
    word: 4,
    stem: 14,
    prefix: 58,
    suffix: 59,
    shape: 300,
};
const NEXT2: Family = Family {
    word: 104,
    stem: 114,
    prefix: 158,
    suffix: 159,
    shape: 320,
};

pub(crate) fn is_caps(word: &str) -> bool {
    word.bytes().next().map_or(false, |b| b.is_ascii_uppercase())
}

fn is_all_caps(word: &str) -> bool {
    word.bytes().all(|b| b.is_ascii_uppercase())
}

fn has_alternating_caps(word: &str) -> bool {
    word.as_bytes()
        .windows(2)
        .any(|w| w[0].is_ascii_lowercase() && w[1].is_ascii_uppercase())
}

fn add_shape(h: &mut FeatureHasher, word: &str, base: u64) {
    let has_digit = word.bytes().any(|b| b.is_ascii_digit());
    let has_letter = word.bytes().any(|b| b.is_ascii_alphabetic());
    let flags = [
        is_caps(word),
        is_all_caps(word),
        has_digit,
        has_letter,
        has_digit && has_letter,
        word.bytes().all(|b| b.is_ascii_digit()),
        word.contains('-'),
        has_alternating_caps(word),
    ];
    for (i, &flag) in flags.iter().enumerate() {
        if flag {
            h.add_indicator(base + i as u64);
        }
    }
    if is_all_caps(word) && (1..=4).contains(&word.len()) {
        h.add_indicator(base + 8 + word.len() as u64);
    }
}

fn add_token(h: &mut FeatureHasher, word: &str, family: &Family) {
    h.add(word, family.word);
    h.add(&stem_word(word), family.stem);
    let prefix: String = word.chars().take(3).collect();
    h.add(&prefix, family.prefix);
    let n = word.chars().count();
    let suffix: String = word.chars().skip(n.saturating_sub(3)).collect();
    h.add(&suffix, family.suffix);
    add_shape(h, word, family.shape);
}

fn l2_scaled(v: &[f32]) -> impl Iterator<Item = f64> + '_ {
    let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    let denom = 0.5 * norm + 1e-10;
    v.iter().map(move |&x| f64::from(x) / denom)
}

/// Returns the number of dimensions of [`chunk_features()`] for word vectors of `vector_dims`.
pub fn num_chunk_feature_dims(vector_dims: usize) -> usize {
    NER_HASH_DIMS as usize + 5 * vector_dims
}

/// Expands a chunk into a sparse feature vector.
///
/// Hashed features of the chunk tokens, their neighbors, and a capitalization pattern occupy
/// indices below [`NER_HASH_DIMS`]. They are followed by five scaled dense vectors: the first
/// token, the last token, the chunk mean, the previous token, and the next token. Missing
/// neighbors are zero vectors.
///
/// # Errors
///
/// If the range is empty or out of bounds, or the inputs are not aligned, an error variant
/// will be returned.
pub fn chunk_features<S>(
    tokens: &[S],
    vectors: &[Vec<f32>],
    range: Range<usize>,
) -> Result<SparseVector>
where
    S: AsRef<str>,
{
    if tokens.len() != vectors.len() {
        return Err(IetkError::invalid_argument(
            "vectors",
            "there must be one vector per token",
        ));
    }
    if range.start >= range.end || range.end > tokens.len() {
        return Err(IetkError::invalid_argument(
            "range",
            format!("invalid range {:?} for a sentence of {} tokens", range, tokens.len()),
        ));
    }
    let word = |i: usize| tokens[i].as_ref();
    let (b, e) = (range.start, range.end);
    let mut h = FeatureHasher::new(NER_HASH_DIMS);

    for i in b.saturating_sub(WIDE_WINDOW)..b {
        h.add(word(i), SEED_WIDE_BEFORE);
    }
    for i in e..(e + WIDE_WINDOW).min(tokens.len()) {
        h.add(word(i), SEED_WIDE_AFTER);
    }
    for i in range.clone() {
        add_token(&mut h, word(i), &INSIDE);
    }
    add_token(&mut h, word(b), &FIRST);
    add_token(&mut h, word(e - 1), &LAST);
    if b >= 1 {
        add_token(&mut h, word(b - 1), &PREV);
    }
    if b >= 2 {
        add_token(&mut h, word(b - 2), &PREV2);
    }
    if e < tokens.len() {
        add_token(&mut h, word(e), &NEXT);
    }
    if e + 1 < tokens.len() {
        add_token(&mut h, word(e + 1), &NEXT2);
    }

    let mut pattern = 0u64;
    if b >= 1 && is_caps(word(b - 1)) {
        pattern |= 1;
    }
    if is_caps(word(b)) {
        pattern |= 2;
    }
    if is_caps(word(e - 1)) {
        pattern |= 4;
    }
    if e < tokens.len() && is_caps(word(e)) {
        pattern |= 8;
    }
    h.add_hash(pattern, SEED_CAPS_PATTERN);

    let mut feats = make_sparse_vector(h.into_features());

    let dims = vectors[b].len();
    let mut mean = vec![0f32; dims];
    for v in &vectors[range.clone()] {
        for (m, x) in mean.iter_mut().zip(v) {
            *m += x;
        }
    }
    let len = range.len() as f32;
    mean.iter_mut().for_each(|m| *m /= len);
    let zeros = vec![0f32; dims];
    let before = if b >= 1 { &vectors[b - 1] } else { &zeros };
    let after = if e < vectors.len() { &vectors[e] } else { &zeros };
    let blocks: [&[f32]; 5] = [&vectors[b], &vectors[e - 1], &mean, before, after];
    let mut idx = NER_HASH_DIMS;
    for block in blocks {
        for x in l2_scaled(block) {
            feats.push((idx, x));
            idx += 1;
        }
    }
    Ok(feats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence() -> (Vec<&'static str>, Vec<Vec<f32>>) {
        let tokens = vec!["I", "met", "John", "Becker", "at", "HBU", "."];
        let vectors = (0..tokens.len())
            .map(|i| vec![i as f32, 1.0, -1.0])
            .collect();
        (tokens, vectors)
    }

    #[test]
    fn test_layout() {
        let (tokens, vectors) = sentence();
        let f = chunk_features(&tokens, &vectors, 2..4).unwrap();
        assert_eq!(num_chunk_feature_dims(3), NER_HASH_DIMS as usize + 15);
        let dense: Vec<_> = f.iter().filter(|&&(i, _)| i >= NER_HASH_DIMS).collect();
        assert_eq!(15, dense.len());
        assert_eq!(NER_HASH_DIMS, dense[0].0);
        assert_eq!(NER_HASH_DIMS + 14, dense[14].0);
        // Hashed indices are sorted and unique.
        let hashed: Vec<_> = f.iter().filter(|&&(i, _)| i < NER_HASH_DIMS).collect();
        assert!(hashed.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_scaled_dense_block() {
        let (tokens, vectors) = sentence();
        let f = chunk_features(&tokens, &vectors, 2..3).unwrap();
        let first: Vec<f64> = f
            .iter()
            .filter(|&&(i, _)| (NER_HASH_DIMS..NER_HASH_DIMS + 3).contains(&i))
            .map(|&(_, x)| x)
            .collect();
        let norm = (4.0f64 + 1.0 + 1.0).sqrt();
        assert!((first[0] - 2.0 / (0.5 * norm)).abs() < 1e-6);
    }

    #[test]
    fn test_boundaries_use_zero_vectors() {
        let (tokens, vectors) = sentence();
        let f = chunk_features(&tokens, &vectors, 0..7).unwrap();
        let tail: Vec<f64> = f
            .iter()
            .filter(|&&(i, _)| i >= NER_HASH_DIMS + 9)
            .map(|&(_, x)| x)
            .collect();
        assert_eq!(vec![0.0; 6], tail);
    }

    #[test]
    fn test_deterministic() {
        let (tokens, vectors) = sentence();
        assert_eq!(
            chunk_features(&tokens, &vectors, 5..6).unwrap(),
            chunk_features(&tokens, &vectors, 5..6).unwrap()
        );
        assert_ne!(
            chunk_features(&tokens, &vectors, 5..6).unwrap(),
            chunk_features(&tokens, &vectors, 2..3).unwrap()
        );
    }

    #[test]
    fn test_invalid_ranges() {
        let (tokens, vectors) = sentence();
        assert!(chunk_features(&tokens, &vectors, 3..3).is_err());
        assert!(chunk_features(&tokens, &vectors, 5..8).is_err());
        assert!(chunk_features(&tokens[..3], &vectors, 0..1).is_err());
    }

    #[test]
    fn test_shapes() {
        assert!(is_caps("John"));
        assert!(!is_caps("john"));
        assert!(is_all_caps("HBU"));
        assert!(has_alternating_caps("McDonald"));
        assert!(!has_alternating_caps("MIT"));
    }
}
