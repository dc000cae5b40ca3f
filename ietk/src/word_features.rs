//! Total word feature extractor.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use bincode::{
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};
use hashbrown::HashMap;

use crate::errors::{IetkError, Result};
use crate::hashing::hash64;
use crate::model_file::{expect_header, read_payload, write_model, ModelKind};
use crate::morphology::WordMorphologyFeatureExtractor;
use crate::utils::canonicalize_digits;

const FINGERPRINT_SEED: u64 = 0x7477_6665;
const MODEL_VERSION: u32 = 1;

/// Produces a dense vector for every word.
///
/// A vector has `1 + d_word + d_morph` dimensions: an out-of-dictionary indicator, the scaled
/// distributional vector of the word (zero if unknown), and its morphology vector. Digits are
/// replaced with `#` before anything is looked up.
#[derive(Clone, Debug)]
pub struct TotalWordFeatureExtractor {
    morph: WordMorphologyFeatureExtractor,
    dict_dims: u32,
    vectors: HashMap<String, Vec<f32>>,
    fingerprint: u64,
}

fn mean_abs(v: &[f32]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.iter().map(|x| f64::from(x.abs())).sum::<f64>() / v.len() as f64
    }
}

impl TotalWordFeatureExtractor {
    /// Builds a new extractor.
    ///
    /// The distributional vectors and the morphology projection are rescaled so that the mean
    /// absolute coordinate of each block is 1 over the given words.
    ///
    /// # Arguments
    ///
    /// * `word_vectors` - Distributional vectors of dictionary words.
    /// * `morph` - A trained morphology extractor.
    ///
    /// # Errors
    ///
    /// If the dictionary is empty or the vectors have different sizes, an error variant will be
    /// returned.
    pub fn new<I>(word_vectors: I, mut morph: WordMorphologyFeatureExtractor) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let sorted: BTreeMap<String, Vec<f32>> = word_vectors.into_iter().collect();
        let mut dict: BTreeMap<String, Vec<f32>> = BTreeMap::new();
        for (word, v) in sorted {
            dict.entry(canonicalize_digits(&word).into_owned())
                .or_insert(v);
        }
        let dict_dims = match dict.values().next() {
            Some(v) => v.len(),
            None => {
                return Err(IetkError::invalid_argument(
                    "word_vectors",
                    "the dictionary is empty",
                ))
            }
        };
        if dict.values().any(|v| v.len() != dict_dims) {
            return Err(IetkError::invalid_argument(
                "word_vectors",
                "all vectors must have the same size",
            ));
        }

        let mut morph_sum = 0.0;
        let mut word_sum = 0.0;
        for (word, v) in &dict {
            morph_sum += mean_abs(&morph.feature_vector(word));
            word_sum += mean_abs(v);
        }
        let n = dict.len() as f64;
        if morph_sum > 0.0 {
            morph.premultiply_vectors_by((n / morph_sum) as f32);
        }
        let word_scale = if word_sum > 0.0 {
            (n / word_sum) as f32
        } else {
            1.0
        };

        let morph_dims = morph.num_dimensions();
        let mut hits = vec![];
        let mut vectors = HashMap::with_capacity(dict.len());
        for (word, v) in dict {
            let mut total = Vec::with_capacity(1 + dict_dims + morph_dims);
            total.push(0.0);
            total.extend(v.iter().map(|x| x * word_scale));
            total.resize(1 + dict_dims + morph_dims, 0.0);
            morph.add_feature_vector(&word, &mut hits, &mut total[1 + dict_dims..]);
            vectors.insert(word, total);
        }

        let mut result = Self {
            morph,
            dict_dims: u32::try_from(dict_dims)?,
            vectors,
            fingerprint: 0,
        };
        result.fingerprint = result.compute_fingerprint()?;
        Ok(result)
    }

    fn compute_fingerprint(&self) -> Result<u64> {
        let config = bincode::config::standard();
        let mut buf = bincode::encode_to_vec(&self.morph, config)?;
        buf.extend(bincode::encode_to_vec(self.dict_dims, config)?);
        buf.extend(bincode::encode_to_vec(SortedEntries(&self.vectors), config)?);
        // Zero is reserved for models that use no word features.
        Ok(hash64(&buf, FINGERPRINT_SEED).max(1))
    }

    /// Returns a value identifying the state of this extractor.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Returns the number of dimensions of the output vectors.
    pub fn dimensions(&self) -> usize {
        1 + self.dict_dims as usize + self.morph.num_dimensions()
    }

    /// Returns the number of dimensions of the distributional block.
    pub fn dict_dimensions(&self) -> usize {
        self.dict_dims as usize
    }

    pub fn morphology(&self) -> &WordMorphologyFeatureExtractor {
        &self.morph
    }

    pub fn num_words_in_dictionary(&self) -> usize {
        self.vectors.len()
    }

    /// Returns the dictionary words in lexicographic order.
    pub fn words_in_dictionary(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.vectors.keys().map(String::as_str).collect();
        words.sort_unstable();
        words
    }

    /// Returns the vector of `word`.
    pub fn feature_vector(&self, word: &str) -> Vec<f32> {
        let mut out = vec![];
        self.feature_vector_into(word, &mut vec![], &mut out);
        out
    }

    /// Same as [`Self::feature_vector()`], but reuses the caller's buffers.
    pub fn feature_vector_into(&self, word: &str, hits: &mut Vec<u32>, out: &mut Vec<f32>) {
        let word = canonicalize_digits(word);
        out.clear();
        if let Some(v) = self.vectors.get(word.as_ref()) {
            out.extend_from_slice(v);
            return;
        }
        out.resize(self.dimensions(), 0.0);
        out[0] = 1.0;
        let offset = 1 + self.dict_dimensions();
        self.morph.add_feature_vector(&word, hits, &mut out[offset..]);
    }

    /// Applies the extractor to every token of a sentence.
    pub fn lift_sentence<S>(&self, tokens: &[S]) -> Vec<Vec<f32>>
    where
        S: AsRef<str>,
    {
        let mut hits = vec![];
        tokens
            .iter()
            .map(|token| {
                let mut v = vec![];
                self.feature_vector_into(token.as_ref(), &mut hits, &mut v);
                v
            })
            .collect()
    }

    /// Returns the mean vector of the given tokens, or zeros if there are none.
    pub fn mean_vector<S>(&self, tokens: &[S]) -> Vec<f32>
    where
        S: AsRef<str>,
    {
        let mut sum = vec![0.0; self.dimensions()];
        let mut hits = vec![];
        let mut v = vec![];
        for token in tokens {
            self.feature_vector_into(token.as_ref(), &mut hits, &mut v);
            for (s, x) in sum.iter_mut().zip(&v) {
                *s += x;
            }
        }
        if !tokens.is_empty() {
            let n = tokens.len() as f32;
            for s in &mut sum {
                *s /= n;
            }
        }
        sum
    }

    /// Exports the extractor.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        write_model(wtr, ModelKind::WordFeatureExtractor, MODEL_VERSION, self)
    }

    /// Reads an extractor.
    ///
    /// # Errors
    ///
    /// If the data is not a word feature extractor, or its recorded fingerprint does not match
    /// its contents, an error variant will be returned.
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        expect_header(&mut rdr, ModelKind::WordFeatureExtractor, &[MODEL_VERSION])?;
        let fe: Self = read_payload(&mut rdr)?;
        fe.verify_fingerprint()?;
        Ok(fe)
    }

    /// Checks that the recorded fingerprint matches the contents.
    pub(crate) fn verify_fingerprint(&self) -> Result<()> {
        let found = self.compute_fingerprint()?;
        if found != self.fingerprint {
            return Err(IetkError::fingerprint_mismatch(self.fingerprint, found));
        }
        Ok(())
    }
}

/// Dictionary entries in word order, laid out like an encoded `Vec<(String, Vec<f32>)>`.
struct SortedEntries<'a>(&'a HashMap<String, Vec<f32>>);

impl Encode for SortedEntries<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        Encode::encode(&(entries.len() as u64), encoder)?;
        for (word, v) in entries {
            Encode::encode(word, encoder)?;
            Encode::encode(v, encoder)?;
        }
        Ok(())
    }
}

impl Encode for TotalWordFeatureExtractor {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.morph, encoder)?;
        Encode::encode(&self.dict_dims, encoder)?;
        Encode::encode(&SortedEntries(&self.vectors), encoder)?;
        Encode::encode(&self.fingerprint, encoder)?;
        Ok(())
    }
}

impl Decode for TotalWordFeatureExtractor {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let morph: WordMorphologyFeatureExtractor = Decode::decode(decoder)?;
        let dict_dims: u32 = Decode::decode(decoder)?;
        let entries: Vec<(String, Vec<f32>)> = Decode::decode(decoder)?;
        let fingerprint: u64 = Decode::decode(decoder)?;
        let dims = 1 + dict_dims as usize + morph.num_dimensions();
        if entries.iter().any(|(_, v)| v.len() != dims) {
            return Err(DecodeError::OtherString(
                "word vector size does not match".to_string(),
            ));
        }
        Ok(Self {
            morph,
            dict_dims,
            vectors: entries.into_iter().collect(),
            fingerprint,
        })
    }
}

bincode::impl_borrow_decode!(TotalWordFeatureExtractor);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::substring_set::ApproximateSubstringSet;

    /// Builds a small extractor whose morphology marks capitalized and all-caps words.
    pub(crate) fn make_test_extractor(words: &[&str]) -> TotalWordFeatureExtractor {
        let mut set = ApproximateSubstringSet::new();
        let mut projection = vec![0.0; set.num_buckets() * 3];
        for c in b'A'..=b'Z' {
            let cap = set.add(&format!("*{}", c as char)).unwrap();
            projection[cap as usize * 3] = 1.0;
            for d in b'A'..=b'Z' {
                let caps = set.add(&format!("{}{}", c as char, d as char)).unwrap();
                projection[caps as usize * 3 + 1] = 0.5;
            }
        }
        for c in b'a'..=b'z' {
            let lower = set.add(&format!("{}*", c as char)).unwrap();
            projection[lower as usize * 3 + 2] = 1.0;
        }
        let morph = WordMorphologyFeatureExtractor::new(set, projection, 3).unwrap();
        TotalWordFeatureExtractor::new(
            words
                .iter()
                .enumerate()
                .map(|(i, w)| (w.to_string(), vec![1.0, 0.5 + 0.01 * (i % 3) as f32])),
            morph,
        )
        .unwrap()
    }

    #[test]
    fn test_new_empty_dictionary() {
        let morph = WordMorphologyFeatureExtractor::new(
            ApproximateSubstringSet::with_bits(2),
            vec![0.0; 4],
            1,
        )
        .unwrap();
        assert_eq!(
            "InvalidArgumentError: word_vectors: the dictionary is empty",
            TotalWordFeatureExtractor::new(vec![], morph)
                .unwrap_err()
                .to_string()
        );
    }

    #[test]
    fn test_dimensions_are_constant() {
        let fe = make_test_extractor(&["the", "of", "Boston"]);
        assert_eq!(1 + 2 + 3, fe.dimensions());
        for w in ["the", "Paris", "", "12", "of"] {
            assert_eq!(fe.dimensions(), fe.feature_vector(w).len());
        }
    }

    #[test]
    fn test_oov_indicator() {
        let fe = make_test_extractor(&["the", "of"]);
        let known = fe.feature_vector("the");
        assert_eq!(0.0, known[0]);
        assert!(known[1..3].iter().any(|&x| x != 0.0));
        let unknown = fe.feature_vector("Paris");
        assert_eq!(1.0, unknown[0]);
        assert_eq!(&[0.0, 0.0], &unknown[1..3]);
    }

    #[test]
    fn test_digits_are_canonicalized() {
        let fe = make_test_extractor(&["##", "the"]);
        assert_eq!(fe.feature_vector("##"), fe.feature_vector("42"));
        assert_eq!(0.0, fe.feature_vector("17")[0]);
        assert_eq!(fe.feature_vector("a1b"), fe.feature_vector("a9b"));
    }

    #[test]
    fn test_blocks_are_scaled() {
        let fe = make_test_extractor(&["the", "of", "and"]);
        let mut sum = 0.0;
        for w in fe.words_in_dictionary() {
            let v = fe.feature_vector(w);
            sum += v[1..3].iter().map(|x| x.abs() as f64).sum::<f64>() / 2.0;
        }
        assert!((sum / 3.0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fingerprint() {
        let a = make_test_extractor(&["the", "of"]);
        let b = make_test_extractor(&["the", "of"]);
        let c = make_test_extractor(&["the", "in"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(0, a.fingerprint());
    }

    #[test]
    fn test_encode_decode() {
        let fe = make_test_extractor(&["the", "of", "Boston"]);
        let config = bincode::config::standard();
        let buf = bincode::encode_to_vec(&fe, config).unwrap();
        let (decoded, _): (TotalWordFeatureExtractor, usize) =
            bincode::decode_from_slice(&buf, config).unwrap();
        assert_eq!(fe.fingerprint(), decoded.fingerprint());
        assert_eq!(fe.feature_vector("Boston"), decoded.feature_vector("Boston"));
        assert_eq!(fe.feature_vector("Kyoto"), decoded.feature_vector("Kyoto"));
    }

    #[test]
    fn test_entries_are_encoded_in_word_order() {
        let fe = make_test_extractor(&["of", "the", "Boston", "and"]);
        let config = bincode::config::standard();
        let buf = bincode::encode_to_vec(SortedEntries(&fe.vectors), config).unwrap();
        let (entries, len): (Vec<(String, Vec<f32>)>, usize) =
            bincode::decode_from_slice(&buf, config).unwrap();
        assert_eq!(buf.len(), len);
        let words: Vec<&str> = entries.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(vec!["Boston", "and", "of", "the"], words);
        for (word, v) in &entries {
            assert_eq!(&fe.vectors[word], v);
        }
    }

    #[test]
    fn test_write_read() {
        let fe = make_test_extractor(&["the", "of", "Boston"]);
        let mut buf = vec![];
        fe.write(&mut buf).unwrap();
        let loaded = TotalWordFeatureExtractor::read(buf.as_slice()).unwrap();
        assert_eq!(fe.fingerprint(), loaded.fingerprint());
        assert_eq!(fe.words_in_dictionary(), loaded.words_in_dictionary());

        // Corrupt the last byte of the stored fingerprint.
        let last = buf.len() - 1;
        buf[last] ^= 1;
        assert!(TotalWordFeatureExtractor::read(buf.as_slice()).is_err());
    }

    #[test]
    fn test_mean_vector() {
        let fe = make_test_extractor(&["the", "of"]);
        let mean = fe.mean_vector(&["the", "Paris"]);
        assert_eq!(0.5, mean[0]);
        assert_eq!(vec![0.0; fe.dimensions()], fe.mean_vector::<&str>(&[]));
    }
}
