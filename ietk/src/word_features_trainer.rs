//! Training of [`TotalWordFeatureExtractor`] from an unlabeled corpus.
//!
//! The pipeline counts words, learns distributional vectors by CCA between the left and the
//! right halves of context windows, picks frequent substrings for the morphology features,
//! and learns a projection from substring hits to the distributional space by a second CCA.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cca::{cca, project};
use crate::config::LogLevel;
use crate::count_min_sketch::CountMinSketch;
use crate::errors::{IetkError, Result};
use crate::morphology::WordMorphologyFeatureExtractor;
use crate::substring_set::ApproximateSubstringSet;
use crate::tokenizer::Tokenizer;
use crate::utils::{canonicalize_digits, make_sparse_vector, SparseVector};
use crate::word_features::TotalWordFeatureExtractor;

const CONTEXT_EXTRA_RANK: usize = 40;
const CONTEXT_POWER_ITERS: usize = 5;
const MORPH_EXTRA_RANK: usize = 1000;
const MORPH_POWER_ITERS: usize = 2;
const MAX_SUBSTRING_LEN: usize = 5;

/// Pattern that is always registered so that any digit in a word is seen.
const DIGIT_PATTERN: &str = "#";

/// Hyperparameters of [`WordFeatureTrainer`].
#[derive(Clone, Debug)]
pub struct WordFeatureParams {
    /// Number of most frequent words that get a distributional vector.
    pub vocab_size: usize,

    /// Odd width of the context window centered on each token.
    pub window_size: usize,

    /// Maximum number of sampled context windows.
    pub num_contexts: usize,

    /// Dimensions of each half of the distributional vectors.
    pub num_correlations: usize,

    /// Number of most frequent substrings used by the morphology features.
    pub num_substrings: usize,

    /// Dimensions of the morphology vectors.
    pub num_morph_correlations: usize,

    /// Counters per row of the count-min sketches.
    pub sketch_width: usize,

    /// Seed of the context sampling and of the randomized SVDs.
    pub seed: u64,
}

impl Default for WordFeatureParams {
    fn default() -> Self {
        Self {
            vocab_size: 200_000,
            window_size: 9,
            num_contexts: 50_000_000,
            num_correlations: 90,
            num_substrings: 20_000,
            num_morph_correlations: 90,
            sketch_width: 1_000_000,
            seed: 0,
        }
    }
}

// Keeps the `k` items with the largest counts. Ties keep the earlier item.
struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<(u32, usize, String)>>,
    members: HashSet<String>,
    seen: usize,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::new(),
            members: HashSet::new(),
            seen: 0,
        }
    }

    fn offer(&mut self, item: &str, count: u32) {
        if self.k == 0 || self.members.contains(item) {
            return;
        }
        // Later items rank below earlier ones with the same count.
        let order = usize::MAX - self.seen;
        self.seen += 1;
        if self.heap.len() >= self.k {
            match self.heap.peek() {
                Some(Reverse((min, _, _))) if count > *min => {}
                _ => return,
            }
            if let Some(Reverse((_, _, evicted))) = self.heap.pop() {
                self.members.remove(&evicted);
            }
        }
        self.members.insert(item.to_string());
        self.heap.push(Reverse((count, order, item.to_string())));
    }

    /// Returns the items sorted by descending count.
    fn into_sorted(self) -> Vec<(String, u32)> {
        let mut items: Vec<_> = self.heap.into_iter().map(|Reverse(x)| x).collect();
        items.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        items
            .into_iter()
            .map(|(count, _, item)| (item, count))
            .collect()
    }
}

/// Finds the `max_words` most frequent tokens.
///
/// The corpus is read twice: the first pass fills a count-min sketch and the second keeps the
/// tokens with the largest estimates. Digits are canonicalized to `#`. The result is sorted by
/// descending estimated count.
///
/// # Errors
///
/// If the tokenizer fails to read the corpus, the error will be returned as is.
pub fn count_words<T>(
    tok: &mut T,
    max_words: usize,
    sketch_width: usize,
) -> Result<Vec<(String, u32)>>
where
    T: Tokenizer,
{
    let mut counts = CountMinSketch::new(sketch_width);
    tok.restart();
    while let Some((_, token)) = tok.next_token()? {
        counts.increment(&canonicalize_digits(&token));
    }
    let mut top = TopK::new(max_words);
    tok.restart();
    while let Some((_, token)) = tok.next_token()? {
        let token = canonicalize_digits(&token);
        top.offer(&token, counts.count(&token));
    }
    Ok(top.into_sorted())
}

struct ContextEncoder<'a> {
    vocab: &'a HashMap<String, u32>,
}

impl ContextEncoder<'_> {
    fn word_id(&self, word: &str) -> u32 {
        self.vocab
            .get(word)
            .copied()
            .unwrap_or(self.vocab.len() as u32)
    }

    // One-hot encodes every position of the left and the right half of the window.
    fn encode(&self, window: &VecDeque<String>) -> (SparseVector, SparseVector) {
        let stride = self.vocab.len() as u32 + 1;
        let half = window.len() / 2;
        let left = window
            .iter()
            .take(half)
            .enumerate()
            .map(|(pos, w)| (pos as u32 * stride + self.word_id(w), 1.0))
            .collect();
        let right = window
            .iter()
            .skip(half + 1)
            .enumerate()
            .map(|(pos, w)| (pos as u32 * stride + self.word_id(w), 1.0))
            .collect();
        (make_sparse_vector(left), make_sparse_vector(right))
    }
}

fn for_each_window<T, F>(tok: &mut T, window_size: usize, mut f: F) -> Result<()>
where
    T: Tokenizer,
    F: FnMut(&VecDeque<String>),
{
    let mut window = VecDeque::with_capacity(window_size + 1);
    tok.restart();
    while let Some((_, token)) = tok.next_token()? {
        window.push_back(canonicalize_digits(&token).into_owned());
        if window.len() > window_size {
            window.pop_front();
        }
        if window.len() == window_size {
            f(&window);
        }
    }
    Ok(())
}

/// Learns a distributional vector for every word of `vocab`.
///
/// Context windows are sampled uniformly with a reservoir, CCA relates their left and right
/// halves, and each word gets the mean of the projected halves over all windows centered on
/// it. Vectors have `2 * num_correlations` dimensions.
///
/// # Errors
///
/// If the corpus is shorter than one window or cannot be read, an error variant will be
/// returned.
pub fn word_vectors_from_contexts<T>(
    tok: &mut T,
    vocab: &[String],
    params: &WordFeatureParams,
    log_level: LogLevel,
) -> Result<BTreeMap<String, Vec<f32>>>
where
    T: Tokenizer,
{
    if params.window_size < 3 || params.window_size % 2 == 0 {
        return Err(IetkError::invalid_argument(
            "window_size",
            "must be an odd number of at least 3",
        ));
    }
    let ids: HashMap<String, u32> = vocab
        .iter()
        .enumerate()
        .map(|(i, w)| Ok((w.clone(), u32::try_from(i)?)))
        .collect::<Result<_>>()?;
    let encoder = ContextEncoder { vocab: &ids };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut left = vec![];
    let mut right = vec![];
    let mut seen = 0usize;
    for_each_window(tok, params.window_size, |window| {
        if seen < params.num_contexts {
            let (l, r) = encoder.encode(window);
            left.push(l);
            right.push(r);
        } else {
            let j = rng.gen_range(0..=seen);
            if j < params.num_contexts {
                let (l, r) = encoder.encode(window);
                left[j] = l;
                right[j] = r;
            }
        }
        seen += 1;
    })?;
    if left.is_empty() {
        return Err(IetkError::insufficient_data(
            "the corpus is shorter than one context window",
        ));
    }
    progress!(
        log_level,
        num_windows = seen,
        num_sampled = left.len(),
        "running CCA on context windows"
    );
    let result = cca(
        &left,
        &right,
        params.num_correlations,
        CONTEXT_EXTRA_RANK,
        CONTEXT_POWER_ITERS,
        params.seed,
    )?;
    drop(left);
    drop(right);
    verbose!(log_level, correlations = ?result.correlations, "context CCA done");

    progress!(log_level, "averaging context vectors per word");
    let dims = 2 * params.num_correlations;
    let mut sums: HashMap<String, (Vec<f64>, usize)> = HashMap::new();
    let center = params.window_size / 2;
    for_each_window(tok, params.window_size, |window| {
        let word = &window[center];
        if !ids.contains_key(word) {
            return;
        }
        let (l, r) = encoder.encode(window);
        let (sum, hits) = sums
            .entry(word.clone())
            .or_insert_with(|| (vec![0.0; dims], 0));
        let lp = project(&result.left, &l);
        let rp = project(&result.right, &r);
        for (s, x) in sum.iter_mut().zip(lp.iter().chain(rp.iter())) {
            *s += x;
        }
        *hits += 1;
    })?;
    Ok(sums
        .into_iter()
        .map(|(word, (sum, hits))| {
            let n = hits as f64;
            (word, sum.into_iter().map(|s| (s / n) as f32).collect())
        })
        .collect())
}

/// Returns the substrings of `word` of 1 to 5 bytes that start with `*` at the beginning of
/// the word and end with `*` at its end. Single unanchored characters are skipped.
pub fn anchored_substrings(word: &str) -> Vec<String> {
    let n = word.len();
    let mut result = vec![];
    for start in 0..n {
        for len in 1..=MAX_SUBSTRING_LEN {
            if start + len > n {
                break;
            }
            let Some(part) = word.get(start..start + len) else {
                continue;
            };
            let mut s = String::with_capacity(len + 2);
            if start == 0 {
                s.push(char::from(crate::substring_set::ANCHOR));
            }
            s.push_str(part);
            if start + len == n {
                s.push(char::from(crate::substring_set::ANCHOR));
            }
            if s.len() > 1 {
                result.push(s);
            }
        }
    }
    result
}

/// Finds the `max_substrings` most frequent substrings of the given words.
///
/// The result is sorted by descending estimated count.
pub fn most_common_substrings<'a, I>(
    words: I,
    max_substrings: usize,
    sketch_width: usize,
) -> Vec<(String, u32)>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let mut counts = CountMinSketch::new(sketch_width);
    for word in words.clone() {
        for s in anchored_substrings(word) {
            counts.increment(&s);
        }
    }
    let mut top = TopK::new(max_substrings);
    for word in words {
        for s in anchored_substrings(word) {
            let c = counts.count(&s);
            top.offer(&s, c);
        }
    }
    top.into_sorted()
}

/// Registers substrings in a fresh [`ApproximateSubstringSet`].
///
/// The least frequent substrings are inserted first so that frequent ones win bucket
/// collisions. The digit pattern `#` is always inserted last.
pub fn build_substring_set(substrings: &[(String, u32)]) -> Result<ApproximateSubstringSet> {
    let mut set = ApproximateSubstringSet::new();
    for (s, _) in substrings.iter().rev() {
        set.add(s)?;
    }
    set.add(DIGIT_PATTERN)?;
    Ok(set)
}

/// Learns the morphology projection relating substring hits to distributional vectors.
///
/// # Errors
///
/// If `word_vectors` is empty, an error variant will be returned.
pub fn learn_morphology_projection(
    substrings: ApproximateSubstringSet,
    word_vectors: &BTreeMap<String, Vec<f32>>,
    num_correlations: usize,
    seed: u64,
    log_level: LogLevel,
) -> Result<WordMorphologyFeatureExtractor> {
    let mut left = Vec::with_capacity(word_vectors.len());
    let mut right = Vec::with_capacity(word_vectors.len());
    let mut hits = vec![];
    for (word, v) in word_vectors {
        left.push(
            v.iter()
                .enumerate()
                .map(|(i, &x)| (i as u32, f64::from(x)))
                .collect::<SparseVector>(),
        );
        substrings.find_into(word, &mut hits);
        right.push(hits.iter().map(|&id| (id, 1.0)).collect::<SparseVector>());
    }
    progress!(
        log_level,
        num_words = left.len(),
        "running CCA on words and their substrings"
    );
    let result = cca(
        &left,
        &right,
        num_correlations,
        MORPH_EXTRA_RANK,
        MORPH_POWER_ITERS,
        seed,
    )?;
    verbose!(log_level, correlations = ?result.correlations, "morphology CCA done");

    // Buckets that no word hit get zero rows.
    let mut projection = vec![0.0f32; substrings.num_buckets() * num_correlations];
    for (row, values) in result.right.outer_iter().enumerate() {
        for (col, &x) in values.iter().enumerate() {
            projection[row * num_correlations + col] = x as f32;
        }
    }
    WordMorphologyFeatureExtractor::new(substrings, projection, num_correlations)
}

/// Builds a [`TotalWordFeatureExtractor`] from an unlabeled corpus.
pub struct WordFeatureTrainer {
    params: WordFeatureParams,
    log_level: LogLevel,
}

impl WordFeatureTrainer {
    pub fn new(params: WordFeatureParams) -> Self {
        Self {
            params,
            log_level: LogLevel::default(),
        }
    }

    pub fn params(&self) -> &WordFeatureParams {
        &self.params
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    /// Runs the whole pipeline over the corpus of `tok`, which is read several times.
    ///
    /// # Errors
    ///
    /// If the corpus is too small to learn anything or a part of it cannot be read, an error
    /// variant will be returned.
    pub fn train<T>(&self, tok: &mut T) -> Result<TotalWordFeatureExtractor>
    where
        T: Tokenizer,
    {
        progress!(self.log_level, vocab_size = self.params.vocab_size, "counting words");
        let top_words = count_words(tok, self.params.vocab_size, self.params.sketch_width)?;
        if top_words.is_empty() {
            return Err(IetkError::insufficient_data("the corpus has no token"));
        }
        let vocab: Vec<String> = top_words.into_iter().map(|(w, _)| w).collect();

        let word_vectors =
            word_vectors_from_contexts(tok, &vocab, &self.params, self.log_level)?;
        if word_vectors.is_empty() {
            return Err(IetkError::insufficient_data(
                "no dictionary word appears at the center of a context window",
            ));
        }

        progress!(
            self.log_level,
            num_substrings = self.params.num_substrings,
            "selecting frequent substrings"
        );
        let substrings = most_common_substrings(
            word_vectors.keys().map(String::as_str),
            self.params.num_substrings,
            self.params.sketch_width,
        );
        let set = build_substring_set(&substrings)?;
        let morph = learn_morphology_projection(
            set,
            &word_vectors,
            self.params.num_morph_correlations,
            self.params.seed,
            self.log_level,
        )?;

        let fe = TotalWordFeatureExtractor::new(word_vectors, morph)?;
        progress!(
            self.log_level,
            dimensions = fe.dimensions(),
            num_words = fe.num_words_in_dictionary(),
            "word feature extractor built"
        );
        Ok(fe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tokenizer::{GroupTokenizer, UnigramTokenizer};

    fn corpus() -> String {
        let mut text = String::new();
        for i in 0..60 {
            let animal = ["cat", "dog", "cow"][i % 3];
            let city = ["Paris", "Tokyo", "Lima"][i % 3];
            text.push_str(&format!(
                "the {} sat on the mat in {} . a {} ran to {} in {} . ",
                animal,
                city,
                animal,
                city,
                1900 + i
            ));
        }
        text
    }

    #[test]
    fn test_count_words() {
        let text = "b a b c b a 12 34";
        let mut tok = UnigramTokenizer::new(text);
        let counts = count_words(&mut tok, 3, 1000).unwrap();
        assert_eq!(
            vec![
                ("b".to_string(), 3),
                ("a".to_string(), 2),
                ("##".to_string(), 2),
            ],
            counts
        );
    }

    #[test]
    fn test_train_stops_on_unreadable_file() {
        let dir = std::env::temp_dir().join(format!("ietk-wf-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), corpus()).unwrap();
        std::fs::write(dir.join("c.txt"), corpus()).unwrap();
        let mut tok = GroupTokenizer::new(vec![
            dir.join("a.txt"),
            dir.join("missing.txt"),
            dir.join("c.txt"),
        ]);
        assert!(matches!(
            count_words(&mut tok, 10, 1000),
            Err(IetkError::IOError(_))
        ));
        let mut trainer = WordFeatureTrainer::new(WordFeatureParams::default());
        trainer.set_log_level(LogLevel::Silent);
        assert!(matches!(trainer.train(&mut tok), Err(IetkError::IOError(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_anchored_substrings() {
        let subs = anchored_substrings("abc");
        assert_eq!(
            vec!["*a", "*ab", "*abc*", "b", "bc*", "c*"]
                .into_iter()
                .filter(|s| s.len() > 1)
                .collect::<Vec<_>>(),
            subs
        );
        assert!(anchored_substrings("").is_empty());
    }

    #[test]
    fn test_most_common_substrings() {
        let words = ["walking", "talking", "king"];
        let subs = most_common_substrings(words.iter().copied(), 3, 10_000);
        assert_eq!(3, subs.len());
        assert!(subs.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(subs.iter().all(|(_, c)| *c == 3));
    }

    #[test]
    fn test_build_substring_set() {
        let subs = vec![("ing*".to_string(), 3), ("*wa".to_string(), 1)];
        let set = build_substring_set(&subs).unwrap();
        assert!(!set.find("walking").is_empty());
        assert!(!set.find("#").is_empty());
    }

    #[test]
    fn test_train_small_corpus() {
        let text = corpus();
        let mut tok = UnigramTokenizer::new(&text);
        let params = WordFeatureParams {
            vocab_size: 50,
            window_size: 5,
            num_contexts: 200,
            num_correlations: 4,
            num_substrings: 100,
            num_morph_correlations: 3,
            sketch_width: 10_000,
            seed: 1,
        };
        let mut trainer = WordFeatureTrainer::new(params);
        trainer.set_log_level(LogLevel::Silent);
        let fe = trainer.train(&mut tok).unwrap();
        assert_eq!(1 + 8 + 3, fe.dimensions());
        assert!(fe.num_words_in_dictionary() > 5);
        let v = fe.feature_vector("cat");
        assert_eq!(0.0, v[0]);
        let v = fe.feature_vector("unicorn");
        assert_eq!(1.0, v[0]);
    }
}
