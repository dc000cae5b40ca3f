#![allow(dead_code)]

use ietk::{ApproximateSubstringSet, TotalWordFeatureExtractor, WordMorphologyFeatureExtractor};

/// Function words and punctuation that appear in the scenario sentences.
pub const DICTIONARY: &[&str] = &[
    "My", "name", "is", "and", "I", "work", "for", ".", "The", "other", "day", "at", "saw",
    "from", "met", "with", "was", "born", "in", "It", "really", "a", "am", "so", "to",
];

/// Builds a small extractor whose morphology marks capitalized words, all-caps pairs, and
/// words ending in a lowercase letter.
pub fn make_extractor(words: &[&str]) -> TotalWordFeatureExtractor {
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
        words.iter().enumerate().map(|(i, w)| {
            let x = (i % 5) as f32 * 0.1;
            (w.to_string(), vec![1.0, x, 0.5 - x])
        }),
        morph,
    )
    .unwrap()
}

pub fn strings(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}
