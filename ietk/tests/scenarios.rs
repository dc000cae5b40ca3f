#![cfg(feature = "train")]

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ietk::categorizer::document_features;
use ietk::ner::chunk_features;
use ietk::{
    anchored_substrings, build_substring_set, extract_binary_relation, tokenize,
    ApproximateSubstringSet, BinaryRelationDetectorTrainer, LogLevel, NamedEntityExtractor,
    NerTrainer, TextCategorizer, TextCategorizerTrainer,
};

use common::{make_extractor, strings, DICTIONARY};

fn train_ner() -> NamedEntityExtractor {
    let fe = Arc::new(make_extractor(DICTIONARY));
    let mut trainer = NerTrainer::new(fe);
    trainer.set_log_level(LogLevel::Silent);
    trainer.set_num_threads(2);
    trainer
        .add(
            strings(&[
                "My", "name", "is", "Davis", "King", "and", "I", "work", "for", "MIT", ".",
            ]),
            vec![3..5, 9..10],
            strings(&["person", "org"]),
        )
        .unwrap();
    trainer
        .add(
            strings(&[
                "The", "other", "day", "at", "work", "I", "saw", "Brian", "Smith", "from", "CMU",
                ".",
            ]),
            vec![7..9, 10..11],
            strings(&["person", "org"]),
        )
        .unwrap();
    assert_eq!(2, trainer.size());
    trainer.train().unwrap()
}

#[test]
fn test_ner_end_to_end() {
    let ner = train_ner();
    let tokens = ["I", "met", "with", "John", "Becker", "at", "HBU", "."];
    let entities = ner.predict(&tokens).unwrap();
    let found: Vec<(std::ops::Range<usize>, &str)> = entities
        .iter()
        .map(|e| (e.range.clone(), ner.tag_name_strings()[e.tag].as_str()))
        .collect();
    assert_eq!(vec![(3..5, "person"), (6..7, "org")], found);

    let mut buf = vec![];
    ner.write(&mut buf).unwrap();
    let loaded = NamedEntityExtractor::read(buf.as_slice()).unwrap();
    assert_eq!(ner.fingerprint(), loaded.fingerprint());
    assert_eq!(entities, loaded.predict(&tokens).unwrap());
}

#[test]
fn test_ner_scores_are_decision_values() {
    let ner = train_ner();
    let fe = ner.word_feature_extractor();
    let not_an_entity = ner.tag_name_strings().len() as u32;
    let sentences: [&[&str]; 3] = [
        &["I", "met", "with", "John", "Becker", "at", "HBU", "."],
        &["My", "name", "is", "Davis", "King", "and", "I", "work", "for", "MIT", "."],
        &["The", "other", "day", "I", "saw", "Brian", "Smith", "at", "CMU", "."],
    ];
    let mut num_entities = 0;
    for tokens in sentences {
        let vectors = fe.lift_sentence(tokens);
        for e in ner.predict(tokens).unwrap() {
            assert!(e.tag < ner.tag_name_strings().len());
            let x = chunk_features(tokens, &vectors, e.range.clone()).unwrap();
            let own = ner.classifier().score(&x, e.tag as u32).unwrap();
            assert!((own - e.score).abs() < 1e-9, "{} != {}", own, e.score);
            if let Some(reject) = ner.classifier().score(&x, not_an_entity) {
                assert!(e.score > reject, "{} <= {}", e.score, reject);
            }
            for &label in ner.classifier().labels() {
                assert!(ner.classifier().score(&x, label).unwrap() <= e.score);
            }
            num_entities += 1;
        }
    }
    assert!(num_entities >= 2);
}

#[test]
fn test_relation_direction() {
    let ner = train_ner();
    let tokens = strings(&["Ben", "Franklin", "was", "born", "in", "Boston"]);
    let mut trainer =
        BinaryRelationDetectorTrainer::new("born_in", Arc::clone(ner.word_feature_extractor()));
    trainer.set_log_level(LogLevel::Silent);
    trainer
        .add_positive_binary_relation(&tokens, 0..2, 5..6)
        .unwrap();
    trainer
        .add_negative_binary_relation(&tokens, 5..6, 0..2)
        .unwrap();
    let detector = trainer.train().unwrap();

    let forward = ner.extract_binary_relation(&tokens, 0..2, 5..6).unwrap();
    let reverse = ner.extract_binary_relation(&tokens, 5..6, 0..2).unwrap();
    assert!(detector.score(&forward).unwrap() > 0.0);
    assert!(detector.score(&reverse).unwrap() < 0.0);

    let other = make_extractor(&["was", "born"]);
    let foreign = extract_binary_relation(&tokens, 0..2, 5..6, &other).unwrap();
    assert!(detector.score(&foreign).is_err());
}

#[test]
fn test_tokenizer_splits_quotes() {
    let tokens = tokenize("She said \u{201C}hi there.\u{201D} to me.");
    assert_eq!(
        vec!["She", "said", "\u{201C}", "hi", "there", ".", "\u{201D}", "to", "me", "."],
        tokens
    );
}

/// Deterministic lowercase words of 4 to 9 letters.
fn random_words(n: usize, mut state: u64) -> Vec<String> {
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        state >> 33
    };
    (0..n)
        .map(|_| {
            let len = 4 + next() % 6;
            (0..len)
                .map(|_| char::from(b'a' + (next() % 26) as u8))
                .collect()
        })
        .collect()
}

#[test]
fn test_substring_set_recall() {
    let words = random_words(3000, 7);
    let mut counts: HashMap<String, u32> = HashMap::new();
    for w in &words {
        for s in anchored_substrings(w) {
            *counts.entry(s).or_insert(0) += 1;
        }
    }
    // Far more substrings than buckets, so most of them get evicted.
    assert!(counts.len() > 20_000, "{} substrings", counts.len());
    let mut substrings: Vec<(String, u32)> = counts.into_iter().collect();
    substrings.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    substrings.truncate(20_000);
    let set = build_substring_set(&substrings).unwrap();
    assert_eq!(8192, set.num_buckets());

    let registered: HashSet<&str> = substrings.iter().map(|(s, _)| s.as_str()).collect();
    let mut fresh = ApproximateSubstringSet::new();
    let expected: Vec<(&str, Vec<u32>)> = words
        .iter()
        .map(|w| {
            let mut ids: Vec<u32> = anchored_substrings(w)
                .iter()
                .filter(|s| registered.contains(s.as_str()))
                .map(|s| fresh.add(s).unwrap())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            (w.as_str(), ids)
        })
        .collect();
    assert!(expected.iter().all(|(_, ids)| !ids.is_empty()));
    let recall = set.measure_recall(expected.iter().map(|(w, ids)| (*w, ids.as_slice())));
    assert!(recall >= 0.9, "recall = {}", recall);
}

#[test]
fn test_categorizer() {
    let fe = Arc::new(make_extractor(DICTIONARY));
    let mut trainer = TextCategorizerTrainer::new(Arc::clone(&fe));
    trainer.set_log_level(LogLevel::Silent);
    trainer
        .add(
            &["I", "am", "so", "happy", "and", "exciting", "to", "make", "this"],
            "positive",
        )
        .unwrap();
    trainer
        .add(&["What", "a", "black", "and", "bad", "day"], "negative")
        .unwrap();
    let categorizer = trainer.train().unwrap();
    let (label, score) = categorizer
        .predict(&["It", "is", "really", "exciting"])
        .unwrap();
    assert_eq!("positive", label);

    // The returned score is the decision value of the winning label and beats the other one.
    let x = document_features(&["It", "is", "really", "exciting"], &fe).unwrap();
    let id = |name: &str| categorizer.labels().iter().position(|l| l == name).unwrap() as u32;
    let classifier = categorizer.classifier();
    let positive = classifier.score(&x, id("positive")).unwrap();
    let negative = classifier.score(&x, id("negative")).unwrap();
    assert!((score - positive).abs() < 1e-9);
    assert!(positive - negative > 1e-6);

    let mut buf = vec![];
    categorizer.write_without_extractor(&mut buf).unwrap();
    let loaded = TextCategorizer::read_with_extractor(buf.as_slice(), fe).unwrap();
    assert_eq!(
        categorizer.predict(&["bad", "day"]).unwrap(),
        loaded.predict(&["bad", "day"]).unwrap()
    );
}
