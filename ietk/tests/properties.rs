mod common;

use ietk::conll::{
    bilou_to_bio, bio_to_bilou, chunks_to_bilou, chunks_to_bio, tags_to_chunks, Chunk,
};
use ietk::ner::chunk_features;
use ietk::{
    canonicalize_digits, extract_binary_relation, hash128, BinaryLinear, BinaryRelationDetector,
    IetkError, SequenceSegmenter,
};
use proptest::prelude::*;

use common::{make_extractor, DICTIONARY};

const NUM_DIMS: usize = 2;

fn segmenter_len(max_segment_len: usize) -> usize {
    let s = max_segment_len + 1;
    s * 3 * NUM_DIMS + s + s * s + s
}

fn sentence_strategy() -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(prop::collection::vec(-2.0f32..2.0, NUM_DIMS), 0..20)
}

fn tags_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    let tags = vec![
        "O", "B-PER", "I-PER", "L-PER", "U-PER", "B-ORG", "I-ORG", "L-ORG", "U-ORG",
    ];
    prop::collection::vec(prop::sample::select(tags), 0..12)
}

fn chunks_strategy() -> impl Strategy<Value = (usize, Vec<Chunk>)> {
    // Each element is (gap before the chunk, chunk length, label).
    prop::collection::vec((0usize..3, 1usize..4, prop::sample::select(vec!["PER", "ORG"])), 0..6)
        .prop_flat_map(|parts| {
            let mut chunks = vec![];
            let mut pos = 0;
            for (gap, len, label) in parts {
                pos += gap;
                chunks.push(Chunk {
                    range: pos..pos + len,
                    label: label.to_string(),
                });
                pos += len;
            }
            (pos..pos + 3, Just(chunks))
        })
}

proptest! {
    #[test]
    fn digits_do_not_change_word_vectors(
        prefix in "[a-zA-Z]{0,4}",
        digits in prop::collection::vec(0u32..10, 1..5),
        other in prop::collection::vec(0u32..10, 1..5),
    ) {
        let fe = make_extractor(DICTIONARY);
        let n = digits.len().min(other.len());
        let a: String = digits[..n].iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
        let b: String = other[..n].iter().map(|d| char::from_digit(*d, 10).unwrap()).collect();
        let wa = format!("{}{}", prefix, a);
        let wb = format!("{}{}", prefix, b);
        prop_assert_eq!(canonicalize_digits(&wa), canonicalize_digits(&wb));
        prop_assert_eq!(fe.feature_vector(&wa), fe.feature_vector(&wb));
    }

    #[test]
    fn segments_are_disjoint_and_bounded(
        max_segment_len in 1usize..4,
        seed_weights in prop::collection::vec(-1.0f64..1.0, 80),
        sentence in sentence_strategy(),
    ) {
        let len = segmenter_len(max_segment_len);
        let weights: Vec<f64> = seed_weights.iter().cycle().take(len).copied().collect();
        let segmenter = SequenceSegmenter::new(max_segment_len, NUM_DIMS, weights).unwrap();
        let chunks = segmenter.segment(&sentence).unwrap();
        for c in &chunks {
            prop_assert!(!c.is_empty());
            prop_assert!(c.len() <= max_segment_len);
            prop_assert!(c.end <= sentence.len());
        }
        for w in chunks.windows(2) {
            prop_assert!(w[0].end <= w[1].start);
        }
    }

    #[test]
    fn relation_scoring_checks_fingerprints(
        tokens in prop::collection::vec("[a-zA-Z]{1,6}", 4..10),
    ) {
        let fe_a = make_extractor(DICTIONARY);
        let fe_b = make_extractor(&DICTIONARY[1..]);
        let n = tokens.len();
        let rel = extract_binary_relation(&tokens, 0..1, n - 1..n, &fe_a).unwrap();
        let dims = 2 * fe_a.dimensions() + 100_000;
        let foreign = BinaryRelationDetector::new(
            "r".to_string(),
            fe_b.fingerprint(),
            BinaryLinear::new(vec![0.0; dims], 0.0),
        );
        let own = BinaryRelationDetector::new(
            "r".to_string(),
            fe_a.fingerprint(),
            BinaryLinear::new(vec![0.0; dims], 0.0),
        );
        prop_assert!(matches!(foreign.score(&rel), Err(IetkError::FingerprintMismatch(_))));
        prop_assert!(own.score(&rel).is_ok());
    }

    #[test]
    fn bio_and_bilou_round_trip((len, chunks) in chunks_strategy()) {
        let bio = chunks_to_bio(len, &chunks);
        let bilou = chunks_to_bilou(len, &chunks);
        prop_assert_eq!(&bilou, &bio_to_bilou(&bilou_to_bio(&bilou)));
        prop_assert_eq!(&bio, &bilou_to_bio(&bio_to_bilou(&bio)));
        prop_assert_eq!(&bilou, &bio_to_bilou(&bio));
    }

    #[test]
    fn malformed_tags_are_repaired(tags in tags_strategy()) {
        let chunks = tags_to_chunks(&tags);
        let mut covered = vec![false; tags.len()];
        for c in &chunks {
            prop_assert!(!c.range.is_empty());
            prop_assert!(c.range.end <= tags.len());
            for i in c.range.clone() {
                prop_assert!(!covered[i]);
                covered[i] = true;
            }
        }
        for w in chunks.windows(2) {
            prop_assert!(w[0].range.end <= w[1].range.start);
        }
        for (tag, is_covered) in tags.iter().zip(&covered) {
            prop_assert_eq!(*tag != "O", *is_covered);
        }

        let bilou = bio_to_bilou(&tags);
        let bio = bilou_to_bio(&tags);
        prop_assert_eq!(&bilou, &chunks_to_bilou(tags.len(), &chunks));
        prop_assert_eq!(&bio, &chunks_to_bio(tags.len(), &chunks));
        prop_assert_eq!(&bilou, &bio_to_bilou(&bio));
        prop_assert_eq!(&bio, &bilou_to_bio(&bilou));
    }

    #[test]
    fn hashed_features_are_deterministic(
        tokens in prop::collection::vec("[a-zA-Z0-9]{1,8}", 1..8),
        seed in any::<u64>(),
    ) {
        let data = tokens.concat();
        prop_assert_eq!(hash128(data.as_bytes(), seed), hash128(data.as_bytes(), seed));
        let fe = make_extractor(DICTIONARY);
        let vectors = fe.lift_sentence(&tokens);
        let range = 0..tokens.len();
        prop_assert_eq!(
            chunk_features(&tokens, &vectors, range.clone()).unwrap(),
            chunk_features(&tokens.clone(), &fe.lift_sentence(&tokens), range).unwrap()
        );
    }

    #[test]
    fn only_unknown_words_raise_the_indicator(word in "[a-z]{1,8}") {
        let fe = make_extractor(DICTIONARY);
        let v = fe.feature_vector(&word);
        let d_word = fe.dict_dimensions();
        let known = DICTIONARY.contains(&word.as_str());
        if known {
            prop_assert_eq!(0.0, v[0]);
        } else {
            prop_assert_eq!(1.0, v[0]);
            prop_assert!(v[1..1 + d_word].iter().all(|&x| x == 0.0));
        }
    }
}
