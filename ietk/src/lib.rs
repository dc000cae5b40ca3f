#![cfg_attr(docsrs, feature(doc_cfg))]

//! # ietk
//!
//! ietk is an information extraction toolkit. It finds named entities, detects binary
//! relations between entity mentions, and categorizes documents. Every model is built on
//! top of a [`TotalWordFeatureExtractor`], which maps each word to a dense vector learned
//! from an unlabeled corpus.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{prelude::*, stdin, BufReader};
//!
//! use ietk::{tokenize, NamedEntityExtractor};
//!
//! let f = BufReader::new(File::open("ner_model.dat").unwrap());
//! let ner = NamedEntityExtractor::read(f).unwrap();
//!
//! for line in stdin().lock().lines() {
//!     let tokens = tokenize(&line.unwrap());
//!     for entity in ner.predict(&tokens).unwrap() {
//!         println!(
//!             "{} {}",
//!             ner.tag_name_strings()[entity.tag],
//!             tokens[entity.range].join(" ")
//!         );
//!     }
//! }
//! ```
//!
//! Training requires **crate feature** `train`. For more details, see [`NerTrainer`],
//! [`BinaryRelationDetectorTrainer`], [`TextCategorizerTrainer`], and [`WordFeatureTrainer`].

#[macro_use]
mod config;

mod hashing;
mod linear;
mod model_file;
mod morphology;
mod stem;
mod substring_set;
mod tuning;
mod utils;
mod word_features;

pub mod categorizer;
pub mod conll;
pub mod errors;
pub mod ner;
pub mod relation;
pub mod segmenter;
pub mod tokenizer;

#[cfg(feature = "train")]
mod cca;
#[cfg(feature = "train")]
mod classifier;
#[cfg(feature = "train")]
mod count_min_sketch;
#[cfg(feature = "train")]
mod word_features_trainer;

#[cfg(feature = "gigaword")]
mod corpus;

pub use categorizer::TextCategorizer;
pub use config::LogLevel;
pub use conll::{read_conll, read_conll_file, Chunk, ConllSentence};
pub use errors::{IetkError, Result};
pub use hashing::{hash128, hash64};
pub use linear::{BinaryLinear, MulticlassLinear};
pub use model_file::{read_header, ModelKind};
pub use morphology::WordMorphologyFeatureExtractor;
pub use ner::{Entity, LabelEvaluation, NamedEntityExtractor, NerEvaluation};
pub use relation::{
    entities_overlap, extract_binary_relation, BinaryRelation, BinaryRelationDetector,
};
pub use segmenter::SequenceSegmenter;
pub use stem::stem_word;
pub use substring_set::ApproximateSubstringSet;
pub use tokenizer::{tokenize, tokenize_with_offsets, Tokenizer};
pub use tuning::{f_beta, Counts};
pub use utils::{canonicalize_digits, SparseVector};
pub use word_features::TotalWordFeatureExtractor;

#[cfg(feature = "train")]
pub use categorizer::TextCategorizerTrainer;
#[cfg(feature = "train")]
pub use classifier::ClassifierParams;
#[cfg(feature = "train")]
pub use count_min_sketch::CountMinSketch;
#[cfg(feature = "train")]
pub use ner::NerTrainer;
#[cfg(feature = "train")]
pub use relation::BinaryRelationDetectorTrainer;
#[cfg(feature = "train")]
pub use segmenter::{SegmenterParams, SegmenterTrainer};
#[cfg(feature = "train")]
pub use word_features_trainer::{
    anchored_substrings, build_substring_set, count_words, learn_morphology_projection,
    most_common_substrings, word_vectors_from_contexts, WordFeatureParams, WordFeatureTrainer,
};

#[cfg(feature = "gigaword")]
pub use corpus::{GigawordDocument, GigawordReader};
