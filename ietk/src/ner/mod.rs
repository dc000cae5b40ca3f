//! Named entity extraction.

mod features;

#[cfg(feature = "train")]
mod trainer;

use std::io::{Read, Write};
use std::ops::Range;
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::conll::ConllSentence;
use crate::errors::{IetkError, Result};
use crate::linear::MulticlassLinear;
use crate::model_file::{expect_header, read_payload, write_model, ModelKind};
use crate::segmenter::SequenceSegmenter;
use crate::tuning::Counts;
use crate::word_features::TotalWordFeatureExtractor;

pub use features::{chunk_features, num_chunk_feature_dims, NER_HASH_DIMS};

#[cfg(feature = "train")]
pub use trainer::NerTrainer;

const MODEL_VERSION: u32 = 1;

/// A detected entity mention.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Token range of the mention.
    pub range: Range<usize>,

    /// Index into [`NamedEntityExtractor::tag_name_strings()`].
    pub tag: usize,

    /// Decision value of the tag. Positive values are confident detections.
    pub score: f64,
}

/// Precision and recall of one label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelEvaluation {
    pub label: String,
    pub counts: Counts,
}

/// Result of [`NamedEntityExtractor::evaluate()`].
#[derive(Clone, Debug, PartialEq)]
pub struct NerEvaluation {
    pub labels: Vec<LabelEvaluation>,
    pub total: Counts,
}

#[derive(Encode)]
struct NerStateRef<'a> {
    tag_names: &'a [String],
    fingerprint: u64,
    fe: &'a TotalWordFeatureExtractor,
    segmenter: &'a SequenceSegmenter,
    classifier: &'a MulticlassLinear,
}

#[derive(Decode)]
struct NerState {
    tag_names: Vec<String>,
    fingerprint: u64,
    fe: TotalWordFeatureExtractor,
    segmenter: SequenceSegmenter,
    classifier: MulticlassLinear,
}

/// Finds entity mentions in tokenized sentences.
///
/// A segmenter proposes chunks and a multiclass classifier labels each of them with a tag or
/// rejects it. The rejecting class has ID `tag_name_strings().len()`.
#[derive(Clone, Debug)]
pub struct NamedEntityExtractor {
    tag_names: Vec<String>,
    fe: Arc<TotalWordFeatureExtractor>,
    segmenter: SequenceSegmenter,
    classifier: MulticlassLinear,
}

impl NamedEntityExtractor {
    /// Assembles an extractor.
    ///
    /// # Errors
    ///
    /// If the segmenter does not consume the vectors of `fe`, or the classifier has a label
    /// beyond the rejecting class, an error variant will be returned.
    pub fn new(
        tag_names: Vec<String>,
        fe: Arc<TotalWordFeatureExtractor>,
        segmenter: SequenceSegmenter,
        classifier: MulticlassLinear,
    ) -> Result<Self> {
        if segmenter.num_dimensions() != fe.dimensions() {
            return Err(IetkError::invalid_argument(
                "segmenter",
                format!(
                    "expects vectors of {} dimensions, but the word features have {}",
                    segmenter.num_dimensions(),
                    fe.dimensions()
                ),
            ));
        }
        if classifier
            .labels()
            .iter()
            .any(|&l| l as usize > tag_names.len())
        {
            return Err(IetkError::invalid_argument(
                "classifier",
                "has a label without a tag name",
            ));
        }
        Ok(Self {
            tag_names,
            fe,
            segmenter,
            classifier,
        })
    }

    /// Returns the tag names in ID order.
    pub fn tag_name_strings(&self) -> &[String] {
        &self.tag_names
    }

    /// Returns the fingerprint of the word feature extractor.
    pub fn fingerprint(&self) -> u64 {
        self.fe.fingerprint()
    }

    pub fn word_feature_extractor(&self) -> &Arc<TotalWordFeatureExtractor> {
        &self.fe
    }

    pub fn segmenter(&self) -> &SequenceSegmenter {
        &self.segmenter
    }

    pub fn classifier(&self) -> &MulticlassLinear {
        &self.classifier
    }

    fn not_an_entity(&self) -> u32 {
        self.tag_names.len() as u32
    }

    /// Finds entities in a sentence.
    ///
    /// The returned mentions are sorted and disjoint.
    pub fn predict<S>(&self, tokens: &[S]) -> Result<Vec<Entity>>
    where
        S: AsRef<str>,
    {
        let vectors = self.fe.lift_sentence(tokens);
        let mut entities = vec![];
        for range in self.segmenter.segment(&vectors)? {
            let x = chunk_features(tokens, &vectors, range.clone())?;
            let (label, score) = self.classifier.predict(&x);
            if label != self.not_an_entity() {
                entities.push(Entity {
                    range,
                    tag: label as usize,
                    score,
                });
            }
        }
        Ok(entities)
    }

    /// Measures the segmenter alone on labeled sentences, ignoring the tags.
    pub fn test_segmenter(&self, sentences: &[ConllSentence]) -> Result<Counts> {
        let mut counts = Counts::default();
        for s in sentences {
            let vectors = self.fe.lift_sentence(&s.tokens);
            let gold: Vec<Range<usize>> = s.chunks().into_iter().map(|c| c.range).collect();
            counts += self
                .segmenter
                .evaluate([(vectors.as_slice(), gold.as_slice())])?;
        }
        Ok(counts)
    }

    /// Measures the whole pipeline on labeled sentences, per tag and in total.
    ///
    /// # Errors
    ///
    /// If a gold label is not one of the tags of this extractor,
    /// [`IetkError::UnknownLabel`] will be returned.
    pub fn evaluate(&self, sentences: &[ConllSentence]) -> Result<NerEvaluation> {
        let mut per_label = vec![Counts::default(); self.tag_names.len()];
        for s in sentences {
            let mut gold = vec![];
            for c in s.chunks() {
                let tag = self
                    .tag_names
                    .iter()
                    .position(|t| *t == c.label)
                    .ok_or_else(|| IetkError::unknown_label(c.label.clone()))?;
                gold.push((c.range, tag));
                per_label[tag].gold += 1;
            }
            for e in self.predict(&s.tokens)? {
                per_label[e.tag].predicted += 1;
                if gold.iter().any(|(r, t)| *r == e.range && *t == e.tag) {
                    per_label[e.tag].correct += 1;
                }
            }
        }
        let mut total = Counts::default();
        for c in &per_label {
            total += *c;
        }
        Ok(NerEvaluation {
            labels: self
                .tag_names
                .iter()
                .cloned()
                .zip(per_label)
                .map(|(label, counts)| LabelEvaluation { label, counts })
                .collect(),
            total,
        })
    }

    /// Exports the extractor together with its word feature extractor.
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        let state = NerStateRef {
            tag_names: &self.tag_names,
            fingerprint: self.fe.fingerprint(),
            fe: &self.fe,
            segmenter: &self.segmenter,
            classifier: &self.classifier,
        };
        write_model(wtr, ModelKind::NamedEntityExtractor, MODEL_VERSION, &state)
    }

    /// Reads an extractor.
    ///
    /// # Errors
    ///
    /// If the data is not an entity extractor, or the embedded word feature extractor is not
    /// the one the model was trained with, an error variant will be returned.
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        expect_header(&mut rdr, ModelKind::NamedEntityExtractor, &[MODEL_VERSION])?;
        let state: NerState = read_payload(&mut rdr)?;
        state.fe.verify_fingerprint()?;
        if state.fe.fingerprint() != state.fingerprint {
            return Err(IetkError::fingerprint_mismatch(
                state.fingerprint,
                state.fe.fingerprint(),
            ));
        }
        Self::new(
            state.tag_names,
            Arc::new(state.fe),
            state.segmenter,
            state.classifier,
        )
    }
}
