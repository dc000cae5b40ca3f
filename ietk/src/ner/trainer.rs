use std::ops::Range;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{chunk_features, num_chunk_feature_dims, NamedEntityExtractor};
use crate::classifier::{train_tuned_multiclass, ClassifierParams};
use crate::config::LogLevel;
use crate::errors::{IetkError, Result};
use crate::segmenter::{SegmenterParams, SegmenterTrainer};
use crate::utils::{Indexer, SparseVector};
use crate::word_features::TotalWordFeatureExtractor;

const SHUFFLE_SEED: u64 = 0;

struct Instance {
    tokens: Vec<String>,
    chunks: Vec<Range<usize>>,
    tags: Vec<usize>,
}

/// Trainer of [`NamedEntityExtractor`].
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use std::sync::Arc;
///
/// use ietk::{NerTrainer, TotalWordFeatureExtractor};
///
/// let fe = TotalWordFeatureExtractor::read(File::open("total_word_feature_extractor.dat")?)?;
/// let mut trainer = NerTrainer::new(Arc::new(fe));
/// trainer.add(
///     ["My", "name", "is", "Davis", "King", "and", "I", "work", "for", "MIT", "."]
///         .iter()
///         .map(|s| s.to_string())
///         .collect(),
///     vec![3..5, 9..10],
///     vec!["person".to_string(), "org".to_string()],
/// )?;
/// let ner = trainer.train()?;
/// ner.write(File::create("ner_model.dat")?)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct NerTrainer {
    fe: Arc<TotalWordFeatureExtractor>,
    tags: Indexer<String>,
    instances: Vec<Instance>,
    segmenter_params: SegmenterParams,
    classifier_params: ClassifierParams,
    num_threads: usize,
    log_level: LogLevel,
}

impl NerTrainer {
    pub fn new(fe: Arc<TotalWordFeatureExtractor>) -> Self {
        Self {
            fe,
            tags: Indexer::new(),
            instances: vec![],
            segmenter_params: SegmenterParams::default(),
            classifier_params: ClassifierParams::default(),
            num_threads: 4,
            log_level: LogLevel::default(),
        }
    }

    /// Adds a sentence with its entity mentions.
    ///
    /// # Errors
    ///
    /// If `chunks` and `labels` have different lengths, or a chunk is empty, out of range, or
    /// overlaps another, an error variant will be returned.
    pub fn add(
        &mut self,
        tokens: Vec<String>,
        chunks: Vec<Range<usize>>,
        labels: Vec<String>,
    ) -> Result<()> {
        if chunks.len() != labels.len() {
            return Err(IetkError::invalid_argument(
                "labels",
                "there must be one label per chunk",
            ));
        }
        let mut sorted: Vec<&Range<usize>> = chunks.iter().collect();
        sorted.sort_unstable_by_key(|c| c.start);
        for c in &sorted {
            if c.start >= c.end || c.end > tokens.len() {
                return Err(IetkError::invalid_argument(
                    "chunks",
                    format!(
                        "invalid range {:?} for a sentence of {} tokens",
                        c,
                        tokens.len()
                    ),
                ));
            }
        }
        if sorted.windows(2).any(|w| w[0].end > w[1].start) {
            return Err(IetkError::invalid_argument(
                "chunks",
                "entity ranges must not overlap",
            ));
        }
        let tags = labels.iter().map(|l| self.tags.get_id(l.as_str())).collect();
        self.instances.push(Instance {
            tokens,
            chunks,
            tags,
        });
        Ok(())
    }

    /// Returns the number of added sentences.
    pub fn size(&self) -> usize {
        self.instances.len()
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.classifier_params.beta = beta;
    }

    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn set_max_segment_len(&mut self, max_segment_len: usize) {
        self.segmenter_params.max_segment_len = max_segment_len.max(1);
    }

    pub fn set_segmenter_params(&mut self, params: SegmenterParams) {
        self.segmenter_params = params;
    }

    pub fn set_classifier_params(&mut self, params: ClassifierParams) {
        self.classifier_params = params;
    }

    /// Trains the segmenter and then the chunk classifier.
    ///
    /// The maximum segment length is raised to the longest training mention if necessary.
    ///
    /// # Errors
    ///
    /// If no sentence has been added, or the classifier data contains fewer than two classes,
    /// an error variant will be returned.
    pub fn train(&self) -> Result<NamedEntityExtractor> {
        if self.instances.is_empty() {
            return Err(IetkError::insufficient_data(
                "no training sentence has been added",
            ));
        }
        let lifted: Vec<Vec<Vec<f32>>> = self
            .instances
            .iter()
            .map(|inst| self.fe.lift_sentence(&inst.tokens))
            .collect();

        let mut params = self.segmenter_params.clone();
        let longest = self
            .instances
            .iter()
            .flat_map(|inst| inst.chunks.iter().map(|c| c.len()))
            .max()
            .unwrap_or(0);
        if longest > params.max_segment_len {
            progress!(
                self.log_level,
                max_segment_len = longest,
                "raising the maximum segment length to fit the training mentions"
            );
            params.max_segment_len = longest;
        }
        let mut seg_trainer = SegmenterTrainer::new(params);
        seg_trainer.set_num_threads(self.num_threads);
        seg_trainer.set_log_level(self.log_level);
        for (inst, vectors) in self.instances.iter().zip(&lifted) {
            let mut chunks = inst.chunks.clone();
            chunks.sort_unstable_by_key(|c| c.start);
            seg_trainer.add(vectors.clone(), chunks)?;
        }
        progress!(
            self.log_level,
            num_sentences = self.instances.len(),
            "training the chunk segmenter"
        );
        let segmenter = seg_trainer.train()?;

        let not_an_entity = u32::try_from(self.tags.len())?;
        let mut samples: Vec<(SparseVector, u32)> = vec![];
        for (inst, vectors) in self.instances.iter().zip(&lifted) {
            let mut ranges: Vec<(Range<usize>, u32)> = inst
                .chunks
                .iter()
                .cloned()
                .zip(inst.tags.iter().map(|&t| t as u32))
                .collect();
            for r in segmenter.segment(vectors)? {
                if !inst.chunks.contains(&r) {
                    ranges.push((r, not_an_entity));
                }
            }
            for (r, label) in ranges {
                samples.push((chunk_features(&inst.tokens, vectors, r)?, label));
            }
        }
        samples.shuffle(&mut StdRng::seed_from_u64(SHUFFLE_SEED));
        let (xs, ys): (Vec<SparseVector>, Vec<u32>) = samples.into_iter().unzip();
        progress!(
            self.log_level,
            num_chunks = xs.len(),
            num_tags = self.tags.len(),
            "training the chunk classifier"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| IetkError::invalid_argument("num_threads", e.to_string()))?;
        let classifier = train_tuned_multiclass(
            &pool,
            &xs,
            &ys,
            Some(not_an_entity),
            num_chunk_feature_dims(self.fe.dimensions()),
            &self.classifier_params,
            self.log_level,
        )?;

        NamedEntityExtractor::new(
            self.tags.keys().to_vec(),
            Arc::clone(&self.fe),
            segmenter,
            classifier,
        )
    }
}
