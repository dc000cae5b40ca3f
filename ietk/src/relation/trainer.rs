use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use super::{
    extract_binary_relation, num_relation_feature_dims, BinaryRelation, BinaryRelationDetector,
};
use crate::config::LogLevel;
use crate::errors::{IetkError, Result};
use crate::linear::{train_binary, SolverOutput};
use crate::tuning::{find_max_box, Counts};
use crate::utils::SparseVector;
use crate::word_features::TotalWordFeatureExtractor;

const EPSILON: f64 = 1e-4;
const MAX_TUNING_EVALS: usize = 15;
const TUNING_RADIUS: f64 = 0.25;
const INITIAL_C: f64 = 5000.0;
const MAX_C: f64 = 100_000.0;

/// Trainer of [`BinaryRelationDetector`].
///
/// Positive and negative mention pairs are collected and a linear SVM with separate costs for
/// each class is trained on their features. The two costs are chosen by cross-validated
/// F-beta, with a small beta favoring precision.
pub struct BinaryRelationDetectorTrainer {
    name: String,
    fe: Arc<TotalWordFeatureExtractor>,
    positives: Vec<BinaryRelation>,
    negatives: Vec<BinaryRelation>,
    beta: f64,
    num_folds: usize,
    num_threads: usize,
    log_level: LogLevel,
}

impl BinaryRelationDetectorTrainer {
    /// Creates a trainer for the relation `name` using the word features `fe`.
    ///
    /// Use the word feature extractor of the entity extractor the detector will be paired
    /// with, see [`crate::NamedEntityExtractor::word_feature_extractor()`].
    pub fn new(name: impl Into<String>, fe: Arc<TotalWordFeatureExtractor>) -> Self {
        Self {
            name: name.into(),
            fe,
            positives: vec![],
            negatives: vec![],
            beta: 0.1,
            num_folds: 2,
            num_threads: 4,
            log_level: LogLevel::default(),
        }
    }

    pub fn relation_name(&self) -> &str {
        &self.name
    }

    fn extract(
        &self,
        tokens: &[String],
        arg1: Range<usize>,
        arg2: Range<usize>,
    ) -> Result<BinaryRelation> {
        if super::entities_overlap(&arg1, &arg2) {
            return Err(IetkError::invalid_argument(
                "arg2",
                "relation arguments must not overlap",
            ));
        }
        extract_binary_relation(tokens, arg1, arg2, &self.fe)
    }

    /// Adds a mention pair for which the relation holds.
    ///
    /// # Errors
    ///
    /// If the ranges are invalid or overlap, an error variant will be returned.
    pub fn add_positive_binary_relation(
        &mut self,
        tokens: &[String],
        arg1: Range<usize>,
        arg2: Range<usize>,
    ) -> Result<()> {
        let rel = self.extract(tokens, arg1, arg2)?;
        self.positives.push(rel);
        Ok(())
    }

    /// Adds a mention pair for which the relation does not hold.
    ///
    /// # Errors
    ///
    /// If the ranges are invalid or overlap, an error variant will be returned.
    pub fn add_negative_binary_relation(
        &mut self,
        tokens: &[String],
        arg1: Range<usize>,
        arg2: Range<usize>,
    ) -> Result<()> {
        let rel = self.extract(tokens, arg1, arg2)?;
        self.negatives.push(rel);
        Ok(())
    }

    pub fn num_positive_examples(&self) -> usize {
        self.positives.len()
    }

    pub fn num_negative_examples(&self) -> usize {
        self.negatives.len()
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.beta = beta;
    }

    /// Sets the number of cross-validation folds. Values below 2 are raised to 2.
    pub fn set_num_folds(&mut self, num_folds: usize) {
        self.num_folds = num_folds.max(2);
    }

    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    fn cross_validate(
        &self,
        xs: &[SparseVector],
        ys: &[bool],
        folds: &[usize],
        c: [f64; 2],
        num_dims: usize,
    ) -> Result<Counts> {
        let per_fold: Vec<Result<Counts>> = (0..self.num_folds)
            .into_par_iter()
            .map(|fold| {
                let mut train_xs = vec![];
                let mut train_ys = vec![];
                for ((x, &y), &f) in xs.iter().zip(ys).zip(folds) {
                    if f != fold {
                        train_xs.push(x.clone());
                        train_ys.push(y);
                    }
                }
                let model = train_binary(&train_xs, &train_ys, c[0], c[1], EPSILON, num_dims)?;
                let mut counts = Counts::default();
                for ((x, &y), &f) in xs.iter().zip(ys).zip(folds) {
                    if f == fold {
                        let p = model.score(x) > 0.0;
                        counts.gold += usize::from(y);
                        counts.predicted += usize::from(p);
                        counts.correct += usize::from(y && p);
                    }
                }
                Ok(counts)
            })
            .collect();
        let mut total = Counts::default();
        for counts in per_fold {
            total += counts?;
        }
        Ok(total)
    }

    /// Trains a detector.
    ///
    /// Cost tuning is skipped when there are no more positive examples than folds.
    ///
    /// # Errors
    ///
    /// If either the positive or the negative set is empty,
    /// [`IetkError::InsufficientData`] will be returned.
    pub fn train(&self) -> Result<BinaryRelationDetector> {
        if self.positives.is_empty() || self.negatives.is_empty() {
            return Err(IetkError::insufficient_data(
                "relation training needs positive and negative examples",
            ));
        }
        let _solver_output = SolverOutput::new(self.log_level);
        let num_dims = num_relation_feature_dims(self.fe.dimensions());
        let mut xs = vec![];
        let mut ys = vec![];
        // Interleaved so that consecutive folds see both classes.
        let (mut pos, mut neg) = (self.positives.iter(), self.negatives.iter());
        loop {
            let p = pos.next();
            let n = neg.next();
            if p.is_none() && n.is_none() {
                break;
            }
            if let Some(p) = p {
                xs.push(p.features.clone());
                ys.push(true);
            }
            if let Some(n) = n {
                xs.push(n.features.clone());
                ys.push(false);
            }
        }
        let n = xs.len() as f64;

        let mut c = [INITIAL_C / n; 2];
        if self.positives.len() > self.num_folds {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads)
                .build()
                .map_err(|e| IetkError::invalid_argument("num_threads", e.to_string()))?;
            let mut next = [0usize; 2];
            let folds: Vec<usize> = ys
                .iter()
                .map(|&y| {
                    let k = &mut next[usize::from(y)];
                    let fold = *k % self.num_folds;
                    *k += 1;
                    fold
                })
                .collect();
            progress!(
                self.log_level,
                relation = %self.name,
                num_folds = self.num_folds,
                "tuning relation costs"
            );
            let lo = (1.0 / n).ln();
            let hi = (MAX_C / n).ln();
            let (best, best_score) = find_max_box(
                |p| {
                    let cost = [p[0].exp(), p[1].exp()];
                    match pool.install(|| self.cross_validate(&xs, &ys, &folds, cost, num_dims)) {
                        Ok(counts) => {
                            let f = counts.f_beta(self.beta);
                            verbose!(
                                self.log_level,
                                c_pos = cost[0],
                                c_neg = cost[1],
                                f_beta = f,
                                "relation tuning point"
                            );
                            f
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "relation tuning point failed");
                            f64::NEG_INFINITY
                        }
                    }
                },
                [c[0].ln(), c[1].ln()],
                [lo, lo],
                [hi, hi],
                TUNING_RADIUS,
                MAX_TUNING_EVALS,
            );
            if best_score.is_finite() {
                // Each fold model saw only (folds - 1) / folds of the data.
                let scale = (self.num_folds - 1) as f64 / self.num_folds as f64;
                c = [best[0].exp() * scale, best[1].exp() * scale];
            }
            progress!(
                self.log_level,
                c_pos = c[0],
                c_neg = c[1],
                f_beta = best_score,
                "relation costs chosen"
            );
        } else {
            progress!(
                self.log_level,
                num_positives = self.positives.len(),
                "skipping cost tuning because there are too few positive examples"
            );
        }
        let classifier = train_binary(&xs, &ys, c[0], c[1], EPSILON, num_dims)?;
        Ok(BinaryRelationDetector::new(
            self.name.clone(),
            self.fe.fingerprint(),
            classifier,
        ))
    }
}
