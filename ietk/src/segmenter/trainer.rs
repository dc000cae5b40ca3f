use std::ops::Range;

use hashbrown::HashSet;
use rayon::prelude::*;

use super::{chunks_to_states, Layout, SequenceSegmenter, DEFAULT_MAX_SEGMENT_LEN};
use crate::config::LogLevel;
use crate::errors::{IetkError, Result};
use crate::tuning::find_max_box;
use crate::utils::{add_scaled_sparse, make_sparse_vector, sparse_dot, SparseVector};

const NUM_FOLDS: usize = 2;
const MAX_TUNING_EVALS: usize = 15;
const MAX_DUAL_PASSES: usize = 100;

/// Hyperparameters of the structural SVM.
#[derive(Clone, Debug)]
pub struct SegmenterParams {
    /// Regularization trade-off.
    pub c: f64,

    /// Loss of a gold segment that is not decoded. A wrong segment costs 1.
    pub loss_per_missed_segment: f64,

    /// Stopping tolerance on the constraint violation.
    pub epsilon: f64,

    pub max_iters: usize,

    /// Number of constraints kept per sentence.
    pub cache_size: usize,

    pub max_segment_len: usize,

    /// Tunes `c` and `loss_per_missed_segment` by cross-validation when possible.
    pub auto_tune: bool,
}

impl Default for SegmenterParams {
    fn default() -> Self {
        Self {
            c: 20.0,
            loss_per_missed_segment: 3.0,
            epsilon: 0.01,
            max_iters: 2000,
            cache_size: 5,
            max_segment_len: DEFAULT_MAX_SEGMENT_LEN,
            auto_tune: true,
        }
    }
}

struct Sample {
    sentence: Vec<Vec<f32>>,
    chunks: Vec<Range<usize>>,
    states: Vec<usize>,
}

struct Constraint {
    psi: SparseVector,
    norm2: f64,
    loss: f64,
    alpha: f64,
}

impl Constraint {
    #[inline(always)]
    fn gradient(&self, w: &[f64]) -> f64 {
        self.loss - sparse_dot(&self.psi, w)
    }
}

fn sparse_sparse_dot(a: &[(u32, f64)], b: &[(u32, f64)]) -> f64 {
    let mut i = 0;
    let mut j = 0;
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

/// Loss-augmented decoding: returns `Phi(y) - Phi(y_hat)` and `loss(y, y_hat)`.
fn find_most_violated(
    layout: &Layout,
    w: &[f64],
    sample: &Sample,
    loss_missed: f64,
) -> (SparseVector, f64) {
    let gold: HashSet<(usize, usize)> = sample.chunks.iter().map(|c| (c.start, c.end)).collect();
    let mut loss = loss_missed * gold.len() as f64;
    let states = layout.viterbi(w, &sample.sentence, |b, e| {
        if gold.contains(&(b, e)) {
            -loss_missed
        } else {
            1.0
        }
    });
    for c in super::states_to_chunks(&states) {
        loss += if gold.contains(&(c.start, c.end)) {
            -loss_missed
        } else {
            1.0
        };
    }
    let mut psi = layout.joint_features(&sample.sentence, &sample.states);
    psi.extend(
        layout
            .joint_features(&sample.sentence, &states)
            .into_iter()
            .map(|(i, x)| (i, -x)),
    );
    let psi = make_sparse_vector(psi)
        .into_iter()
        .filter(|&(_, x)| x.abs() > 1e-12)
        .collect();
    (psi, loss)
}

/// Dual coordinate ascent over the cached constraints.
///
/// The alphas of one sentence sum to at most `bound`. When a sentence is at the bound, weight
/// moves from its worst constraint to the most violated one.
fn optimize_dual(caches: &mut [Vec<Constraint>], w: &mut [f64], bound: f64) {
    for _ in 0..MAX_DUAL_PASSES {
        let mut max_change = 0f64;
        for cache in caches.iter_mut() {
            for j in 0..cache.len() {
                let g = cache[j].gradient(w);
                let sum: f64 = cache.iter().map(|c| c.alpha).sum();
                let room = (bound - sum).max(0.0);
                let delta = (g / cache[j].norm2).clamp(-cache[j].alpha, room);
                if delta != 0.0 {
                    cache[j].alpha += delta;
                    add_scaled_sparse(w, &cache[j].psi, delta);
                    max_change = max_change.max(delta.abs());
                }
                if g <= 0.0 || room > delta {
                    continue;
                }
                let gj = cache[j].gradient(w);
                let worst = (0..cache.len())
                    .filter(|&k| k != j && cache[k].alpha > 0.0)
                    .map(|k| (k, cache[k].gradient(w)))
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                let Some((k, gk)) = worst else {
                    continue;
                };
                if gj <= gk {
                    continue;
                }
                let dist2 = cache[j].norm2 + cache[k].norm2
                    - 2.0 * sparse_sparse_dot(&cache[j].psi, &cache[k].psi);
                if dist2 <= 1e-12 {
                    continue;
                }
                let delta = ((gj - gk) / dist2).min(cache[k].alpha);
                cache[j].alpha += delta;
                cache[k].alpha -= delta;
                add_scaled_sparse(w, &cache[j].psi, delta);
                add_scaled_sparse(w, &cache[k].psi, -delta);
                max_change = max_change.max(delta);
            }
        }
        if max_change < 1e-9 {
            break;
        }
    }
}

/// Trainer of [`SequenceSegmenter`] by an n-slack cutting-plane structural SVM.
pub struct SegmenterTrainer {
    params: SegmenterParams,
    num_threads: usize,
    log_level: LogLevel,
    num_dims: Option<usize>,
    samples: Vec<Sample>,
}

impl SegmenterTrainer {
    pub fn new(params: SegmenterParams) -> Self {
        Self {
            params,
            num_threads: 4,
            log_level: LogLevel::default(),
            num_dims: None,
            samples: vec![],
        }
    }

    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn params(&self) -> &SegmenterParams {
        &self.params
    }

    /// Adds a sentence of word vectors and its gold segments.
    ///
    /// # Errors
    ///
    /// If the vectors have inconsistent sizes, or a segment is empty, out of range,
    /// overlapping, or longer than the maximum segment length, an error variant will be
    /// returned.
    pub fn add(&mut self, sentence: Vec<Vec<f32>>, chunks: Vec<Range<usize>>) -> Result<()> {
        let dims = self
            .num_dims
            .or_else(|| sentence.first().map(|v| v.len()));
        if let Some(dims) = dims {
            if sentence.iter().any(|v| v.len() != dims) {
                return Err(IetkError::invalid_argument(
                    "sentence",
                    "all word vectors must have the same size",
                ));
            }
            self.num_dims = Some(dims);
        }
        let states = chunks_to_states(sentence.len(), &chunks, self.params.max_segment_len)?;
        self.samples.push(Sample {
            sentence,
            chunks,
            states,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn layout(&self) -> Layout {
        Layout::new(self.params.max_segment_len, self.num_dims.unwrap_or(0))
    }

    /// Runs the cutting-plane solver and stores the weights into `w`.
    ///
    /// If the iteration cap is hit, `w` holds the last iterate and
    /// [`NotConverged`](IetkError::NotConverged) is returned.
    fn solve(
        &self,
        pool: &rayon::ThreadPool,
        samples: &[&Sample],
        c: f64,
        loss_missed: f64,
        w: &mut Vec<f64>,
    ) -> Result<()> {
        let layout = self.layout();
        let bound = c / samples.len() as f64;
        w.clear();
        w.resize(layout.len(), 0.0);
        let mut caches: Vec<Vec<Constraint>> = samples.iter().map(|_| vec![]).collect();
        for iter in 0..self.params.max_iters {
            let found: Vec<(SparseVector, f64)> = pool.install(|| {
                samples
                    .par_iter()
                    .map(|s| find_most_violated(&layout, w.as_slice(), s, loss_missed))
                    .collect()
            });
            let mut num_added = 0;
            let mut risk = 0.0;
            for (cache, (psi, loss)) in caches.iter_mut().zip(found) {
                let slack = cache
                    .iter()
                    .map(|c| c.gradient(w.as_slice()))
                    .fold(0f64, f64::max);
                let violation = loss - sparse_dot(&psi, w.as_slice());
                risk += violation.max(0.0);
                let norm2: f64 = psi.iter().map(|&(_, x)| x * x).sum();
                if violation <= slack + self.params.epsilon || norm2 == 0.0 {
                    continue;
                }
                num_added += 1;
                cache.push(Constraint {
                    psi,
                    norm2,
                    loss,
                    alpha: 0.0,
                });
                if cache.len() > self.params.cache_size {
                    // The new constraint stays even though its alpha is still zero.
                    let k = cache[..cache.len() - 1]
                        .iter()
                        .enumerate()
                        .min_by(|a, b| a.1.alpha.total_cmp(&b.1.alpha))
                        .map_or(0, |(k, _)| k);
                    let evicted = cache.swap_remove(k);
                    add_scaled_sparse(w, &evicted.psi, -evicted.alpha);
                }
            }
            verbose!(
                self.log_level,
                iter,
                risk = risk / samples.len() as f64,
                num_added,
                "cutting plane iteration"
            );
            if num_added == 0 {
                return Ok(());
            }
            optimize_dual(&mut caches, w, bound);
        }
        Err(IetkError::not_converged(self.params.max_iters))
    }

    fn cross_validate(&self, pool: &rayon::ThreadPool, c: f64, loss_missed: f64) -> f64 {
        let layout = self.layout();
        let mut recall = 0.0;
        let mut num_folds = 0;
        for fold in 0..NUM_FOLDS {
            let train: Vec<&Sample> = self
                .samples
                .iter()
                .enumerate()
                .filter(|(i, _)| i % NUM_FOLDS != fold)
                .map(|(_, s)| s)
                .collect();
            let test: Vec<&Sample> = self
                .samples
                .iter()
                .enumerate()
                .filter(|(i, _)| i % NUM_FOLDS == fold)
                .map(|(_, s)| s)
                .collect();
            if train.is_empty() || test.is_empty() {
                continue;
            }
            let mut w = vec![];
            if let Err(e) = self.solve(pool, &train, c, loss_missed, &mut w) {
                verbose!(self.log_level, fold, error = %e, "discarding segmenter tuning point");
                return f64::NEG_INFINITY;
            }
            let Ok(seg) =
                SequenceSegmenter::new(self.params.max_segment_len, layout.num_dims, w)
            else {
                return f64::NEG_INFINITY;
            };
            let counts = match seg.evaluate(
                test.iter()
                    .map(|s| (s.sentence.as_slice(), s.chunks.as_slice())),
            ) {
                Ok(counts) => counts,
                Err(_) => return f64::NEG_INFINITY,
            };
            recall += counts.recall();
            num_folds += 1;
        }
        if num_folds == 0 {
            f64::NEG_INFINITY
        } else {
            recall / num_folds as f64
        }
    }

    /// Trains a segmenter.
    ///
    /// With more than one sentence and `auto_tune` enabled, `c` and the missed-segment loss
    /// are first chosen by 2-fold cross-validated recall. Settings that do not converge are
    /// discarded, and the defaults are kept if none succeeds.
    ///
    /// # Errors
    ///
    /// If no sentence was added or the thread pool cannot be built, an error variant will be
    /// returned.
    pub fn train(&self) -> Result<SequenceSegmenter> {
        if self.samples.is_empty() {
            return Err(IetkError::insufficient_data(
                "the segmenter needs at least one sentence",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| IetkError::invalid_argument("num_threads", e.to_string()))?;

        let mut c = self.params.c;
        let mut loss_missed = self.params.loss_per_missed_segment;
        if self.params.auto_tune && self.samples.len() > 1 {
            progress!(self.log_level, "tuning segmenter hyperparameters");
            let (best, recall) = find_max_box(
                |p| {
                    let recall = self.cross_validate(&pool, p[0].exp(), p[1]);
                    verbose!(
                        self.log_level,
                        c = p[0].exp(),
                        loss_per_missed_segment = p[1],
                        recall,
                        "segmenter tuning point"
                    );
                    recall
                },
                [c.ln(), loss_missed],
                [0.1f64.ln(), 1.0],
                [100f64.ln(), 10.0],
                0.25,
                MAX_TUNING_EVALS,
            );
            if recall.is_finite() {
                c = best[0].exp();
                loss_missed = best[1];
            } else {
                tracing::warn!("no segmenter tuning point converged; using the default hyperparameters");
            }
            progress!(
                self.log_level,
                c,
                loss_per_missed_segment = loss_missed,
                recall,
                "segmenter hyperparameters chosen"
            );
        }

        progress!(
            self.log_level,
            num_sentences = self.samples.len(),
            "training segmenter"
        );
        let samples: Vec<&Sample> = self.samples.iter().collect();
        let mut w = vec![];
        match self.solve(&pool, &samples, c, loss_missed, &mut w) {
            Ok(()) => {}
            Err(e @ IetkError::NotConverged(_)) => {
                tracing::warn!(error = %e, "keeping the last segmenter weights");
            }
            Err(e) => return Err(e),
        }
        SequenceSegmenter::new(self.params.max_segment_len, self.layout().num_dims, w)
    }
}
