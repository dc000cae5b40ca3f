//! Cross-validated training of multiclass chunk and document classifiers.

use rayon::prelude::*;

use crate::config::LogLevel;
use crate::errors::Result;
use crate::linear::{train_multiclass, MulticlassLinear, SolverOutput};
use crate::tuning::{golden_section_log, stratified_folds, Counts};
use crate::utils::SparseVector;

const NUM_FOLDS: usize = 2;
const MAX_TUNING_EVALS: usize = 15;

/// Hyperparameters of a multiclass classifier.
#[derive(Clone, Debug)]
pub struct ClassifierParams {
    /// Regularization trade-off, used as is when tuning is skipped.
    pub c: f64,

    /// Stopping tolerance of the solver.
    pub epsilon: f64,

    /// Weight of recall relative to precision in the tuning objective.
    pub beta: f64,

    /// Chooses `c` by cross-validation when every label has at least two examples.
    pub auto_tune: bool,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            c: 300.0,
            epsilon: 1e-4,
            beta: 0.5,
            auto_tune: true,
        }
    }
}

/// Counts the correct predictions on the classes other than `reject`.
pub(crate) fn score_predictions(gold: &[u32], predicted: &[u32], reject: Option<u32>) -> Counts {
    let mut counts = Counts::default();
    for (&g, &p) in gold.iter().zip(predicted) {
        let g_kept = Some(g) != reject;
        let p_kept = Some(p) != reject;
        counts.gold += usize::from(g_kept);
        counts.predicted += usize::from(p_kept);
        counts.correct += usize::from(g_kept && g == p);
    }
    counts
}

fn cross_validate(
    xs: &[SparseVector],
    ys: &[u32],
    folds: &[usize],
    reject: Option<u32>,
    num_dims: usize,
    c: f64,
    params: &ClassifierParams,
) -> Result<Counts> {
    let per_fold: Vec<Result<Counts>> = (0..NUM_FOLDS)
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
            let model = train_multiclass(&train_xs, &train_ys, c, params.epsilon, num_dims)?;
            let mut gold = vec![];
            let mut predicted = vec![];
            for ((x, &y), &f) in xs.iter().zip(ys).zip(folds) {
                if f == fold {
                    gold.push(y);
                    predicted.push(model.predict(x).0);
                }
            }
            Ok(score_predictions(&gold, &predicted, reject))
        })
        .collect();
    let mut total = Counts::default();
    for counts in per_fold {
        total += counts?;
    }
    Ok(total)
}

/// Trains a multiclass classifier, choosing `c` by golden-section search in log space over
/// `[0.01, 5000]` on 2-fold cross-validated F-beta.
///
/// `reject` is a label that does not count as a detection, such as "not an entity".
pub(crate) fn train_tuned_multiclass(
    pool: &rayon::ThreadPool,
    xs: &[SparseVector],
    ys: &[u32],
    reject: Option<u32>,
    num_dims: usize,
    params: &ClassifierParams,
    log_level: LogLevel,
) -> Result<MulticlassLinear> {
    let _solver_output = SolverOutput::new(log_level);
    let mut label_counts: hashbrown::HashMap<u32, usize> = hashbrown::HashMap::new();
    for &y in ys {
        *label_counts.entry(y).or_insert(0) += 1;
    }
    let least_common = label_counts.values().copied().min().unwrap_or(0);

    let mut c = params.c;
    if params.auto_tune && least_common > 1 {
        progress!(log_level, "tuning classifier regularization");
        let folds = stratified_folds(ys, NUM_FOLDS);
        let (best_c, best_score) = golden_section_log(
            |c| {
                let score = pool.install(|| {
                    cross_validate(xs, ys, &folds, reject, num_dims, c, params)
                });
                match score {
                    Ok(counts) => {
                        let f = counts.f_beta(params.beta);
                        verbose!(log_level, c, f_beta = f, "classifier tuning point");
                        f
                    }
                    Err(e) => {
                        tracing::warn!(c, error = %e, "classifier tuning point failed");
                        f64::NEG_INFINITY
                    }
                }
            },
            0.01,
            5000.0,
            MAX_TUNING_EVALS,
        );
        if best_score.is_finite() {
            c = best_c;
        }
        progress!(log_level, c, f_beta = best_score, "classifier regularization chosen");
    } else if params.auto_tune {
        progress!(
            log_level,
            c,
            "skipping classifier tuning because a label has a single example"
        );
    }
    progress!(log_level, num_samples = xs.len(), "training classifier");
    train_multiclass(xs, ys, c, params.epsilon, num_dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_predictions_excludes_reject() {
        let gold = [0, 1, 2, 2, 0];
        let predicted = [0, 2, 2, 1, 2];
        let counts = score_predictions(&gold, &predicted, Some(2));
        assert_eq!(
            Counts {
                correct: 1,
                predicted: 2,
                gold: 3,
            },
            counts
        );
        let counts = score_predictions(&gold, &predicted, None);
        assert_eq!(2, counts.correct);
        assert_eq!(5, counts.predicted);
    }

    #[test]
    fn test_train_tuned_multiclass() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let mut xs = vec![];
        let mut ys = vec![];
        for i in 0..6u32 {
            xs.push(vec![(0, 1.0), (3 + i, 0.5)]);
            ys.push(0);
            xs.push(vec![(1, 1.0), (3 + i, 0.5)]);
            ys.push(1);
            xs.push(vec![(2, 1.0), (3 + i, 0.5)]);
            ys.push(2);
        }
        let model = train_tuned_multiclass(
            &pool,
            &xs,
            &ys,
            Some(2),
            10,
            &ClassifierParams::default(),
            LogLevel::Silent,
        )
        .unwrap();
        assert_eq!(0, model.predict(&[(0, 1.0)]).0);
        assert_eq!(1, model.predict(&[(1, 1.0)]).0);
        assert_eq!(2, model.predict(&[(2, 1.0)]).0);
    }
}
