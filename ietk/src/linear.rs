//! Linear decision functions over sparse vectors.

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};
use crate::utils::sparse_dot;

/// Multiclass decision function `argmax_c w_c . x + b_c`.
///
/// Only classes that were present in the training data have a weight vector.
#[derive(Clone, Debug, Decode, Encode)]
pub struct MulticlassLinear {
    labels: Vec<u32>,
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl MulticlassLinear {
    /// Creates a decision function from per-class weights.
    ///
    /// # Errors
    ///
    /// If the inputs are not aligned or no class is given, an error variant will be returned.
    pub fn new(labels: Vec<u32>, weights: Vec<Vec<f64>>, biases: Vec<f64>) -> Result<Self> {
        if labels.is_empty() {
            return Err(IetkError::invalid_argument("labels", "must not be empty"));
        }
        if labels.len() != weights.len() || labels.len() != biases.len() {
            return Err(IetkError::invalid_argument(
                "weights",
                "labels, weights, and biases must have the same length",
            ));
        }
        Ok(Self {
            labels,
            weights,
            biases,
        })
    }

    /// Returns the label IDs that have weight vectors.
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Returns the decision value of `label`, or `None` if the label has no weights.
    pub fn score(&self, x: &[(u32, f64)], label: u32) -> Option<f64> {
        let i = self.labels.iter().position(|&l| l == label)?;
        Some(sparse_dot(x, &self.weights[i]) + self.biases[i])
    }

    /// Returns the best label and its decision value.
    ///
    /// Ties go to the class that was seen first during training.
    pub fn predict(&self, x: &[(u32, f64)]) -> (u32, f64) {
        let mut best = (self.labels[0], f64::NEG_INFINITY);
        for ((&label, w), b) in self.labels.iter().zip(&self.weights).zip(&self.biases) {
            let score = sparse_dot(x, w) + b;
            if score > best.1 {
                best = (label, score);
            }
        }
        best
    }
}

/// Binary decision function `w . x + b`.
#[derive(Clone, Debug, Decode, Encode)]
pub struct BinaryLinear {
    weights: Vec<f64>,
    bias: f64,
}

impl BinaryLinear {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn score(&self, x: &[(u32, f64)]) -> f64 {
        sparse_dot(x, &self.weights) + self.bias
    }

    pub fn num_dims(&self) -> usize {
        self.weights.len()
    }
}

#[cfg(feature = "train")]
mod training {
    use liblinear::LibLinearModel;

    use super::*;
    use crate::config::LogLevel;
    use crate::utils::SparseVector;

    /// Silences the solver's stdout output unless the level is verbose. The output is switched
    /// back on when the guard is dropped.
    pub(crate) struct SolverOutput(());

    impl SolverOutput {
        pub(crate) fn new(log_level: LogLevel) -> Self {
            liblinear::toggle_liblinear_stdout_output(log_level.verbose());
            Self(())
        }
    }

    impl Drop for SolverOutput {
        fn drop(&mut self) {
            liblinear::toggle_liblinear_stdout_output(true);
        }
    }

    fn to_liblinear_input(xs: &[SparseVector]) -> Vec<Vec<(u32, f64)>> {
        // liblinear uses 1-based feature indices.
        xs.iter()
            .map(|x| {
                x.iter()
                    .filter(|&&(_, v)| v != 0.0)
                    .map(|&(i, v)| (i + 1, v))
                    .collect()
            })
            .collect()
    }

    fn extract_weights(
        model: &impl LibLinearModel,
        label_idx: i32,
        num_dims: usize,
    ) -> Result<Vec<f64>> {
        let n = num_dims.min(model.num_features());
        let mut w = vec![0.0; num_dims];
        for (fid, wi) in w.iter_mut().enumerate().take(n) {
            *wi = model.feature_coefficient(i32::try_from(fid)? + 1, label_idx);
        }
        Ok(w)
    }

    /// Trains a Crammer-Singer multiclass SVM.
    ///
    /// # Errors
    ///
    /// If fewer than two classes are present, [`IetkError::InsufficientData`] will be returned.
    pub(crate) fn train_multiclass(
        xs: &[SparseVector],
        ys: &[u32],
        cost: f64,
        epsilon: f64,
        num_dims: usize,
    ) -> Result<MulticlassLinear> {
        let mut present: Vec<u32> = ys.to_vec();
        present.sort_unstable();
        present.dedup();
        if present.len() < 2 {
            return Err(IetkError::insufficient_data(
                "a multiclass model needs at least two distinct labels",
            ));
        }
        let mut builder = liblinear::Builder::new();
        let training_input = liblinear::util::TrainingInput::from_sparse_features(
            ys.iter().map(|&y| f64::from(y)).collect(),
            to_liblinear_input(xs),
        )
        .map_err(|e| IetkError::invalid_argument("xs", format!("liblinear error: {:?}", e)))?;
        builder.problem().input_data(training_input).bias(1.0);
        builder
            .parameters()
            .solver_type(liblinear::SolverType::MCSVM_CS)
            .stopping_criterion(epsilon)
            .constraints_violation_cost(cost);
        let model = builder
            .build_model()
            .map_err(|e| IetkError::invalid_argument("xs", e.to_string()))?;

        let mut labels = vec![];
        let mut weights = vec![];
        let mut biases = vec![];
        for (idx, &cls) in model.labels().iter().enumerate() {
            let idx = i32::try_from(idx)?;
            labels.push(u32::try_from(cls)?);
            weights.push(extract_weights(&model, idx, num_dims)?);
            biases.push(model.label_bias(idx));
        }
        MulticlassLinear::new(labels, weights, biases)
    }

    /// Trains an L1-loss binary SVM with separate costs for each class.
    ///
    /// # Errors
    ///
    /// If either class has no example, [`IetkError::InsufficientData`] will be returned.
    pub(crate) fn train_binary(
        xs: &[SparseVector],
        ys: &[bool],
        cost_pos: f64,
        cost_neg: f64,
        epsilon: f64,
        num_dims: usize,
    ) -> Result<BinaryLinear> {
        if !ys.iter().any(|&y| y) || ys.iter().all(|&y| y) {
            return Err(IetkError::insufficient_data(
                "a binary model needs both positive and negative examples",
            ));
        }
        let mut builder = liblinear::Builder::new();
        let training_input = liblinear::util::TrainingInput::from_sparse_features(
            ys.iter().map(|&y| if y { 1.0 } else { -1.0 }).collect(),
            to_liblinear_input(xs),
        )
        .map_err(|e| IetkError::invalid_argument("xs", format!("liblinear error: {:?}", e)))?;
        builder.problem().input_data(training_input).bias(1.0);
        builder
            .parameters()
            .solver_type(liblinear::SolverType::L2R_L1LOSS_SVC_DUAL)
            .stopping_criterion(epsilon)
            .constraints_violation_cost(1.0)
            .cost_penalty_labels(vec![1, -1])
            .cost_penalty_weights(vec![cost_pos, cost_neg]);
        let model = builder
            .build_model()
            .map_err(|e| IetkError::invalid_argument("xs", e.to_string()))?;

        let pos_idx = model
            .labels()
            .iter()
            .position(|&cls| cls == 1)
            .ok_or_else(|| IetkError::invalid_model("the positive class is missing"))?;
        let pos_idx = i32::try_from(pos_idx)?;
        Ok(BinaryLinear::new(
            extract_weights(&model, pos_idx, num_dims)?,
            model.label_bias(pos_idx),
        ))
    }
}

#[cfg(feature = "train")]
pub(crate) use training::{train_binary, train_multiclass, SolverOutput};
