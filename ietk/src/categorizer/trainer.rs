use std::sync::Arc;

use super::{
    bag_of_words_features, document_features, num_document_feature_dims, TextCategorizer,
};
use crate::classifier::{train_tuned_multiclass, ClassifierParams};
use crate::config::LogLevel;
use crate::errors::{IetkError, Result};
use crate::utils::{Indexer, SparseVector};
use crate::word_features::TotalWordFeatureExtractor;

/// Trainer of [`TextCategorizer`].
///
/// # Examples
///
/// ```
/// use ietk::TextCategorizerTrainer;
///
/// let mut trainer = TextCategorizerTrainer::bag_of_words();
/// trainer.add(&["I", "am", "so", "happy"], "positive")?;
/// trainer.add(&["What", "a", "bad", "day"], "negative")?;
/// let categorizer = trainer.train()?;
/// assert_eq!("positive", categorizer.predict(&["happy", "today"])?.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TextCategorizerTrainer {
    fe: Option<Arc<TotalWordFeatureExtractor>>,
    labels: Indexer<String>,
    xs: Vec<SparseVector>,
    ys: Vec<u32>,
    params: ClassifierParams,
    num_threads: usize,
    log_level: LogLevel,
}

impl TextCategorizerTrainer {
    /// Creates a trainer whose categorizer uses the mean word vector of each document.
    pub fn new(fe: Arc<TotalWordFeatureExtractor>) -> Self {
        Self::with_optional_extractor(Some(fe))
    }

    /// Creates a trainer whose categorizer uses bag-of-words features only.
    pub fn bag_of_words() -> Self {
        Self::with_optional_extractor(None)
    }

    fn with_optional_extractor(fe: Option<Arc<TotalWordFeatureExtractor>>) -> Self {
        Self {
            fe,
            labels: Indexer::new(),
            xs: vec![],
            ys: vec![],
            params: ClassifierParams::default(),
            num_threads: 4,
            log_level: LogLevel::default(),
        }
    }

    /// Adds a labeled document.
    ///
    /// # Errors
    ///
    /// If the document is empty, an error variant will be returned.
    pub fn add<S>(&mut self, tokens: &[S], label: &str) -> Result<()>
    where
        S: AsRef<str>,
    {
        let x = match &self.fe {
            Some(fe) => document_features(tokens, fe)?,
            None => bag_of_words_features(tokens)?,
        };
        let id = self.labels.get_id(label);
        self.xs.push(x);
        self.ys.push(u32::try_from(id)?);
        Ok(())
    }

    /// Returns the number of added documents.
    pub fn size(&self) -> usize {
        self.xs.len()
    }

    pub fn set_beta(&mut self, beta: f64) {
        self.params.beta = beta;
    }

    pub fn set_num_threads(&mut self, num_threads: usize) {
        self.num_threads = num_threads.max(1);
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn set_classifier_params(&mut self, params: ClassifierParams) {
        self.params = params;
    }

    /// Trains a categorizer.
    ///
    /// # Errors
    ///
    /// If fewer than two distinct labels have been added,
    /// [`IetkError::InsufficientData`] will be returned.
    pub fn train(&self) -> Result<TextCategorizer> {
        if self.labels.len() < 2 {
            return Err(IetkError::insufficient_data(
                "a categorizer needs documents of at least two labels",
            ));
        }
        progress!(
            self.log_level,
            num_documents = self.xs.len(),
            num_labels = self.labels.len(),
            "training the text categorizer"
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| IetkError::invalid_argument("num_threads", e.to_string()))?;
        let classifier = train_tuned_multiclass(
            &pool,
            &self.xs,
            &self.ys,
            None,
            num_document_feature_dims(self.fe.as_deref()),
            &self.params,
            self.log_level,
        )?;
        TextCategorizer::with_optional_extractor(
            self.labels.keys().to_vec(),
            self.fe.clone(),
            classifier,
        )
    }
}
