//! Document categorization.

#[cfg(feature = "train")]
mod trainer;

use std::io::{Read, Write};
use std::sync::Arc;

use bincode::{Decode, Encode};

use crate::errors::{IetkError, Result};
use crate::hashing::FeatureHasher;
use crate::linear::MulticlassLinear;
use crate::model_file::{expect_header, read_payload, write_model, ModelKind};
use crate::stem::stem_word;
use crate::utils::{make_sparse_vector, SparseVector};
use crate::word_features::TotalWordFeatureExtractor;

#[cfg(feature = "train")]
pub use trainer::TextCategorizerTrainer;

const MODEL_VERSION: u32 = 1;

/// Number of hashed bag-of-words dimensions. The mean word vector starts here.
pub const DOCUMENT_HASH_DIMS: u32 = 500_000;

/// Label reported when the classifier picks a class without a name.
pub const UNSEEN_LABEL: &str = "Unseen";

const WORD_SEED: u64 = 0;
const STEM_SEED: u64 = 10;

/// Returns the hashed word and stem features of a document.
///
/// # Errors
///
/// If the document has no token, an error variant will be returned.
pub fn bag_of_words_features<S>(tokens: &[S]) -> Result<SparseVector>
where
    S: AsRef<str>,
{
    if tokens.is_empty() {
        return Err(IetkError::invalid_argument(
            "tokens",
            "a document must have at least one token",
        ));
    }
    let mut hasher = FeatureHasher::new(DOCUMENT_HASH_DIMS);
    for token in tokens {
        let token = token.as_ref();
        hasher.add(token, WORD_SEED);
        hasher.add(&stem_word(token), STEM_SEED);
    }
    Ok(make_sparse_vector(hasher.into_features()))
}

/// Returns the bag-of-words features followed by the mean word vector of the document.
pub fn document_features<S>(tokens: &[S], fe: &TotalWordFeatureExtractor) -> Result<SparseVector>
where
    S: AsRef<str>,
{
    let mut feats = bag_of_words_features(tokens)?;
    feats.extend(
        fe.mean_vector(tokens)
            .into_iter()
            .enumerate()
            .map(|(i, x)| (DOCUMENT_HASH_DIMS + i as u32, f64::from(x))),
    );
    Ok(feats)
}

/// Returns the number of feature dimensions of a categorizer.
pub fn num_document_feature_dims(fe: Option<&TotalWordFeatureExtractor>) -> usize {
    DOCUMENT_HASH_DIMS as usize + fe.map_or(0, |fe| fe.dimensions())
}

#[derive(Encode)]
struct CategorizerStateRef<'a> {
    labels: &'a [String],
    fingerprint: u64,
    fe: Option<&'a TotalWordFeatureExtractor>,
    classifier: &'a MulticlassLinear,
}

#[derive(Decode)]
struct CategorizerState {
    labels: Vec<String>,
    fingerprint: u64,
    fe: Option<TotalWordFeatureExtractor>,
    classifier: MulticlassLinear,
}

/// Assigns one label to a whole document.
///
/// A categorizer either uses bag-of-words features only, or adds the mean word vector of a
/// [`TotalWordFeatureExtractor`]. Bag-of-words categorizers carry the fingerprint 0.
#[derive(Clone, Debug)]
pub struct TextCategorizer {
    labels: Vec<String>,
    fe: Option<Arc<TotalWordFeatureExtractor>>,
    classifier: MulticlassLinear,
}

impl TextCategorizer {
    /// Creates a categorizer that uses word vectors.
    ///
    /// # Errors
    ///
    /// If a label has no classifier column, an error variant will be returned.
    pub fn new(
        labels: Vec<String>,
        fe: Arc<TotalWordFeatureExtractor>,
        classifier: MulticlassLinear,
    ) -> Result<Self> {
        Self::with_optional_extractor(labels, Some(fe), classifier)
    }

    /// Creates a categorizer that uses bag-of-words features only.
    pub fn bag_of_words(labels: Vec<String>, classifier: MulticlassLinear) -> Result<Self> {
        Self::with_optional_extractor(labels, None, classifier)
    }

    pub(crate) fn with_optional_extractor(
        labels: Vec<String>,
        fe: Option<Arc<TotalWordFeatureExtractor>>,
        classifier: MulticlassLinear,
    ) -> Result<Self> {
        for id in 0..labels.len() {
            if !classifier.labels().contains(&(id as u32)) {
                return Err(IetkError::invalid_argument(
                    "classifier",
                    format!("cannot predict the label {:?}", labels[id]),
                ));
            }
        }
        Ok(Self {
            labels,
            fe,
            classifier,
        })
    }

    /// Returns the label names in ID order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the fingerprint of the word feature extractor, or 0 for a bag-of-words model.
    pub fn fingerprint(&self) -> u64 {
        self.fe.as_ref().map_or(0, |fe| fe.fingerprint())
    }

    pub fn word_feature_extractor(&self) -> Option<&Arc<TotalWordFeatureExtractor>> {
        self.fe.as_ref()
    }

    pub fn classifier(&self) -> &MulticlassLinear {
        &self.classifier
    }

    /// Predicts the label of a tokenized document and returns it with its decision value.
    ///
    /// # Errors
    ///
    /// If the document is empty, an error variant will be returned.
    pub fn predict<S>(&self, tokens: &[S]) -> Result<(&str, f64)>
    where
        S: AsRef<str>,
    {
        let x = match &self.fe {
            Some(fe) => document_features(tokens, fe)?,
            None => bag_of_words_features(tokens)?,
        };
        let (id, score) = self.classifier.predict(&x);
        let label = self
            .labels
            .get(id as usize)
            .map_or(UNSEEN_LABEL, String::as_str);
        Ok((label, score))
    }

    fn write_state<W>(&self, wtr: W, embed: bool) -> Result<()>
    where
        W: Write,
    {
        let state = CategorizerStateRef {
            labels: &self.labels,
            fingerprint: self.fingerprint(),
            fe: if embed { self.fe.as_deref() } else { None },
            classifier: &self.classifier,
        };
        write_model(wtr, ModelKind::TextCategorizer, MODEL_VERSION, &state)
    }

    /// Exports the categorizer together with its word feature extractor.
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        self.write_state(wtr, true)
    }

    /// Exports the categorizer without its word feature extractor.
    ///
    /// Such a file is loaded with [`TextCategorizer::read_with_extractor()`], for example
    /// sharing the extractor of a loaded entity extractor.
    pub fn write_without_extractor<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        self.write_state(wtr, false)
    }

    fn read_state<R>(mut rdr: R) -> Result<CategorizerState>
    where
        R: Read,
    {
        expect_header(&mut rdr, ModelKind::TextCategorizer, &[MODEL_VERSION])?;
        read_payload(&mut rdr)
    }

    /// Reads a categorizer written by [`TextCategorizer::write()`].
    ///
    /// # Errors
    ///
    /// If the file does not embed the word feature extractor it needs, or the embedded one is
    /// not the one the model was trained with, an error variant will be returned.
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let state = Self::read_state(rdr)?;
        let fe = match (state.fingerprint, state.fe) {
            (0, _) => None,
            (_, None) => {
                return Err(IetkError::invalid_model(
                    "the categorizer needs a word feature extractor that is not embedded",
                ))
            }
            (fingerprint, Some(fe)) => {
                fe.verify_fingerprint()?;
                if fe.fingerprint() != fingerprint {
                    return Err(IetkError::fingerprint_mismatch(fingerprint, fe.fingerprint()));
                }
                Some(Arc::new(fe))
            }
        };
        Self::with_optional_extractor(state.labels, fe, state.classifier)
    }

    /// Reads a categorizer and attaches the given word feature extractor.
    ///
    /// # Errors
    ///
    /// If the model was trained with a different word feature extractor,
    /// [`IetkError::FingerprintMismatch`] will be returned.
    pub fn read_with_extractor<R>(rdr: R, fe: Arc<TotalWordFeatureExtractor>) -> Result<Self>
    where
        R: Read,
    {
        let state = Self::read_state(rdr)?;
        if state.fingerprint == 0 {
            return Self::with_optional_extractor(state.labels, None, state.classifier);
        }
        if fe.fingerprint() != state.fingerprint {
            return Err(IetkError::fingerprint_mismatch(
                state.fingerprint,
                fe.fingerprint(),
            ));
        }
        Self::with_optional_extractor(state.labels, Some(fe), state.classifier)
    }
}
