//! Definition of errors.

use std::error::Error;
use std::fmt;

pub type Result<T, E = IetkError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum IetkError {
    InvalidModel(InvalidModelError),
    InvalidArgument(InvalidArgumentError),
    FingerprintMismatch(FingerprintMismatchError),
    InsufficientData(InsufficientDataError),
    UnknownLabel(UnknownLabelError),
    NotConverged(NotConvergedError),
    UTF8Error(std::string::FromUtf8Error),
    CastError(std::num::TryFromIntError),
    DecodeError(bincode::error::DecodeError),
    EncodeError(bincode::error::EncodeError),
    IOError(std::io::Error),
}

impl IetkError {
    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(InvalidModelError { msg: msg.into() })
    }

    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    pub(crate) fn fingerprint_mismatch(expected: u64, found: u64) -> Self {
        Self::FingerprintMismatch(FingerprintMismatchError { expected, found })
    }

    pub(crate) fn insufficient_data<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InsufficientData(InsufficientDataError { msg: msg.into() })
    }

    pub(crate) fn unknown_label<S>(label: S) -> Self
    where
        S: Into<String>,
    {
        Self::UnknownLabel(UnknownLabelError {
            label: label.into(),
        })
    }

    #[cfg(feature = "train")]
    pub(crate) fn not_converged(max_iters: usize) -> Self {
        Self::NotConverged(NotConvergedError { max_iters })
    }
}

impl fmt::Display for IetkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidModel(e) => e.fmt(f),
            Self::InvalidArgument(e) => e.fmt(f),
            Self::FingerprintMismatch(e) => e.fmt(f),
            Self::InsufficientData(e) => e.fmt(f),
            Self::UnknownLabel(e) => e.fmt(f),
            Self::NotConverged(e) => e.fmt(f),
            Self::UTF8Error(e) => e.fmt(f),
            Self::CastError(e) => e.fmt(f),
            Self::DecodeError(e) => e.fmt(f),
            Self::EncodeError(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for IetkError {}

/// Error used when the model is invalid.
#[derive(Debug)]
pub struct InvalidModelError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidModelError: {}", self.msg)
    }
}

impl Error for InvalidModelError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// Error used when a feature vector was built by a different word feature extractor than the
/// one a model was trained with.
#[derive(Debug)]
pub struct FingerprintMismatchError {
    /// Fingerprint recorded by the model.
    pub(crate) expected: u64,

    /// Fingerprint carried by the input.
    pub(crate) found: u64,
}

impl fmt::Display for FingerprintMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FingerprintMismatchError: expected {:#018x}, found {:#018x}",
            self.expected, self.found
        )
    }
}

impl Error for FingerprintMismatchError {}

/// Error used when a trainer is given data it cannot learn from.
#[derive(Debug)]
pub struct InsufficientDataError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InsufficientDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InsufficientDataError: {}", self.msg)
    }
}

impl Error for InsufficientDataError {}

/// Error used when a label is not known to a model.
#[derive(Debug)]
pub struct UnknownLabelError {
    /// The offending label.
    pub(crate) label: String,
}

impl fmt::Display for UnknownLabelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnknownLabelError: {}", self.label)
    }
}

impl Error for UnknownLabelError {}

/// Error used when an optimizer hits its iteration cap.
#[derive(Debug)]
pub struct NotConvergedError {
    /// The iteration cap that was reached.
    pub(crate) max_iters: usize,
}

impl fmt::Display for NotConvergedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "NotConvergedError: no convergence within {} iterations",
            self.max_iters
        )
    }
}

impl Error for NotConvergedError {}

impl From<std::string::FromUtf8Error> for IetkError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        Self::UTF8Error(error)
    }
}

impl From<std::num::TryFromIntError> for IetkError {
    fn from(error: std::num::TryFromIntError) -> Self {
        Self::CastError(error)
    }
}

impl From<bincode::error::DecodeError> for IetkError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::DecodeError(error)
    }
}

impl From<bincode::error::EncodeError> for IetkError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::EncodeError(error)
    }
}

impl From<std::io::Error> for IetkError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
