//! Runtime options shared by the trainers.

use std::fmt;
use std::str::FromStr;

/// How much a trainer reports about its progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Emits nothing.
    Silent,

    /// Emits one event per training phase.
    #[default]
    Progress,

    /// Emits per-iteration details and enables the solver's own output.
    Verbose,
}

impl LogLevel {
    #[inline(always)]
    pub(crate) fn progress(self) -> bool {
        self >= Self::Progress
    }

    #[inline(always)]
    pub(crate) fn verbose(self) -> bool {
        self >= Self::Verbose
    }
}

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(Self::Silent),
            "progress" => Ok(Self::Progress),
            "verbose" => Ok(Self::Verbose),
            _ => Err("Could not parse a log level. {silent, progress, verbose}"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Progress => write!(f, "progress"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Emits a progress event if the level allows it.
macro_rules! progress {
    ($level:expr, $($arg:tt)+) => {
        if $level.progress() {
            tracing::info!($($arg)+);
        }
    };
}

/// Emits a verbose event if the level allows it.
macro_rules! verbose {
    ($level:expr, $($arg:tt)+) => {
        if $level.verbose() {
            tracing::debug!($($arg)+);
        }
    };
}
