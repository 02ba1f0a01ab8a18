use std::fmt::Display;

use chaosd_exec::{command, Output};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid rule: {0}")]
    InvalidRuleSpec(String),
    #[error("unsupported rule kind: {0}")]
    UnsupportedRuleKind(String),
    #[error("`tc {operation}` failed with {output}")]
    CommandExecutionFailed { operation: String, output: Output },
    #[error("failed to apply classification chains: {0}")]
    ClassificationApplyFailed(#[source] BoxError),
    #[error("failed to execute `tc {operation}`: {source}")]
    Exec {
        operation: String,
        #[source]
        source: command::Error,
    },
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Prefixes rule validation errors with the location of the offending rule.
    pub fn context(self, context: impl Display) -> Self {
        match self {
            Self::InvalidRuleSpec(msg) => Self::InvalidRuleSpec(format!("{context}: {msg}")),
            Self::UnsupportedRuleKind(msg) => {
                Self::UnsupportedRuleKind(format!("{context}: {msg}"))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
