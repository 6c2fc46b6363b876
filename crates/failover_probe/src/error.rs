//! Error taxonomy shared by the replay loop and the benchmark harness.
//!
//! Every failure is routed through [`ProbeError::kind`], which is the single
//! place that decides how far an error is allowed to propagate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::classify::OperationClass;

/// Coarse failure category used to decide propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Missing/unreadable/invalid configuration, detected at startup.
    Configuration,
    /// A connection could not be acquired from the provider.
    Connectivity,
    /// A statement failed (SQL error, constraint violation, timeout).
    Execution,
    /// The connection was lost between execute and the commit acknowledgement.
    CommitAmbiguous,
}

/// How far a failure of a given kind may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Terminates the process before any round runs.
    Fatal,
    /// Recorded for the whole round/iteration; the loop continues.
    Round,
    /// Recorded for a single operation; the round continues.
    Operation,
}

impl FailureKind {
    pub fn scope(self) -> FailureScope {
        match self {
            FailureKind::Configuration => FailureScope::Fatal,
            FailureKind::Connectivity => FailureScope::Round,
            FailureKind::Execution | FailureKind::CommitAmbiguous => FailureScope::Operation,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "configuration"),
            FailureKind::Connectivity => write!(f, "connectivity"),
            FailureKind::Execution => write!(f, "execution"),
            FailureKind::CommitAmbiguous => write!(f, "commit-ambiguous"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("read {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", .path.display())]
    ConfigSyntax {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("operation classified {0} is not replay-safe")]
    NotReplaySafe(OperationClass),
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Execute(String),
    #[error("commit outcome unknown: {0}")]
    CommitAmbiguous(String),
}

impl ProbeError {
    /// Classifies this error into its [`FailureKind`].
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Config(_)
            | ProbeError::ConfigIo { .. }
            | ProbeError::ConfigSyntax { .. }
            | ProbeError::NotReplaySafe(_) => FailureKind::Configuration,
            ProbeError::Connect(_) => FailureKind::Connectivity,
            ProbeError::Execute(_) => FailureKind::Execution,
            ProbeError::CommitAmbiguous(_) => FailureKind::CommitAmbiguous,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ProbeError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_are_fatal() {
        assert_eq!(
            ProbeError::config("no SQL queries defined").kind().scope(),
            FailureScope::Fatal
        );
        assert_eq!(
            ProbeError::NotReplaySafe(OperationClass::ExternalEffect)
                .kind()
                .scope(),
            FailureScope::Fatal
        );
        assert_eq!(
            ProbeError::Connect("refused".into()).kind().scope(),
            FailureScope::Round
        );
        assert_eq!(
            ProbeError::Execute("42P01".into()).kind().scope(),
            FailureScope::Operation
        );
        assert_eq!(
            ProbeError::CommitAmbiguous("closed".into()).kind().scope(),
            FailureScope::Operation
        );
    }
}
