//! Replay classification for units of work.
//!
//! A unit of work is classified once, when it is authored. The class decides
//! whether a round that ended with an unknown outcome may simply be run again.

use std::fmt;

use crate::error::{FailureKind, FailureScope};

/// Authoring-time replay classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Uses only caller-supplied inputs; repeating it converges on the same
    /// logical effect (e.g. an upsert keyed by a caller-chosen id).
    Deterministic,
    /// Depends on server-generated state (sequences, `now()`, random values).
    NonDeterministic,
    /// Has an effect outside the transaction (mail, HTTP call, file write).
    ExternalEffect,
}

impl OperationClass {
    pub fn is_replay_safe(self) -> bool {
        matches!(self, OperationClass::Deterministic)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Deterministic => write!(f, "deterministic"),
            OperationClass::NonDeterministic => write!(f, "non-deterministic"),
            OperationClass::ExternalEffect => write!(f, "external-effect"),
        }
    }
}

/// What a loop does with a unit of work after one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDecision {
    /// Run the same unit again on the next iteration.
    RetryNextRound,
    /// Stop; re-running could duplicate an effect or the setup is invalid.
    Abort,
}

/// Decides whether a failed attempt of a unit with `class` may be replayed.
///
/// A connectivity failure never reached the server, so any class may retry.
/// Once a statement may have run, only `Deterministic` units are replayed.
pub fn replay_decision(class: OperationClass, failure: FailureKind) -> ReplayDecision {
    if failure.scope() == FailureScope::Fatal {
        return ReplayDecision::Abort;
    }
    match failure {
        FailureKind::Connectivity => ReplayDecision::RetryNextRound,
        _ if class.is_replay_safe() => ReplayDecision::RetryNextRound,
        _ => ReplayDecision::Abort,
    }
}
