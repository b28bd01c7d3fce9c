//! Error taxonomy for the particle filter.
//!
//! Configuration calls validate eagerly and return [`ParticleError::InvalidArgument`]
//! without mutating filter state; per-cycle numeric stages never fail once the filter
//! is configured, except that a collaborator handing the filter a NaN likelihood is
//! reported as [`ParticleError::NumericDegeneracy`].

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParticleError {
    /// A caller bug: dimension mismatch or degenerate value detected at the
    /// configuration/initialization boundary. The operation did not mutate the filter.
    InvalidArgument(String),
    /// A numerically meaningless quantity (NaN likelihood) supplied by a collaborator.
    NumericDegeneracy(String),
}

impl ParticleError {
    /// Shorthand for the common "wrong shape" complaint.
    pub fn dimension(what: &str, expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        ParticleError::InvalidArgument(format!("{what}: expected {expected}, found {found}"))
    }
}

impl fmt::Display for ParticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticleError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ParticleError::NumericDegeneracy(msg) => write!(f, "numeric degeneracy: {msg}"),
        }
    }
}

impl std::error::Error for ParticleError {}
