use serde::{Deserialize, Serialize};

use crate::flags::VariationType;

/// Result type used throughout the crate. The error variant is
/// [`EvaluationError`].
pub type Result<T> = std::result::Result<T, EvaluationError>;

/// Errors that can be surfaced to the caller during evaluation.
///
/// Anything that is a normal running condition (unknown flag, disabled flag,
/// no matching allocation) is *not* an error and results in the caller's
/// default value instead.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EvaluationError {
    /// Requested flag has a different type than expected.
    #[error("invalid flag type (expected: {expected:?}, found: {found:?})")]
    TypeMismatch {
        /// Expected type of the flag.
        expected: VariationType,
        /// Actual type of the flag.
        found: VariationType,
    },

    /// The configuration payload for this flag could not be parsed (server
    /// sent an unexpected format). The stored configuration is left
    /// unchanged; upgrading the SDK usually helps.
    #[error("error parsing flag configuration")]
    ConfigurationParseError,

    /// Configuration is internally inconsistent (e.g., a split references a
    /// variation that does not exist). This should normally never happen.
    #[error("inconsistent configuration")]
    UnexpectedConfigurationError,

    /// Bandit model or inputs are malformed.
    #[error(transparent)]
    BanditEvaluation(#[from] BanditEvaluationError),
}

/// Errors specific to bandit evaluation. Recoverable: in graceful mode the
/// client substitutes the flag's ordinary non-bandit variation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BanditEvaluationError {
    /// The candidate action set supplied by the caller was empty.
    #[error("no actions supplied for bandit")]
    NoActions,
}

/// Internal evaluation outcome. Splits normal non-matches (which map to the
/// caller-supplied default) from genuine errors (which may propagate dependent
/// on graceful mode).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub(crate) enum EvaluationFailure {
    #[error(transparent)]
    Error(#[from] EvaluationError),

    /// Configuration has not been fetched or seeded yet.
    #[error("configuration missing")]
    ConfigurationMissing,

    /// The flag does not exist in the configuration or is disabled.
    #[error("flag is unrecognized or disabled")]
    FlagUnrecognizedOrDisabled,

    /// All allocations were scanned and none matched the subject.
    #[error("no allocation matched the subject")]
    NoMatchingAllocation,
}
