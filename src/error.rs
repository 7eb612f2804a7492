//! Error types for harness construction and test execution.

use thiserror::Error;

use crate::value::ValueType;

/// A contract violation detected while building a [`crate::Harness`] or while
/// resolving configuration during a run.
///
/// These always indicate a problem with how the harness was set up, never a
/// behavioral difference between the reference and the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("harness declares no operations")]
    NoOperations,

    #[error("duplicate operation name: {name}")]
    DuplicateOperation { name: String },

    #[error("configuration references unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("operation {name} requires a receiver but no constructor or factory is declared")]
    MissingReceiverSource { name: String },

    #[error("at most one initializer may be declared")]
    MultipleInitializers,

    #[error("invalid operation {name}: {reason}")]
    BadOperation { name: String, reason: String },

    #[error("invalid fixed arguments for {operation}: {reason}")]
    BadFixedArguments { operation: String, reason: String },

    #[error("invalid generator override for {ty}: {reason}")]
    BadOverride { ty: ValueType, reason: String },

    #[error("custom random arguments for {operation}: {reason}")]
    BadRandomArguments { operation: String, reason: String },

    #[error("invalid settings: {reason}")]
    BadSettings { reason: String },

    #[error("operation {operation} has invalid weight {weight}")]
    BadWeight { operation: String, weight: String },

    #[error("candidate for {operation} raised a control signal reserved for the reference")]
    CandidateControlSignal { operation: String },

    #[error("no receiver was available when one was needed as an argument")]
    NoReceiverAvailable,

    #[error("ran out of operations to test due to call limits")]
    LimitsExhausted,

    #[error("no default generator for parameter type {ty}")]
    UnsupportedType { ty: ValueType },
}

/// Raised when a replayed run draws a random value that diverges from the
/// recorded trace it is following.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("random trace diverged at draw {index}: expected {expected:?}, drew {actual}")]
pub struct FollowTraceError {
    pub index: usize,
    /// The recorded draw, or `None` when the replay ran past the end of the
    /// trace.
    pub expected: Option<u32>,
    pub actual: u32,
}

/// Top-level failure of a test run.
///
/// Behavioral differences are reported through
/// [`crate::TestResults`], not through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    FollowTrace(#[from] FollowTraceError),
}
