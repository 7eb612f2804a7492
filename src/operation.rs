//! Operation table entries: paired callables plus per-operation
//! configuration.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;

use crate::capture::{CaptureContext, CaptureInputs};
use crate::complexity::Complexity;
use crate::value::{Instance, Value, ValueType};

/// What kind of callable an operation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpKind {
    /// Produces a fresh receiver from arguments.
    Constructor,
    /// A static callable that produces one or more receivers.
    Factory,
    /// A callable with no receiver.
    Static,
    /// A callable invoked on a receiver.
    Instance,
    /// A shared utility applied identically to both sides' receivers.
    Both,
}

/// Category of a thrown error, used to decide whether the reference and
/// candidate failed equivalently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    IllegalArgument,
    IllegalState,
    OutOfBounds,
    Arithmetic,
    Unsupported,
    NotFound,
    Io,
    /// The callable panicked rather than returning an error.
    Panicked,
    /// Control signal: discard this step as if it never ran. Reference only.
    Skip,
    /// Control signal: stop raising generation complexity. Reference only.
    Bound,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::IllegalArgument => "IllegalArgument",
            ErrorKind::IllegalState => "IllegalState",
            ErrorKind::OutOfBounds => "OutOfBounds",
            ErrorKind::Arithmetic => "Arithmetic",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Io => "Io",
            ErrorKind::Panicked => "Panicked",
            ErrorKind::Skip => "Skip",
            ErrorKind::Bound => "Bound",
            ErrorKind::Other => "Other",
        };
        write!(f, "{name}")
    }
}

/// An error thrown by the system under test.
///
/// Two errors are equivalent when their kinds match; messages are carried
/// for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CallError {
        CallError {
            kind,
            message: message.into(),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> CallError {
        CallError::new(ErrorKind::IllegalArgument, message)
    }

    pub fn illegal_state(message: impl Into<String>) -> CallError {
        CallError::new(ErrorKind::IllegalState, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> CallError {
        CallError::new(ErrorKind::Arithmetic, message)
    }

    pub fn out_of_bounds(message: impl Into<String>) -> CallError {
        CallError::new(ErrorKind::OutOfBounds, message)
    }

    pub fn panicked(message: impl Into<String>) -> CallError {
        CallError::new(ErrorKind::Panicked, message)
    }

    /// Signals from the reference that this step should be discarded.
    pub fn skip() -> CallError {
        CallError::new(ErrorKind::Skip, "skip this step")
    }

    /// Signals from the reference that complexity should stop growing.
    pub fn bound_complexity() -> CallError {
        CallError::new(ErrorKind::Bound, "bound generation complexity")
    }

    pub fn is_control(&self) -> bool {
        matches!(self.kind, ErrorKind::Skip | ErrorKind::Bound)
    }
}

/// What a callable produced.
pub enum Returned {
    /// Nothing (a void call).
    None,
    /// An ordinary value.
    Value(Value),
    /// A fresh or aliased receiver.
    Instance(Instance),
    /// An array of receivers, possibly with holes.
    Instances(Vec<Option<Instance>>),
}

// Instances are opaque; render which slots are filled.
impl fmt::Debug for Returned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returned::None => f.write_str("None"),
            Returned::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Returned::Instance(_) => f.write_str("Instance(..)"),
            Returned::Instances(instances) => {
                let filled: Vec<bool> = instances.iter().map(Option::is_some).collect();
                f.debug_tuple("Instances").field(&filled).finish()
            }
        }
    }
}

/// Everything a callable gets for one invocation.
pub struct CallInput<'a> {
    /// The receiver for instance operations, absent otherwise.
    pub receiver: Option<&'a Instance>,
    /// Arguments, mutable so in-place modification is observable.
    pub arguments: &'a mut [Value],
    /// The captured IO surface for this invocation.
    pub io: &'a mut CaptureContext,
    /// Resolves a [`Value::Receiver`] argument to this side's instance.
    pub resolve: &'a dyn Fn(usize) -> Option<Instance>,
}

impl<'a> CallInput<'a> {
    /// The instance behind a receiver-typed argument, if tracked.
    pub fn instance_argument(&self, index: usize) -> Option<Instance> {
        match self.arguments.get(index) {
            Some(Value::Receiver(pool_index)) => (self.resolve)(*pool_index),
            _ => None,
        }
    }
}

pub type Callable = Arc<dyn Fn(CallInput<'_>) -> Result<Returned, CallError> + Send + Sync>;

/// Custom argument source drawing from an isolated child generator.
pub type RandomArguments = Arc<dyn Fn(Complexity, &mut StdRng) -> Vec<Value> + Send + Sync>;

/// Decision made by an argument filter before a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    Run,
    /// Discard the step as if it never ran.
    Skip,
    /// Discard the step and stop raising complexity.
    Bound,
}

pub type ArgumentFilter = Arc<dyn Fn(&[Value]) -> StepVerdict + Send + Sync>;

/// Custom step verifier. An `Err` marks the step as failed with the given
/// explanation.
pub type Verifier = Arc<dyn Fn(&crate::report::CallRecord) -> Result<(), String> + Send + Sync>;

/// One registered operation: a reference callable, a candidate callable,
/// and everything configured about how to test them.
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub kind: OpKind,
    pub parameters: Vec<ValueType>,
    pub(crate) reference: Callable,
    pub(crate) candidate: Callable,
    pub weight: f64,
    pub limit: Option<usize>,
    pub strict_output: bool,
    pub(crate) fixed: Option<Vec<Vec<Value>>>,
    pub(crate) random: Option<RandomArguments>,
    pub(crate) filter: Option<ArgumentFilter>,
    pub(crate) verifier: Option<Verifier>,
    pub(crate) inputs: CaptureInputs,
}

impl Operation {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: OpKind,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> Operation {
        let weight = if parameters.is_empty() { 1.0 } else { 2.0 };
        Operation {
            name: name.into(),
            kind,
            parameters,
            reference,
            candidate,
            weight,
            limit: None,
            strict_output: false,
            fixed: None,
            random: None,
            filter: None,
            verifier: None,
            inputs: CaptureInputs::default(),
        }
    }

    /// Whether this operation creates receivers.
    pub fn produces_receivers(&self) -> bool {
        matches!(self.kind, OpKind::Constructor | OpKind::Factory)
    }

    /// Whether any declared parameter is the receiver type.
    pub fn takes_receiver_parameter(&self) -> bool {
        self.parameters
            .iter()
            .any(|parameter| matches!(parameter, ValueType::Receiver))
    }

    /// Whether any declared parameter is fully generic.
    pub fn takes_any_parameter(&self) -> bool {
        self.parameters
            .iter()
            .any(|parameter| matches!(parameter, ValueType::Any))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("parameters", &self.parameters)
            .field("weight", &self.weight)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callable {
        Arc::new(|_input| Ok(Returned::None))
    }

    #[test]
    fn default_weight_depends_on_arity() {
        let nullary = Operation::new("a", OpKind::Static, vec![], noop(), noop());
        let unary = Operation::new("b", OpKind::Static, vec![ValueType::Int], noop(), noop());
        assert_eq!(nullary.weight, 1.0);
        assert_eq!(unary.weight, 2.0);
    }

    #[test]
    fn control_errors_are_recognized() {
        assert!(CallError::skip().is_control());
        assert!(CallError::bound_complexity().is_control());
        assert!(!CallError::arithmetic("overflow").is_control());
    }

    #[test]
    fn returned_debug_shows_receiver_slots_without_contents() {
        let filled = Returned::Instances(vec![Some(crate::value::instance_of(0i32)), None]);
        assert_eq!(format!("{filled:?}"), "Instances([true, false])");
        assert_eq!(format!("{:?}", Returned::None), "None");
        assert_eq!(
            format!("{:?}", Returned::Instance(crate::value::instance_of(0i32))),
            "Instance(..)"
        );
    }

    #[test]
    fn error_equivalence_is_by_kind() {
        let a = CallError::illegal_argument("negative size");
        let b = CallError::illegal_argument("different words");
        assert_eq!(a.kind, b.kind);
        assert_ne!(a, b);
    }
}
