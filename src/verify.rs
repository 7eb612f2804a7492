//! Step verification: deciding whether the candidate's observable behavior
//! matched the reference's.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use crate::operation::{CallError, Verifier};
use crate::report::{CallRecord, ReturnValue, StepKind};
use crate::value::{Value, ValueType};

/// One way a candidate's behavior can differ from the reference's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Mismatch {
    Threw,
    Stdout,
    Stderr,
    InterleavedOutput,
    Return,
    Parameters,
    VerifierThrew,
}

impl Mismatch {
    pub fn name(self) -> &'static str {
        match self {
            Mismatch::Threw => "THREW",
            Mismatch::Stdout => "STDOUT",
            Mismatch::Stderr => "STDERR",
            Mismatch::InterleavedOutput => "INTERLEAVED_OUTPUT",
            Mismatch::Return => "RETURN",
            Mismatch::Parameters => "PARAMETERS",
            Mismatch::VerifierThrew => "VERIFIER_THREW",
        }
    }
}

/// Custom equality for values of one declared type.
pub type CompareValues = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Custom equivalence for thrown errors. The default compares kinds only.
pub type CompareErrors = Arc<dyn Fn(&CallError, &CallError) -> bool + Send + Sync>;

/// Registered custom comparators, keyed by declared type.
#[derive(Clone, Default)]
pub struct Comparators {
    values: Vec<(ValueType, CompareValues)>,
    errors: Option<CompareErrors>,
}

impl Comparators {
    pub fn set_value(&mut self, ty: ValueType, compare: CompareValues) {
        if let Some(entry) = self.values.iter_mut().find(|(t, _)| *t == ty) {
            entry.1 = compare;
        } else {
            self.values.push((ty, compare));
        }
    }

    pub fn set_errors(&mut self, compare: CompareErrors) {
        self.errors = Some(compare);
    }

    fn for_value(&self, value: &Value) -> Option<&CompareValues> {
        if matches!(value, Value::Null) {
            return None;
        }
        self.values
            .iter()
            .find(|(ty, _)| ty.accepts(value))
            .map(|(_, compare)| compare)
    }
}

/// Structural equality with registered comparators applied at every level.
pub fn deep_equals(a: &Value, b: &Value, comparators: &Comparators) -> bool {
    if let Some(compare) = comparators.for_value(a) {
        return compare(a, b);
    }
    match (a, b) {
        (Value::List(x), Value::List(y)) | (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(left, right)| deep_equals(left, right, comparators))
        }
        (Value::SetOf(x), Value::SetOf(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let mut used = vec![false; y.len()];
            x.iter().all(|left| {
                y.iter().enumerate().any(|(index, right)| {
                    if !used[index] && deep_equals(left, right, comparators) {
                        used[index] = true;
                        true
                    } else {
                        false
                    }
                })
            })
        }
        (Value::MapOf(x), Value::MapOf(y)) => {
            if x.len() != y.len() {
                return false;
            }
            x.iter().all(|(key, value)| {
                y.iter().any(|(other_key, other_value)| {
                    deep_equals(key, other_key, comparators)
                        && deep_equals(value, other_value, comparators)
                })
            })
        }
        _ => a == b,
    }
}

pub(crate) fn values_equal(a: &[Value], b: &[Value], comparators: &Comparators) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(left, right)| deep_equals(left, right, comparators))
}

pub(crate) fn errors_equivalent(
    a: &CallError,
    b: &CallError,
    comparators: &Comparators,
) -> bool {
    match &comparators.errors {
        Some(compare) => compare(a, b),
        None => a.kind == b.kind,
    }
}

fn returns_equal(a: &ReturnValue, b: &ReturnValue, comparators: &Comparators) -> bool {
    match (a, b) {
        (ReturnValue::Void, ReturnValue::Void) => true,
        // A void return and an explicit null coalesce.
        (ReturnValue::Void, ReturnValue::Value(Value::Null)) => true,
        (ReturnValue::Value(Value::Null), ReturnValue::Void) => true,
        (ReturnValue::Value(x), ReturnValue::Value(y)) => deep_equals(x, y, comparators),
        // Receiver identity is checked through the tracked pool, not here.
        (ReturnValue::Receiver, ReturnValue::Receiver) => true,
        (ReturnValue::Receivers(x), ReturnValue::Receivers(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(left, right)| left == right)
        }
        _ => false,
    }
}

fn blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Fills in the mismatch set for one step using the default rules.
pub(crate) fn default_verify(
    record: &mut CallRecord,
    comparators: &Comparators,
    strict_output: bool,
) {
    let reference = &record.reference;
    let candidate = &record.candidate;

    match (&reference.threw, &candidate.threw) {
        (None, None) => {}
        (Some(a), Some(b)) => {
            if !errors_equivalent(a, b, comparators) {
                record.mismatches.insert(Mismatch::Threw);
            }
        }
        _ => {
            record.mismatches.insert(Mismatch::Threw);
        }
    }

    if (strict_output || !blank(&reference.stdout)) && reference.stdout != candidate.stdout {
        record.mismatches.insert(Mismatch::Stdout);
        if reference.stdout == format!("{}\n", candidate.stdout) {
            record.message = Some("Output is missing a newline".into());
        }
        if format!("{}\n", reference.stdout) == candidate.stdout {
            record.message = Some("Output has an extra newline".into());
        }
    }

    if (strict_output || !blank(&reference.stderr)) && reference.stderr != candidate.stderr {
        record.mismatches.insert(Mismatch::Stderr);
        if reference.stderr == format!("{}\n", candidate.stderr) {
            record.message = Some("Error output is missing a newline".into());
        }
        if format!("{}\n", reference.stderr) == candidate.stderr {
            record.message = Some("Error output has an extra newline".into());
        }
    }

    if (strict_output || !blank(&reference.stdout) || !blank(&reference.stderr))
        && reference.interleaved != candidate.interleaved
    {
        record.mismatches.insert(Mismatch::InterleavedOutput);
    }

    if record.existing_receiver_mismatch {
        record.mismatches.insert(Mismatch::Return);
    }

    if matches!(
        record.kind,
        StepKind::InstanceMethod | StepKind::StaticMethod
    ) && !returns_equal(&reference.returned, &candidate.returned, comparators)
    {
        record.mismatches.insert(Mismatch::Return);
    }

    // Creation steps compare by receiver shape; identity is tracked
    // through the pool.
    if matches!(
        record.kind,
        StepKind::Constructor | StepKind::CopyConstructor | StepKind::FactoryMethod
    ) {
        let matched = match (&reference.returned, &candidate.returned) {
            (ReturnValue::Receiver, ReturnValue::Receiver) => true,
            (ReturnValue::Receivers(expected), ReturnValue::Receivers(actual)) => {
                expected == actual
            }
            (ReturnValue::Void, ReturnValue::Void) => true,
            _ => false,
        };
        if !matched {
            record.mismatches.insert(Mismatch::Return);
        }
    }

    if !values_equal(&reference.arguments, &candidate.arguments, comparators) {
        record.mismatches.insert(Mismatch::Parameters);
    }
}

/// Runs the configured verifier for a step, or the default rules.
///
/// A custom verifier that fails or panics marks the step with
/// [`Mismatch::VerifierThrew`] and records its explanation.
pub(crate) fn verify(
    record: &mut CallRecord,
    verifier: Option<&Verifier>,
    comparators: &Comparators,
    strict_output: bool,
) {
    let Some(verifier) = verifier else {
        default_verify(record, comparators, strict_output);
        return;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| verifier(record)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(message)) => {
            record.mismatches.insert(Mismatch::VerifierThrew);
            record.verifier_message = Some(message);
        }
        Err(payload) => {
            record.mismatches.insert(Mismatch::VerifierThrew);
            let message = if let Some(text) = payload.downcast_ref::<&str>() {
                (*text).to_string()
            } else if let Some(text) = payload.downcast_ref::<String>() {
                text.clone()
            } else {
                "verifier panicked".to_string()
            };
            record.verifier_message = Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ErrorKind;

    #[test]
    fn deep_equals_applies_comparators_inside_containers() {
        let mut comparators = Comparators::default();
        // Case-insensitive string comparison.
        comparators.set_value(
            ValueType::Str,
            Arc::new(|a, b| match (a, b) {
                (Value::Str(x), Value::Str(y)) => x.eq_ignore_ascii_case(y),
                _ => false,
            }),
        );
        let a = Value::List(vec![Value::Str("Hello".into())]);
        let b = Value::List(vec![Value::Str("hello".into())]);
        assert!(deep_equals(&a, &b, &comparators));
        assert!(!deep_equals(&a, &b, &Comparators::default()));
    }

    #[test]
    fn error_equivalence_defaults_to_kind() {
        let comparators = Comparators::default();
        let a = CallError::new(ErrorKind::Arithmetic, "overflowed");
        let b = CallError::new(ErrorKind::Arithmetic, "divide by zero");
        let c = CallError::new(ErrorKind::IllegalArgument, "overflowed");
        assert!(errors_equivalent(&a, &b, &comparators));
        assert!(!errors_equivalent(&a, &c, &comparators));
    }

    #[test]
    fn custom_error_comparator_overrides_kind_matching() {
        let mut comparators = Comparators::default();
        comparators.set_errors(Arc::new(|a, b| a.message == b.message));
        let a = CallError::new(ErrorKind::Arithmetic, "same");
        let b = CallError::new(ErrorKind::IllegalArgument, "same");
        assert!(errors_equivalent(&a, &b, &comparators));
    }

    #[test]
    fn void_and_null_returns_coalesce() {
        let comparators = Comparators::default();
        assert!(returns_equal(
            &ReturnValue::Void,
            &ReturnValue::Value(Value::Null),
            &comparators
        ));
        assert!(!returns_equal(
            &ReturnValue::Void,
            &ReturnValue::Value(Value::Int(0)),
            &comparators
        ));
    }

    #[test]
    fn nan_returns_compare_equal() {
        let comparators = Comparators::default();
        assert!(returns_equal(
            &ReturnValue::Value(Value::Double(f64::NAN)),
            &ReturnValue::Value(Value::Double(f64::NAN)),
            &comparators
        ));
    }
}
