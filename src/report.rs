//! Step records, run results, and human- and machine-readable output.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::complexity::Complexity;
use crate::generators::Provenance;
use crate::operation::CallError;
use crate::value::{Value, ValueType};
use crate::verify::Mismatch;

/// What role a step played in its runner's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StepKind {
    Constructor,
    CopyConstructor,
    Initializer,
    InstanceMethod,
    StaticMethod,
    FactoryMethod,
}

/// Shape of what one side returned.
///
/// Receivers are recorded by shape only; their identity lives in the
/// tracked pool.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    /// Nothing was returned (a void call, or the call threw).
    Void,
    Value(Value),
    Receiver,
    /// A receiver array; each flag records whether the slot was filled.
    Receivers(Vec<bool>),
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Void => write!(f, "null"),
            ReturnValue::Value(value) => write!(f, "{value}"),
            ReturnValue::Receiver => write!(f, "<receiver>"),
            ReturnValue::Receivers(slots) => write!(f, "<{} receivers>", slots.len()),
        }
    }
}

/// Everything observed from one side of a paired invocation.
#[derive(Debug, Clone)]
pub struct SideResult {
    /// The arguments after the call, so in-place modification is visible.
    pub arguments: Vec<Value>,
    pub returned: ReturnValue,
    pub threw: Option<CallError>,
    pub stdout: String,
    pub stderr: String,
    pub stdin: String,
    pub interleaved: String,
    pub modified_arguments: bool,
    pub nanos: u64,
}

/// One paired step: the reference and candidate observations plus the
/// verification verdict.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub runner_id: usize,
    /// Global step index across the whole run.
    pub step: usize,
    /// Step index within this runner.
    pub runner_step: usize,
    pub operation: String,
    pub kind: StepKind,
    pub parameter_types: Vec<ValueType>,
    /// Pristine argument copies, never passed to user code.
    pub arguments: Vec<Value>,
    pub provenance: Provenance,
    pub complexity: Complexity,
    pub reference: SideResult,
    pub candidate: SideResult,
    pub mismatches: BTreeSet<Mismatch>,
    pub message: Option<String>,
    pub verifier_message: Option<String>,
    pub(crate) existing_receiver_mismatch: bool,
    /// Random draws consumed when this step finished.
    pub random_draws: usize,
    pub last_draw: u32,
    pub nanos: u64,
}

impl CallRecord {
    pub fn succeeded(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    fn call_string(&self) -> String {
        let parameters = self
            .parameter_types
            .iter()
            .zip(&self.arguments)
            .enumerate()
            .map(|(index, (ty, value))| format!("{ty} p{index} = {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({parameters})", self.operation)
    }

    /// A human-readable explanation of the first relevant difference.
    pub fn explain(&self) -> String {
        let detail = if let Some(message) = &self.verifier_message {
            message.clone()
        } else if self.mismatches.contains(&Mismatch::Threw) {
            let reference = match &self.reference.threw {
                Some(error) => format!("Reference threw: {error}"),
                None => "Reference did not throw".to_string(),
            };
            let candidate = match &self.candidate.threw {
                Some(error) => format!("Candidate threw: {error}"),
                None => "Candidate did not throw".to_string(),
            };
            format!("{reference}\n{candidate}")
        } else if self.mismatches.contains(&Mismatch::Stdout) {
            format!(
                "Reference printed:\n---\n{}---\nCandidate printed:\n---\n{}---",
                self.reference.stdout, self.candidate.stdout
            )
        } else if self.mismatches.contains(&Mismatch::Stderr) {
            format!(
                "Reference printed to STDERR:\n---\n{}---\nCandidate printed to STDERR:\n---\n{}---",
                self.reference.stderr, self.candidate.stderr
            )
        } else if self.mismatches.contains(&Mismatch::InterleavedOutput) {
            format!(
                "Reference interleaved output:\n---\n{}---\nCandidate interleaved output:\n---\n{}---",
                self.reference.interleaved, self.candidate.interleaved
            )
        } else if self.mismatches.contains(&Mismatch::Return) {
            format!(
                "Reference returned: {}\nCandidate returned: {}",
                self.reference.returned, self.candidate.returned
            )
        } else if self.mismatches.contains(&Mismatch::Parameters) {
            match (
                self.reference.modified_arguments,
                self.candidate.modified_arguments,
            ) {
                (false, true) => format!(
                    "Reference did not modify its parameters\nCandidate modified its parameters to [{}]",
                    crate::value::print_values(&self.candidate.arguments)
                ),
                (true, false) => format!(
                    "Reference modified its parameters to [{}]\nCandidate did not modify its parameters",
                    crate::value::print_values(&self.reference.arguments)
                ),
                _ => format!(
                    "Reference modified its parameters to [{}]\nCandidate modified its parameters to [{}]",
                    crate::value::print_values(&self.reference.arguments),
                    crate::value::print_values(&self.candidate.arguments)
                ),
            }
        } else {
            "Unexplained result".to_string()
        };
        let hint = self
            .message
            .as_ref()
            .map(|message| format!("{message}\n"))
            .unwrap_or_default();
        format!("Testing {} failed:\n{hint}{detail}", self.call_string())
    }
}

#[derive(Serialize)]
struct ReportEntry<'a> {
    step: usize,
    runner: usize,
    operation: &'a str,
    kind: StepKind,
    complexity: Complexity,
    provenance: Provenance,
    status: &'static str,
    mismatches: Vec<Mismatch>,
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct Report<'a> {
    subject: &'a str,
    seed: u64,
    total: usize,
    passed: usize,
    failed: usize,
    completed: bool,
    finished_receivers: bool,
    entries: Vec<ReportEntry<'a>>,
}

/// The complete outcome of one test run.
#[derive(Debug)]
pub struct TestResults {
    /// All step records, ordered by global step index.
    pub records: Vec<CallRecord>,
    /// The name of the type under test.
    pub subject: String,
    pub seed: u64,
    /// Whether the full test budget ran.
    pub completed: bool,
    /// Whether the run stopped because it was cancelled.
    pub interrupted: bool,
    /// Whether enough receivers were successfully created.
    pub finished_receivers: bool,
    /// Runners that were created but never stepped.
    pub untested_receivers: usize,
    /// Global indices of steps skipped in run-all mode.
    pub skipped_steps: Vec<usize>,
    pub step_count: usize,
    pub loop_count: usize,
    /// The recorded draw stream, when recording was enabled.
    pub trace: Option<Vec<u32>>,
}

impl TestResults {
    pub fn succeeded(&self) -> bool {
        self.finished_receivers
            && self.completed
            && self.records.iter().all(CallRecord::succeeded)
    }

    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CallRecord> {
        self.records.iter()
    }

    /// The failing step with the least complexity, breaking ties by
    /// earliest step.
    pub fn failure(&self) -> Option<&CallRecord> {
        let least = self
            .records
            .iter()
            .filter(|record| record.failed())
            .map(|record| record.complexity)
            .min()?;
        self.records
            .iter()
            .filter(|record| record.failed() && record.complexity == least)
            .min_by_key(|record| record.step)
    }

    pub fn explain(&self) -> String {
        if self.succeeded() {
            return format!("Passed by completing {} tests", self.records.len());
        }
        if !self.finished_receivers {
            return "Didn't complete generating receivers".to_string();
        }
        match self.failure() {
            Some(record) => record.explain(),
            None => "Did not complete testing".to_string(),
        }
    }

    /// The reference-side call sequence, one line per step.
    pub fn format_sequence(&self) -> String {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let arguments = crate::value::print_values(&record.arguments);
                let call = match record.kind {
                    StepKind::Constructor | StepKind::CopyConstructor => {
                        format!("new {}({arguments})", record.operation)
                    }
                    StepKind::StaticMethod | StepKind::FactoryMethod => {
                        format!("{}.{}({arguments})", self.subject, record.operation)
                    }
                    StepKind::InstanceMethod | StepKind::Initializer => format!(
                        "{}#{}.{}({arguments})",
                        self.subject, record.runner_id, record.operation
                    ),
                };
                let outcome = if let Some(error) = &record.reference.threw {
                    format!(" threw {}", error.kind)
                } else {
                    match &record.reference.returned {
                        ReturnValue::Void => {
                            if record.reference.stdout.is_empty() {
                                String::new()
                            } else {
                                format!(" printed \"{}\"", record.reference.stdout.trim_end())
                            }
                        }
                        ReturnValue::Receiver => {
                            format!(" -> {}#{}", self.subject, record.runner_id)
                        }
                        other => format!(" -> {other}"),
                    }
                };
                format!("{index:>3}: {call}{outcome}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Machine-readable summary of the run.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries = self
            .records
            .iter()
            .map(|record| ReportEntry {
                step: record.step,
                runner: record.runner_id,
                operation: &record.operation,
                kind: record.kind,
                complexity: record.complexity,
                provenance: record.provenance,
                status: if record.succeeded() { "passed" } else { "failed" },
                mismatches: record.mismatches.iter().copied().collect(),
                message: record.message.as_deref(),
            })
            .collect();
        let passed = self
            .records
            .iter()
            .filter(|record| record.succeeded())
            .count();
        serde_json::to_string_pretty(&Report {
            subject: &self.subject,
            seed: self.seed,
            total: self.records.len(),
            passed,
            failed: self.records.len() - passed,
            completed: self.completed,
            finished_receivers: self.finished_receivers,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side() -> SideResult {
        SideResult {
            arguments: vec![Value::Int(1)],
            returned: ReturnValue::Value(Value::Int(2)),
            threw: None,
            stdout: String::new(),
            stderr: String::new(),
            stdin: String::new(),
            interleaved: String::new(),
            modified_arguments: false,
            nanos: 0,
        }
    }

    fn record(step: usize, complexity: u8, mismatches: &[Mismatch]) -> CallRecord {
        CallRecord {
            runner_id: 0,
            step,
            runner_step: step,
            operation: "add".into(),
            kind: StepKind::InstanceMethod,
            parameter_types: vec![ValueType::Int],
            arguments: vec![Value::Int(1)],
            provenance: Provenance::Random,
            complexity: Complexity::new(complexity),
            reference: side(),
            candidate: side(),
            mismatches: mismatches.iter().copied().collect(),
            message: None,
            verifier_message: None,
            existing_receiver_mismatch: false,
            random_draws: 0,
            last_draw: 0,
            nanos: 0,
        }
    }

    fn results(records: Vec<CallRecord>) -> TestResults {
        TestResults {
            records,
            subject: "Counter".into(),
            seed: 124,
            completed: true,
            interrupted: false,
            finished_receivers: true,
            untested_receivers: 0,
            skipped_steps: Vec::new(),
            step_count: 0,
            loop_count: 0,
            trace: None,
        }
    }

    #[test]
    fn failure_selection_prefers_least_complexity_then_earliest_step() {
        let results = results(vec![
            record(0, 4, &[Mismatch::Return]),
            record(1, 2, &[Mismatch::Return]),
            record(2, 2, &[Mismatch::Threw]),
            record(3, 7, &[]),
        ]);
        let failure = results.failure().unwrap();
        assert_eq!(failure.step, 1);
    }

    #[test]
    fn explain_reports_return_differences_with_both_sides() {
        let mut failing = record(0, 1, &[Mismatch::Return]);
        failing.candidate.returned = ReturnValue::Value(Value::Int(3));
        let explanation = failing.explain();
        assert!(explanation.contains("Testing add(int p0 = 1) failed"));
        assert!(explanation.contains("Reference returned: 2"));
        assert!(explanation.contains("Candidate returned: 3"));
    }

    #[test]
    fn explain_prefers_throws_over_other_differences() {
        let mut failing = record(0, 1, &[Mismatch::Threw, Mismatch::Return]);
        failing.candidate.threw = Some(CallError::arithmetic("divide by zero"));
        failing.candidate.returned = ReturnValue::Void;
        let explanation = failing.explain();
        assert!(explanation.contains("Reference did not throw"));
        assert!(explanation.contains("Candidate threw: Arithmetic: divide by zero"));
        assert!(!explanation.contains("Candidate returned"));
    }

    #[test]
    fn newline_hint_is_prepended_to_the_explanation() {
        let mut failing = record(0, 1, &[Mismatch::Stdout]);
        failing.reference.stdout = "5\n".into();
        failing.candidate.stdout = "5".into();
        failing.message = Some("Output is missing a newline".into());
        let explanation = failing.explain();
        assert!(explanation.contains("Output is missing a newline\n"));
    }

    #[test]
    fn success_requires_completion_and_receivers() {
        let mut incomplete = results(vec![record(0, 1, &[])]);
        assert!(incomplete.succeeded());
        incomplete.completed = false;
        assert!(incomplete.failed());
        incomplete.completed = true;
        incomplete.finished_receivers = false;
        assert!(incomplete.failed());
        assert_eq!(incomplete.explain(), "Didn't complete generating receivers");
    }

    #[test]
    fn json_report_counts_passed_and_failed_steps() {
        let results = results(vec![record(0, 1, &[]), record(1, 1, &[Mismatch::Return])]);
        let json = results.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total"], 2);
        assert_eq!(parsed["passed"], 1);
        assert_eq!(parsed["failed"], 1);
        assert_eq!(parsed["entries"][1]["mismatches"][0], "Return");
    }

    #[test]
    fn sequence_formatting_names_receivers_by_runner() {
        let mut constructor = record(0, 1, &[]);
        constructor.kind = StepKind::Constructor;
        constructor.operation = "Counter".into();
        constructor.reference.returned = ReturnValue::Receiver;
        let results = results(vec![constructor, record(1, 1, &[])]);
        let sequence = results.format_sequence();
        assert!(sequence.contains("new Counter(1) -> Counter#0"));
        assert!(sequence.contains("Counter#0.add(1) -> 2"));
    }
}
