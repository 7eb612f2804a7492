//! Per-receiver test runners: operation selection, paired invocation, and
//! receiver harvesting.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;

use crate::capture::{capture, Captured};
use crate::complexity::Complexity;
use crate::error::{ConfigError, TestError};
use crate::generators::ArgumentsGenerator;
use crate::harness::{Harness, ResolvedSettings};
use crate::operation::{
    Callable, CallError, CallInput, ErrorKind, OpKind, Operation, Returned, StepVerdict,
};
use crate::report::{CallRecord, ReturnValue, SideResult, StepKind};
use crate::rng::RecordingRng;
use crate::value::{same_instance, Instance, Value};
use crate::verify::{values_equal, verify};

/// The five tracked copies of one receiver, one per invocation lane.
#[derive(Default)]
pub(crate) struct ReceiverSet {
    pub reference: Option<Instance>,
    pub candidate: Option<Instance>,
    pub reference_scratch: Option<Instance>,
    pub candidate_scratch: Option<Instance>,
    pub unmodified: Option<Instance>,
}

/// Everything a runner needs to execute one step.
pub(crate) struct RunContext<'a> {
    pub harness: &'a Harness,
    pub settings: &'a ResolvedSettings,
    pub rng: &'a RecordingRng,
    /// All tracked receiver sets, indexed by [`Value::Receiver`].
    pub pool: Rc<RefCell<Vec<ReceiverSet>>>,
    pub generators: &'a IndexMap<String, RefCell<ArgumentsGenerator>>,
    pub cycle: RefCell<ReceiverOpCycle>,
}

impl RunContext<'_> {
    fn generator(&self, name: &str) -> Result<&RefCell<ArgumentsGenerator>, ConfigError> {
        self.generators
            .get(name)
            .ok_or_else(|| ConfigError::UnknownOperation {
                name: name.to_string(),
            })
    }
}

/// Cycles through the receiver-creating operations in shuffled order,
/// reshuffling after each full pass.
pub(crate) struct ReceiverOpCycle {
    ops: Vec<String>,
    queue: Vec<String>,
}

impl ReceiverOpCycle {
    pub(crate) fn new(ops: Vec<String>) -> ReceiverOpCycle {
        ReceiverOpCycle {
            ops,
            queue: Vec::new(),
        }
    }

    pub(crate) fn next(&mut self, rng: &RecordingRng) -> Option<String> {
        if self.queue.is_empty() {
            self.queue = self.ops.clone();
            rng.shuffle(&mut self.queue);
        }
        self.queue.pop()
    }
}

struct PickEntry {
    name: String,
    weight: f64,
    limit: Option<usize>,
    count: usize,
}

impl PickEntry {
    fn active(&self) -> bool {
        self.limit.map(|limit| self.count < limit).unwrap_or(true)
    }
}

/// Weighted operation selection with per-runner call limits and no
/// immediate repeats.
pub(crate) struct OpPicker {
    entries: Vec<PickEntry>,
    previous: Option<usize>,
}

fn select(entries: &[PickEntry], active: &[usize], rng: &RecordingRng) -> usize {
    let total: f64 = active.iter().map(|index| entries[*index].weight).sum();
    let draw = rng.gen_f64() * total;
    let mut cumulative = 0.0;
    for index in active {
        cumulative += entries[*index].weight;
        if draw < cumulative {
            return *index;
        }
    }
    active[active.len() - 1]
}

impl OpPicker {
    pub(crate) fn new(harness: &Harness) -> OpPicker {
        let mut entries: Vec<PickEntry> = harness
            .test_ops
            .iter()
            .filter_map(|name| harness.operations.get(name.as_str()))
            .map(|operation| PickEntry {
                name: operation.name.clone(),
                weight: operation.weight,
                limit: operation.limit,
                count: 0,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        OpPicker {
            entries,
            previous: None,
        }
    }

    pub(crate) fn more(&self) -> bool {
        self.entries.iter().any(PickEntry::active)
    }

    pub(crate) fn next(&mut self, rng: &RecordingRng) -> Result<String, ConfigError> {
        let active: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.active())
            .map(|(index, _)| index)
            .collect();
        if active.is_empty() {
            return Err(ConfigError::LimitsExhausted);
        }
        let mut choice = select(&self.entries, &active, rng);
        if active.len() > 1 && Some(choice) == self.previous {
            choice = select(&self.entries, &active, rng);
        }
        self.entries[choice].count += 1;
        self.previous = Some(choice);
        Ok(self.entries[choice].name.clone())
    }
}

fn invoke(
    callable: &Callable,
    operation: &Operation,
    receiver: Option<&Instance>,
    arguments: &mut [Value],
    resolve: &dyn Fn(usize) -> Option<Instance>,
) -> (Captured, u64) {
    let start = Instant::now();
    let captured = capture(&operation.inputs, |io| {
        callable(CallInput {
            receiver,
            arguments,
            io,
            resolve,
        })
    });
    (captured, start.elapsed().as_nanos() as u64)
}

fn returned_instances(outcome: &Result<Returned, CallError>) -> Vec<Option<Instance>> {
    match outcome {
        Ok(Returned::Instance(instance)) => vec![Some(instance.clone())],
        Ok(Returned::Instances(instances)) => instances.clone(),
        _ => Vec::new(),
    }
}

fn return_shape(outcome: &Result<Returned, CallError>) -> ReturnValue {
    match outcome {
        Ok(Returned::None) | Err(_) => ReturnValue::Void,
        Ok(Returned::Value(value)) => ReturnValue::Value(value.clone()),
        Ok(Returned::Instance(_)) => ReturnValue::Receiver,
        Ok(Returned::Instances(instances)) => {
            ReturnValue::Receivers(instances.iter().map(Option::is_some).collect())
        }
    }
}

fn side_result(
    captured: Captured,
    arguments: Vec<Value>,
    modified_arguments: bool,
    nanos: u64,
) -> SideResult {
    SideResult {
        arguments,
        returned: return_shape(&captured.outcome),
        threw: captured.outcome.err(),
        stdout: captured.stdout,
        stderr: captured.stderr,
        stdin: captured.stdin,
        interleaved: captured.interleaved,
        modified_arguments,
        nanos,
    }
}

/// Tests one receiver (or the static surface) through its lifecycle:
/// creation, optional initialization, then method steps.
pub(crate) struct TestRunner {
    pub id: usize,
    /// Index of this runner's receiver set in the tracked pool.
    pub receiver: Option<usize>,
    pub static_only: bool,
    pub created: bool,
    pub initialized: bool,
    /// Whether any step has run on this runner.
    pub tested: bool,
    pub records: Vec<CallRecord>,
    /// Global indices of steps skipped because the candidate receiver was
    /// never created.
    pub skipped: Vec<usize>,
    pub picker: OpPicker,
    pub ran_last: bool,
    pub skipped_last: bool,
    pub last_complexity: Option<Complexity>,
    /// Receiver sets returned by steps, drained by the driver.
    pub returned_receivers: Vec<ReceiverSet>,
    count: usize,
}

impl TestRunner {
    pub(crate) fn new(
        id: usize,
        receiver: Option<usize>,
        static_only: bool,
        picker: OpPicker,
    ) -> TestRunner {
        TestRunner {
            id,
            receiver,
            static_only,
            created: receiver.is_some() || static_only,
            initialized: false,
            tested: false,
            records: Vec::new(),
            skipped: Vec::new(),
            picker,
            ran_last: false,
            skipped_last: false,
            last_complexity: None,
            returned_receivers: Vec::new(),
            count: 0,
        }
    }

    pub(crate) fn failed(&self) -> bool {
        self.records.iter().any(CallRecord::failed)
    }

    pub(crate) fn ready(&self, ctx: &RunContext<'_>) -> bool {
        if !self.picker.more() {
            return false;
        }
        if self.static_only {
            return true;
        }
        if ctx.settings.run_all {
            self.receiver
                .map(|index| ctx.pool.borrow()[index].reference.is_some())
                .unwrap_or(false)
        } else {
            !self.failed() && self.receiver.is_some()
        }
    }

    fn will_skip(&self, ctx: &RunContext<'_>) -> bool {
        ctx.settings.run_all
            && !self.static_only
            && self.created
            && self
                .receiver
                .map(|index| ctx.pool.borrow()[index].candidate.is_none())
                .unwrap_or(false)
    }

    /// Runs the next step in this runner's lifecycle.
    pub(crate) fn step(&mut self, ctx: &RunContext<'_>, step: usize) -> Result<(), TestError> {
        if !self.created {
            let name = ctx
                .cycle
                .borrow_mut()
                .next(ctx.rng)
                .ok_or(ConfigError::NoReceiverAvailable)?;
            let operation = ctx
                .harness
                .operations
                .get(name.as_str())
                .ok_or_else(|| ConfigError::UnknownOperation { name: name.clone() })?
                .clone();
            self.run(ctx, &operation, step, false)?;
            self.created = true;
        } else if !self.initialized && ctx.harness.initializer.is_some() {
            if let Some(initializer) = ctx.harness.initializer.clone() {
                self.run(ctx, &initializer, step, true)?;
            }
            self.initialized = true;
        } else {
            self.initialized = true;
            let name = self.picker.next(ctx.rng)?;
            let operation = ctx
                .harness
                .operations
                .get(name.as_str())
                .ok_or_else(|| ConfigError::UnknownOperation { name: name.clone() })?
                .clone();
            self.run(ctx, &operation, step, false)?;
        }
        self.tested = true;
        Ok(())
    }

    fn run(
        &mut self,
        ctx: &RunContext<'_>,
        operation: &Operation,
        step: usize,
        initializing: bool,
    ) -> Result<(), TestError> {
        self.ran_last = false;
        self.skipped_last = false;
        if self.will_skip(ctx) {
            self.skipped.push(step);
            self.skipped_last = true;
            return Ok(());
        }
        let creating = !self.created && !initializing;
        let generator = ctx.generator(&operation.name)?;
        let mut arguments = generator.borrow_mut().generate(ctx.rng)?;

        if let Some(filter) = &operation.filter {
            match filter(&arguments.reference) {
                StepVerdict::Run => {}
                StepVerdict::Skip => return Ok(()),
                StepVerdict::Bound => {
                    generator.borrow_mut().prev();
                    return Ok(());
                }
            }
        }

        let kind = if initializing {
            StepKind::Initializer
        } else if creating {
            match operation.kind {
                OpKind::Constructor => StepKind::Constructor,
                _ => StepKind::FactoryMethod,
            }
        } else {
            match operation.kind {
                OpKind::Constructor => StepKind::CopyConstructor,
                OpKind::Factory => StepKind::FactoryMethod,
                OpKind::Static => StepKind::StaticMethod,
                OpKind::Instance | OpKind::Both => {
                    if self.static_only || ctx.harness.faux_static {
                        StepKind::StaticMethod
                    } else {
                        StepKind::InstanceMethod
                    }
                }
            }
        };
        let display_arguments = arguments.unmodified.clone();

        let use_receiver =
            initializing || matches!(operation.kind, OpKind::Instance | OpKind::Both);
        let (
            receiver_reference,
            receiver_candidate,
            receiver_reference_scratch,
            receiver_candidate_scratch,
            receiver_unmodified,
        ) = match (use_receiver, self.receiver) {
            (true, Some(index)) => {
                let pool = ctx.pool.borrow();
                let set = &pool[index];
                (
                    set.reference.clone(),
                    set.candidate.clone(),
                    set.reference_scratch.clone(),
                    set.candidate_scratch.clone(),
                    set.unmodified.clone(),
                )
            }
            _ => (None, None, None, None, None),
        };

        let pool = ctx.pool.clone();
        let resolve_reference =
            |index: usize| pool.borrow().get(index).and_then(|set| set.reference.clone());
        let resolve_candidate =
            |index: usize| pool.borrow().get(index).and_then(|set| set.candidate.clone());
        let resolve_reference_scratch = |index: usize| {
            pool.borrow()
                .get(index)
                .and_then(|set| set.reference_scratch.clone())
        };
        let resolve_candidate_scratch = |index: usize| {
            pool.borrow()
                .get(index)
                .and_then(|set| set.candidate_scratch.clone())
        };
        let resolve_unmodified = |index: usize| {
            pool.borrow()
                .get(index)
                .and_then(|set| set.unmodified.clone())
        };

        let (reference_main, reference_nanos) = invoke(
            &operation.reference,
            operation,
            receiver_reference.as_ref(),
            &mut arguments.reference,
            &resolve_reference,
        );
        let reference_modified = !values_equal(
            &arguments.reference,
            &arguments.reference_scratch,
            &ctx.harness.comparators,
        );
        let (reference_scratch, _) = invoke(
            &operation.reference,
            operation,
            receiver_reference_scratch.as_ref(),
            &mut arguments.reference_scratch,
            &resolve_reference_scratch,
        );

        // Control signals from the reference discard the step entirely.
        if let Err(error) = &reference_main.outcome {
            match error.kind {
                ErrorKind::Skip => return Ok(()),
                ErrorKind::Bound => {
                    generator.borrow_mut().prev();
                    return Ok(());
                }
                _ => {}
            }
        }

        let (candidate_main, candidate_nanos) = invoke(
            &operation.candidate,
            operation,
            receiver_candidate.as_ref(),
            &mut arguments.candidate,
            &resolve_candidate,
        );
        let candidate_modified = !values_equal(
            &arguments.candidate,
            &arguments.candidate_scratch,
            &ctx.harness.comparators,
        );
        let (candidate_scratch, _) = invoke(
            &operation.candidate,
            operation,
            receiver_candidate_scratch.as_ref(),
            &mut arguments.candidate_scratch,
            &resolve_candidate_scratch,
        );
        let (unmodified_run, _) = invoke(
            &operation.candidate,
            operation,
            receiver_unmodified.as_ref(),
            &mut arguments.unmodified,
            &resolve_unmodified,
        );

        if let Err(error) = &candidate_main.outcome {
            if error.is_control() {
                return Err(ConfigError::CandidateControlSignal {
                    operation: operation.name.clone(),
                }
                .into());
            }
        }

        // Gather created receivers across all five lanes, keyed by the
        // reference lane's slots.
        let reference_created = returned_instances(&reference_main.outcome);
        let candidate_created = returned_instances(&candidate_main.outcome);
        let reference_scratch_created = returned_instances(&reference_scratch.outcome);
        let candidate_scratch_created = returned_instances(&candidate_scratch.outcome);
        let unmodified_created = returned_instances(&unmodified_run.outcome);

        let mut created_sets: Vec<ReceiverSet> = Vec::new();
        let mut existing_receiver_mismatch = false;
        for (slot, reference_instance) in reference_created.iter().enumerate() {
            let Some(reference_instance) = reference_instance else {
                continue;
            };
            let candidate_instance = candidate_created.get(slot).cloned().flatten();
            let tracked = {
                let pool = ctx.pool.borrow();
                pool.iter().position(|set| {
                    matches!(&set.reference, Some(existing) if same_instance(existing, reference_instance))
                })
            };
            if let Some(index) = tracked {
                // An aliased receiver must alias on both sides.
                let aligned = match (&ctx.pool.borrow()[index].candidate, &candidate_instance) {
                    (Some(a), Some(b)) => same_instance(a, b),
                    (None, None) => true,
                    _ => false,
                };
                if !aligned {
                    existing_receiver_mismatch = true;
                }
            }
            created_sets.push(ReceiverSet {
                reference: Some(reference_instance.clone()),
                candidate: candidate_instance,
                reference_scratch: reference_scratch_created.get(slot).cloned().flatten(),
                candidate_scratch: candidate_scratch_created.get(slot).cloned().flatten(),
                unmodified: unmodified_created.get(slot).cloned().flatten(),
            });
        }

        let mut record = CallRecord {
            runner_id: self.id,
            step,
            runner_step: self.count,
            operation: operation.name.clone(),
            kind,
            parameter_types: operation.parameters.clone(),
            arguments: display_arguments,
            provenance: arguments.provenance,
            complexity: arguments.complexity,
            reference: side_result(
                reference_main,
                arguments.reference,
                reference_modified,
                reference_nanos,
            ),
            candidate: side_result(
                candidate_main,
                arguments.candidate,
                candidate_modified,
                candidate_nanos,
            ),
            mismatches: BTreeSet::new(),
            message: None,
            verifier_message: None,
            existing_receiver_mismatch,
            random_draws: ctx.rng.draws(),
            last_draw: ctx.rng.last_draw(),
            nanos: reference_nanos + candidate_nanos,
        };
        self.count += 1;
        self.ran_last = true;

        verify(
            &mut record,
            operation.verifier.as_ref(),
            &ctx.harness.comparators,
            operation.strict_output || ctx.settings.strict_output,
        );

        if record.succeeded() || ctx.settings.run_all {
            generator.borrow_mut().next();
        } else {
            generator.borrow_mut().prev();
        }
        self.last_complexity = Some(record.complexity);

        if record.succeeded() || ctx.settings.run_all {
            let mut remaining = created_sets.into_iter();
            if creating {
                if let Some(first) = remaining.next() {
                    let mut pool = ctx.pool.borrow_mut();
                    pool.push(first);
                    self.receiver = Some(pool.len() - 1);
                }
            }
            self.returned_receivers.extend(remaining);
        }

        tracing::trace!(
            runner = self.id,
            step,
            operation = %record.operation,
            succeeded = record.succeeded(),
            "step finished"
        );
        self.records.push(record);
        Ok(())
    }
}
