//! Harness construction: registering operations, deriving defaults, and
//! validating the whole configuration before a run.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::{ConfigError, TestError};
use crate::generators::{pool_sizes, PoolCaps, RandomValue, TypeOverrides};
use crate::operation::{
    ArgumentFilter, Callable, OpKind, Operation, RandomArguments, Verifier,
};
use crate::report::TestResults;
use crate::value::{Value, ValueType};
use crate::verify::{CompareErrors, CompareValues, Comparators};

/// How many creation attempts each wanted receiver is budgeted.
pub(crate) const RECEIVER_RETRIES: usize = 4;

/// Run configuration. Unset fields fall back to the harness-level settings
/// and then to derived defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub seed: Option<u64>,
    /// Total step budget. Incompatible with the min and max bounds.
    pub test_count: Option<usize>,
    pub min_test_count: Option<usize>,
    pub max_test_count: Option<usize>,
    /// How many receivers to create before testing is considered complete.
    pub receiver_count: Option<usize>,
    /// Per-receiver method step budget.
    pub method_count: Option<usize>,
    /// Rerun failing operations at shrinking complexity instead of
    /// stopping at the first failure.
    pub shrink: Option<bool>,
    /// Keep testing past failures, recording every mismatch.
    pub run_all: Option<bool>,
    /// Compare output byte for byte on every operation, even when the
    /// reference printed nothing.
    pub strict_output: Option<bool>,
    /// Record the random draw stream for later replay.
    pub record_trace: Option<bool>,
    pub simple_cap: Option<usize>,
    pub edge_cap: Option<usize>,
    pub mixed_cap: Option<usize>,
    pub fixed_cap: Option<usize>,
}

impl Settings {
    pub(crate) fn defaults() -> Settings {
        Settings {
            shrink: Some(true),
            run_all: Some(false),
            record_trace: Some(false),
            ..Settings::default()
        }
    }

    /// Field-wise overlay; set fields in `other` win.
    pub fn merge(&self, other: &Settings) -> Settings {
        Settings {
            seed: other.seed.or(self.seed),
            test_count: other.test_count.or(self.test_count),
            min_test_count: other.min_test_count.or(self.min_test_count),
            max_test_count: other.max_test_count.or(self.max_test_count),
            receiver_count: other.receiver_count.or(self.receiver_count),
            method_count: other.method_count.or(self.method_count),
            shrink: other.shrink.or(self.shrink),
            run_all: other.run_all.or(self.run_all),
            strict_output: other.strict_output.or(self.strict_output),
            record_trace: other.record_trace.or(self.record_trace),
            simple_cap: other.simple_cap.or(self.simple_cap),
            edge_cap: other.edge_cap.or(self.edge_cap),
            mixed_cap: other.mixed_cap.or(self.mixed_cap),
            fixed_cap: other.fixed_cap.or(self.fixed_cap),
        }
    }
}

/// Settings after merging and defaulting, ready to drive a run.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSettings {
    pub seed: u64,
    pub test_count: usize,
    pub method_count: usize,
    pub needed_receivers: usize,
    pub shrink: bool,
    pub run_all: bool,
    pub strict_output: bool,
    pub record_trace: bool,
    pub caps: PoolCaps,
}

/// Configures the operation just registered. Returned by the registration
/// methods on [`HarnessBuilder`].
pub struct OpConfig<'a> {
    operation: &'a mut Operation,
}

impl<'a> OpConfig<'a> {
    /// Selection weight relative to other operations.
    pub fn weight(self, weight: f64) -> OpConfig<'a> {
        self.operation.weight = weight;
        self
    }

    /// Maximum number of times this operation runs per receiver.
    pub fn limit(self, limit: usize) -> OpConfig<'a> {
        self.operation.limit = Some(limit);
        self
    }

    /// Compare output byte for byte even when the reference printed
    /// nothing.
    pub fn strict_output(self) -> OpConfig<'a> {
        self.operation.strict_output = true;
        self
    }

    /// Replaces the generated fixed pool with explicit argument tuples.
    pub fn fixed(self, tuples: Vec<Vec<Value>>) -> OpConfig<'a> {
        self.operation.fixed = Some(tuples);
        self
    }

    /// Replaces random argument generation with a custom callback.
    ///
    /// The callback draws from an isolated child generator and must be
    /// deterministic for a fixed seed.
    pub fn random_arguments(self, random: RandomArguments) -> OpConfig<'a> {
        self.operation.random = Some(random);
        self
    }

    /// Inspects each generated tuple before the step runs; may discard it
    /// or bound further complexity growth.
    pub fn filter(self, filter: ArgumentFilter) -> OpConfig<'a> {
        self.operation.filter = Some(filter);
        self
    }

    /// Replaces the default step verification entirely.
    pub fn verify(self, verifier: Verifier) -> OpConfig<'a> {
        self.operation.verifier = Some(verifier);
        self
    }

    /// Scripted stdin lines served to every invocation of this operation.
    pub fn stdin<I, S>(self, lines: I) -> OpConfig<'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation.inputs.stdin = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Initial virtual file contents for every invocation.
    pub fn file(self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> OpConfig<'a> {
        self.operation
            .inputs
            .files
            .insert(name.into(), contents.into());
        self
    }

    /// All initial virtual files at once.
    pub fn files(self, files: BTreeMap<String, Vec<u8>>) -> OpConfig<'a> {
        self.operation.inputs.files = files;
        self
    }
}

/// Builds a [`Harness`] by registering paired operations and run-wide
/// configuration.
pub struct HarnessBuilder {
    subject: String,
    operations: Vec<Operation>,
    initializer: Option<Operation>,
    duplicate_initializer: bool,
    overrides: TypeOverrides,
    comparators: Comparators,
    settings: Settings,
    faux_static: bool,
}

impl HarnessBuilder {
    pub fn new(subject: impl Into<String>) -> HarnessBuilder {
        HarnessBuilder {
            subject: subject.into(),
            operations: Vec::new(),
            initializer: None,
            duplicate_initializer: false,
            overrides: TypeOverrides::default(),
            comparators: Comparators::default(),
            settings: Settings::default(),
            faux_static: false,
        }
    }

    fn register(
        &mut self,
        name: impl Into<String>,
        kind: OpKind,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        self.operations
            .push(Operation::new(name, kind, parameters, reference, candidate));
        OpConfig {
            operation: self.operations.last_mut().unwrap(),
        }
    }

    /// A constructor pair. Constructors taking a receiver parameter are
    /// tested as copy constructors; all others create receivers.
    pub fn constructor(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        self.register(name, OpKind::Constructor, parameters, reference, candidate)
    }

    /// A static factory pair producing one or more receivers.
    pub fn factory(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        self.register(name, OpKind::Factory, parameters, reference, candidate)
    }

    /// An instance method pair.
    pub fn method(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        self.register(name, OpKind::Instance, parameters, reference, candidate)
    }

    /// A static method pair.
    pub fn static_method(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        self.register(name, OpKind::Static, parameters, reference, candidate)
    }

    /// A shared nullary utility applied identically to both sides'
    /// receivers.
    pub fn both(&mut self, name: impl Into<String>, shared: Callable) -> OpConfig<'_> {
        self.register(name, OpKind::Both, Vec::new(), shared.clone(), shared)
    }

    /// A pair run once on each receiver immediately after creation.
    pub fn initializer(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<ValueType>,
        reference: Callable,
        candidate: Callable,
    ) -> OpConfig<'_> {
        if self.initializer.is_some() {
            self.duplicate_initializer = true;
        }
        self.initializer = Some(Operation::new(
            name,
            OpKind::Instance,
            parameters,
            reference,
            candidate,
        ));
        OpConfig {
            operation: self.initializer.as_mut().unwrap(),
        }
    }

    /// Replaces the simple tier for one type wherever it appears.
    pub fn simple_values(&mut self, ty: ValueType, values: Vec<Value>) -> &mut HarnessBuilder {
        self.overrides.set_simple(ty, values);
        self
    }

    /// Replaces the edge tier for one type wherever it appears.
    pub fn edge_values(&mut self, ty: ValueType, values: Vec<Value>) -> &mut HarnessBuilder {
        self.overrides.set_edge(ty, values);
        self
    }

    /// Replaces random generation for one type wherever it appears.
    pub fn random_values(&mut self, ty: ValueType, random: RandomValue) -> &mut HarnessBuilder {
        self.overrides.set_random(ty, random);
        self
    }

    /// Custom equality for values of one type, applied at every nesting
    /// level.
    pub fn compare(&mut self, ty: ValueType, compare: CompareValues) -> &mut HarnessBuilder {
        self.comparators.set_value(ty, compare);
        self
    }

    /// Custom equivalence for thrown errors.
    pub fn compare_errors(&mut self, compare: CompareErrors) -> &mut HarnessBuilder {
        self.comparators.set_errors(compare);
        self
    }

    /// Treat the subject as stateless: one shared receiver is created and
    /// every method step is reported as static.
    pub fn faux_static(&mut self) -> &mut HarnessBuilder {
        self.faux_static = true;
        self
    }

    /// Harness-level settings, overridable per run.
    pub fn settings(&mut self, settings: Settings) -> &mut HarnessBuilder {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Harness, ConfigError> {
        if self.duplicate_initializer {
            return Err(ConfigError::MultipleInitializers);
        }
        if self.operations.is_empty() {
            return Err(ConfigError::NoOperations);
        }
        let mut names: Vec<&str> = self
            .operations
            .iter()
            .map(|operation| operation.name.as_str())
            .collect();
        if let Some(initializer) = &self.initializer {
            names.push(&initializer.name);
        }
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(ConfigError::DuplicateOperation {
                    name: pair[0].to_string(),
                });
            }
        }

        let all = || self.operations.iter().chain(self.initializer.iter());
        for operation in all() {
            validate_operation(operation)?;
        }
        self.overrides.validate()?;

        let receiver_ops: Vec<String> = self
            .operations
            .iter()
            .filter(|operation| {
                operation.produces_receivers() && !operation.takes_receiver_parameter()
            })
            .map(|operation| operation.name.clone())
            .collect();
        let test_ops: Vec<String> = self
            .operations
            .iter()
            .filter(|operation| !receiver_ops.contains(&operation.name))
            .map(|operation| operation.name.clone())
            .collect();

        let needs_receiver = self.initializer.is_some()
            || all().any(|operation| {
                matches!(operation.kind, OpKind::Instance | OpKind::Both)
                    || operation.takes_receiver_parameter()
            });
        if needs_receiver && receiver_ops.is_empty() {
            let name = all()
                .find(|operation| {
                    matches!(operation.kind, OpKind::Instance | OpKind::Both)
                        || operation.takes_receiver_parameter()
                })
                .map(|operation| operation.name.clone())
                .unwrap_or_default();
            return Err(ConfigError::MissingReceiverSource { name });
        }
        if self.faux_static {
            let nullary_constructor = self.operations.iter().any(|operation| {
                operation.kind == OpKind::Constructor && operation.parameters.is_empty()
            });
            if !nullary_constructor {
                return Err(ConfigError::BadSettings {
                    reason: "faux-static testing requires a constructor with no parameters"
                        .into(),
                });
            }
        }
        let skip_receiver = !self.faux_static
            && !needs_receiver
            && (receiver_ops.is_empty()
                || (receiver_ops.len() == 1
                    && self.operations.iter().any(|operation| {
                        operation.name == receiver_ops[0]
                            && operation.kind == OpKind::Constructor
                            && operation.parameters.is_empty()
                    })));
        let receiver_as_parameter = all().any(|operation| {
            operation.takes_receiver_parameter() || operation.takes_any_parameter()
        });

        let mut operations = IndexMap::new();
        for operation in self.operations {
            operations.insert(operation.name.clone(), operation);
        }

        let mut harness = Harness {
            subject: self.subject,
            operations,
            initializer: self.initializer,
            receiver_ops,
            test_ops,
            overrides: self.overrides,
            comparators: self.comparators,
            settings: self.settings,
            faux_static: self.faux_static,
            skip_receiver,
            receiver_as_parameter,
            default_receiver_count: 0,
            default_method_count: 0,
            default_total_count: 0,
            max_count: usize::MAX,
        };
        harness.derive_counts();
        tracing::debug!(
            subject = %harness.subject,
            receivers = harness.default_receiver_count,
            methods = harness.default_method_count,
            total = harness.default_total_count,
            "harness built"
        );
        Ok(harness)
    }
}

fn validate_operation(operation: &Operation) -> Result<(), ConfigError> {
    if !operation.weight.is_finite() || operation.weight <= 0.0 {
        return Err(ConfigError::BadWeight {
            operation: operation.name.clone(),
            weight: operation.weight.to_string(),
        });
    }
    if operation.kind == OpKind::Both && !operation.parameters.is_empty() {
        return Err(ConfigError::BadOperation {
            name: operation.name.clone(),
            reason: "shared utilities take no parameters".into(),
        });
    }
    if let Some(tuples) = &operation.fixed {
        for tuple in tuples {
            if tuple.len() != operation.parameters.len() {
                return Err(ConfigError::BadFixedArguments {
                    operation: operation.name.clone(),
                    reason: format!(
                        "tuple has {} values but the operation takes {}",
                        tuple.len(),
                        operation.parameters.len()
                    ),
                });
            }
            for (ty, value) in operation.parameters.iter().zip(tuple) {
                if !ty.accepts(value) {
                    return Err(ConfigError::BadFixedArguments {
                        operation: operation.name.clone(),
                        reason: format!("value {value} does not have type {ty}"),
                    });
                }
            }
        }
    }
    Ok(())
}

/// A validated pair of implementations ready for lockstep testing.
pub struct Harness {
    pub(crate) subject: String,
    pub(crate) operations: IndexMap<String, Operation>,
    pub(crate) initializer: Option<Operation>,
    /// Operations that create receivers when invoked without one.
    pub(crate) receiver_ops: Vec<String>,
    /// Operations selected by the per-runner picker.
    pub(crate) test_ops: Vec<String>,
    pub(crate) overrides: TypeOverrides,
    pub(crate) comparators: Comparators,
    pub(crate) settings: Settings,
    pub(crate) faux_static: bool,
    pub(crate) skip_receiver: bool,
    pub(crate) receiver_as_parameter: bool,
    pub(crate) default_receiver_count: usize,
    pub(crate) default_method_count: usize,
    pub(crate) default_total_count: usize,
    pub(crate) max_count: usize,
}

impl Harness {
    pub fn builder(subject: impl Into<String>) -> HarnessBuilder {
        HarnessBuilder::new(subject)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Runs the full lockstep comparison.
    pub fn test(&self, settings: Settings) -> Result<TestResults, TestError> {
        crate::driver::run(self, settings, None, None)
    }

    /// Runs with a cancellation flag checked between steps.
    pub fn test_cancellable(
        &self,
        settings: Settings,
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<TestResults, TestError> {
        crate::driver::run(self, settings, None, Some(cancel))
    }

    /// Replays a recorded draw stream, failing on the first divergence.
    pub fn test_following(
        &self,
        settings: Settings,
        trace: Vec<u32>,
    ) -> Result<TestResults, TestError> {
        crate::driver::run(self, settings, Some(trace), None)
    }

    fn operation(&self, name: &str) -> &Operation {
        &self.operations[name]
    }

    /// Estimated fixed pool size for one operation, without consuming
    /// randomness.
    fn fixed_estimate(&self, operation: &Operation) -> usize {
        if let Some(tuples) = &operation.fixed {
            return tuples.len();
        }
        if operation.parameters.is_empty() {
            return 0;
        }
        let sizes: Vec<(usize, usize)> = operation
            .parameters
            .iter()
            .map(|parameter| pool_sizes(parameter, &self.overrides))
            .collect();
        let simple: usize = sizes.iter().map(|(simple, _)| *simple).product();
        let edge: usize = sizes.iter().map(|(_, edge)| *edge).product();
        let mixed: usize = sizes
            .iter()
            .map(|(simple, edge)| simple + edge)
            .product::<usize>()
            .saturating_sub(simple + edge);
        simple + edge + mixed
    }

    fn simple_estimate(&self, operation: &Operation) -> usize {
        if let Some(tuples) = &operation.fixed {
            return tuples.len();
        }
        if operation.parameters.is_empty() {
            return 0;
        }
        operation
            .parameters
            .iter()
            .map(|parameter| pool_sizes(parameter, &self.overrides).0)
            .product()
    }

    fn derive_counts(&mut self) {
        self.default_receiver_count = if self.skip_receiver {
            0
        } else if self.faux_static {
            1
        } else {
            self.receiver_ops
                .iter()
                .map(|name| self.simple_estimate(self.operation(name)))
                .sum::<usize>()
                * 2
        };

        let mut method_count = 0usize;
        let mut both_count = 0usize;
        for name in &self.test_ops {
            let operation = self.operation(name);
            if operation.kind == OpKind::Both {
                both_count += 1;
                continue;
            }
            method_count += if operation.takes_receiver_parameter() {
                self.default_receiver_count
            } else {
                let extra = if !self.receiver_ops.is_empty() && operation.takes_any_parameter() {
                    self.default_receiver_count
                } else {
                    0
                };
                self.fixed_estimate(operation).max(1) + extra
            };
        }
        self.default_method_count = method_count * 2 + both_count;

        self.default_total_count = self.default_receiver_count * RECEIVER_RETRIES
            + self.default_method_count * self.default_receiver_count.max(1);

        // When every tested operation carries a call limit and no receivers
        // are in play, the limits bound how many steps can ever run.
        let limited: Option<usize> = self
            .test_ops
            .iter()
            .map(|name| self.operation(name).limit)
            .sum();
        self.max_count = match limited {
            Some(sum) if self.skip_receiver => sum,
            _ => usize::MAX,
        };
    }

    pub(crate) fn resolve(&self, passed: Settings) -> Result<ResolvedSettings, ConfigError> {
        let merged = Settings::defaults().merge(&self.settings).merge(&passed);
        let shrink = merged.shrink.unwrap_or(true);
        let run_all = merged.run_all.unwrap_or(false);
        if run_all && shrink {
            return Err(ConfigError::BadSettings {
                reason: "run-all cannot be combined with shrinking".into(),
            });
        }
        if merged.test_count.is_some()
            && (merged.min_test_count.is_some() || merged.max_test_count.is_some())
        {
            return Err(ConfigError::BadSettings {
                reason: "test count cannot be combined with min or max bounds".into(),
            });
        }
        let mut test_count = match merged.test_count {
            Some(count) => count,
            None => {
                let mut count = self.default_total_count;
                if let Some(minimum) = merged.min_test_count {
                    count = count.max(minimum);
                }
                if let Some(maximum) = merged.max_test_count {
                    count = count.min(maximum);
                }
                count
            }
        };
        test_count = test_count.min(self.max_count);

        if merged.receiver_count.is_some() && !self.receiver_as_parameter {
            return Err(ConfigError::BadSettings {
                reason: "receiver count requires an operation taking a receiver parameter"
                    .into(),
            });
        }
        let needed_receivers = if self.receiver_as_parameter {
            merged
                .receiver_count
                .unwrap_or(self.default_receiver_count)
                .max(1)
        } else {
            1
        };

        Ok(ResolvedSettings {
            seed: merged.seed.unwrap_or_else(rand::random),
            test_count,
            method_count: merged.method_count.unwrap_or(self.default_method_count),
            needed_receivers,
            shrink,
            run_all,
            strict_output: merged.strict_output.unwrap_or(false),
            record_trace: merged.record_trace.unwrap_or(false),
            caps: PoolCaps {
                simple: merged.simple_cap.unwrap_or(usize::MAX),
                edge: merged.edge_cap.unwrap_or(usize::MAX),
                mixed: merged.mixed_cap.unwrap_or(usize::MAX),
                fixed: merged.fixed_cap.unwrap_or(usize::MAX),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Returned;
    use std::sync::Arc;

    fn noop() -> Callable {
        Arc::new(|_input| Ok(Returned::None))
    }

    fn counter_builder() -> HarnessBuilder {
        let mut builder = HarnessBuilder::new("Counter");
        builder.constructor("Counter", vec![ValueType::Int], noop(), noop());
        builder.method("add", vec![ValueType::Int], noop(), noop());
        builder
    }

    #[test]
    fn empty_harnesses_are_rejected() {
        let builder = HarnessBuilder::new("Empty");
        assert!(matches!(builder.build(), Err(ConfigError::NoOperations)));
    }

    #[test]
    fn duplicate_operation_names_are_rejected() {
        let mut builder = counter_builder();
        builder.method("add", vec![], noop(), noop());
        assert!(matches!(
            builder.build(),
            Err(ConfigError::DuplicateOperation { name }) if name == "add"
        ));
    }

    #[test]
    fn instance_methods_require_a_receiver_source() {
        let mut builder = HarnessBuilder::new("Counter");
        builder.method("add", vec![ValueType::Int], noop(), noop());
        assert!(matches!(
            builder.build(),
            Err(ConfigError::MissingReceiverSource { name }) if name == "add"
        ));
    }

    #[test]
    fn second_initializer_is_rejected() {
        let mut builder = counter_builder();
        builder.initializer("init", vec![], noop(), noop());
        builder.initializer("setup", vec![], noop(), noop());
        assert!(matches!(
            builder.build(),
            Err(ConfigError::MultipleInitializers)
        ));
    }

    #[test]
    fn fixed_tuples_must_match_the_declared_parameters() {
        let mut builder = counter_builder();
        builder
            .method("scale", vec![ValueType::Int], noop(), noop())
            .fixed(vec![vec![Value::Str("oops".into())]]);
        assert!(matches!(
            builder.build(),
            Err(ConfigError::BadFixedArguments { operation, .. }) if operation == "scale"
        ));
    }

    #[test]
    fn weights_must_be_positive_and_finite() {
        let mut builder = counter_builder();
        builder
            .method("get", vec![], noop(), noop())
            .weight(0.0);
        assert!(matches!(builder.build(), Err(ConfigError::BadWeight { .. })));
    }

    #[test]
    fn static_only_subjects_skip_receiver_creation() {
        let mut builder = HarnessBuilder::new("MathUtils");
        builder.static_method("gcd", vec![ValueType::Int, ValueType::Int], noop(), noop());
        let harness = builder.build().unwrap();
        assert!(harness.skip_receiver);
        assert_eq!(harness.default_receiver_count, 0);
    }

    #[test]
    fn derived_counts_scale_with_pool_sizes() {
        let harness = counter_builder().build().unwrap();
        // One constructor over one int parameter: 3 simple tuples, doubled.
        assert_eq!(harness.default_receiver_count, 6);
        // One int method: 3 fixed tuples, doubled.
        assert_eq!(harness.default_method_count, 6);
        assert_eq!(
            harness.default_total_count,
            6 * RECEIVER_RETRIES + 6 * 6
        );
    }

    #[test]
    fn run_all_and_shrink_are_mutually_exclusive() {
        let harness = counter_builder().build().unwrap();
        let settings = Settings {
            run_all: Some(true),
            shrink: Some(true),
            ..Settings::default()
        };
        assert!(matches!(
            harness.resolve(settings),
            Err(ConfigError::BadSettings { .. })
        ));
        let settings = Settings {
            run_all: Some(true),
            shrink: Some(false),
            ..Settings::default()
        };
        assert!(harness.resolve(settings).is_ok());
    }

    #[test]
    fn explicit_test_count_rejects_bounds() {
        let harness = counter_builder().build().unwrap();
        let settings = Settings {
            test_count: Some(100),
            max_test_count: Some(50),
            ..Settings::default()
        };
        assert!(matches!(
            harness.resolve(settings),
            Err(ConfigError::BadSettings { .. })
        ));
    }

    #[test]
    fn receiver_count_requires_receiver_parameters() {
        let harness = counter_builder().build().unwrap();
        let settings = Settings {
            receiver_count: Some(4),
            ..Settings::default()
        };
        assert!(matches!(
            harness.resolve(settings),
            Err(ConfigError::BadSettings { .. })
        ));

        let mut builder = counter_builder();
        builder.method(
            "merge",
            vec![ValueType::Receiver],
            noop(),
            noop(),
        );
        let harness = builder.build().unwrap();
        let settings = Settings {
            receiver_count: Some(4),
            ..Settings::default()
        };
        let resolved = harness.resolve(settings).unwrap();
        assert_eq!(resolved.needed_receivers, 4);
    }

    #[test]
    fn settings_merge_is_right_biased() {
        let base = Settings {
            seed: Some(1),
            test_count: Some(100),
            ..Settings::default()
        };
        let overlay = Settings {
            seed: Some(2),
            ..Settings::default()
        };
        let merged = base.merge(&overlay);
        assert_eq!(merged.seed, Some(2));
        assert_eq!(merged.test_count, Some(100));
    }

    #[test]
    fn limits_cap_the_default_budget_for_static_subjects() {
        let mut builder = HarnessBuilder::new("MathUtils");
        builder
            .static_method("gcd", vec![ValueType::Int, ValueType::Int], noop(), noop())
            .limit(5);
        let harness = builder.build().unwrap();
        let resolved = harness.resolve(Settings::default()).unwrap();
        assert_eq!(resolved.test_count, 5);
    }
}
