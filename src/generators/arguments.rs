//! Argument tuple generation for one operation.
//!
//! Each operation walks a fixed pool first (simple cases, then edge cases,
//! then mixed combinations), and after exhausting it streams random tuples
//! at a complexity that ratchets up on success. Failures bound the
//! complexity so reruns shrink toward the simplest failing input.

use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::complexity::Complexity;
use crate::error::ConfigError;
use crate::generators::{generator_for, GeneratorSetup, ValueGen};
use crate::operation::{Operation, RandomArguments};
use crate::rng::RecordingRng;
use crate::value::{Fivefold, Value};

/// Where an argument tuple came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Provenance {
    /// The operation takes no arguments.
    Empty,
    Simple,
    Edge,
    /// Cartesian mix of simple and edge cases.
    Mixed,
    Random,
    /// Explicitly configured tuple.
    Fixed,
    /// Produced by a custom random callback.
    CustomRandom,
}

/// One generated argument tuple, instantiated five ways.
///
/// The reference and candidate each get a main copy and a scratch copy;
/// the unmodified copy is never passed to user code and is used for
/// display and comparison. Equality and hashing consider only the
/// reference scratch copy, which no call ever mutates.
#[derive(Debug, Clone)]
pub struct Arguments {
    pub reference: Vec<Value>,
    pub candidate: Vec<Value>,
    pub reference_scratch: Vec<Value>,
    pub candidate_scratch: Vec<Value>,
    pub unmodified: Vec<Value>,
    pub provenance: Provenance,
    pub complexity: Complexity,
}

impl Arguments {
    pub(crate) fn empty() -> Arguments {
        Arguments {
            reference: Vec::new(),
            candidate: Vec::new(),
            reference_scratch: Vec::new(),
            candidate_scratch: Vec::new(),
            unmodified: Vec::new(),
            provenance: Provenance::Empty,
            complexity: Complexity::ZERO,
        }
    }

    /// Builds all five instantiations as deep copies of `values`.
    pub(crate) fn from_values(
        values: Vec<Value>,
        provenance: Provenance,
        complexity: Complexity,
    ) -> Arguments {
        Arguments {
            reference: values.clone(),
            candidate: values.clone(),
            reference_scratch: values.clone(),
            candidate_scratch: values.clone(),
            unmodified: values,
            provenance,
            complexity,
        }
    }

    pub(crate) fn from_fivefolds(
        folds: Vec<Fivefold>,
        provenance: Provenance,
        complexity: Complexity,
    ) -> Arguments {
        let mut arguments = Arguments::empty();
        arguments.provenance = provenance;
        arguments.complexity = complexity;
        for fold in folds {
            arguments.reference.push(fold.reference);
            arguments.candidate.push(fold.candidate);
            arguments.reference_scratch.push(fold.reference_scratch);
            arguments.candidate_scratch.push(fold.candidate_scratch);
            arguments.unmodified.push(fold.unmodified);
        }
        arguments
    }

    /// Fresh, unmutated instantiations of the same tuple.
    pub(crate) fn refresh(&self) -> Arguments {
        Arguments::from_values(self.unmodified.clone(), self.provenance, self.complexity)
    }
}

impl PartialEq for Arguments {
    fn eq(&self, other: &Arguments) -> bool {
        self.reference_scratch == other.reference_scratch
    }
}

impl Eq for Arguments {}

impl Hash for Arguments {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference_scratch.hash(state);
    }
}

/// Caps on the fixed pool, applied per tier and then overall.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolCaps {
    pub simple: usize,
    pub edge: usize,
    pub mixed: usize,
    pub fixed: usize,
}

impl Default for PoolCaps {
    fn default() -> PoolCaps {
        PoolCaps {
            simple: usize::MAX,
            edge: usize::MAX,
            mixed: usize::MAX,
            fixed: usize::MAX,
        }
    }
}

/// Cartesian product over per-parameter candidate values.
pub(crate) fn product(sets: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut tuples: Vec<Vec<Value>> = vec![Vec::new()];
    for set in sets {
        let mut next = Vec::with_capacity(tuples.len() * set.len());
        for tuple in &tuples {
            for value in set {
                let mut extended = tuple.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        tuples = next;
    }
    if sets.is_empty() {
        Vec::new()
    } else {
        tuples
    }
}

/// Per-operation argument source.
pub(crate) struct ArgumentsGenerator {
    operation: String,
    empty: bool,
    generators: Vec<Box<dyn ValueGen>>,
    custom_random: Option<RandomArguments>,
    fixed: Vec<Arguments>,
    index: usize,
    complexity: Complexity,
    bound: Option<Complexity>,
    random_started: bool,
}

impl ArgumentsGenerator {
    pub(crate) fn new(
        operation: &Operation,
        setup: &GeneratorSetup<'_>,
        caps: PoolCaps,
        rng: &RecordingRng,
    ) -> Result<ArgumentsGenerator, ConfigError> {
        if operation.parameters.is_empty() {
            return Ok(ArgumentsGenerator {
                operation: operation.name.clone(),
                empty: true,
                generators: Vec::new(),
                custom_random: None,
                fixed: Vec::new(),
                index: 0,
                complexity: Complexity::default(),
                bound: None,
                random_started: false,
            });
        }

        let fully_overridden = operation.fixed.is_some() && operation.random.is_some();
        let generators = if fully_overridden {
            Vec::new()
        } else {
            operation
                .parameters
                .iter()
                .map(|parameter| generator_for(parameter, setup, rng))
                .collect::<Result<Vec<_>, _>>()?
        };

        let fixed = match &operation.fixed {
            Some(tuples) => tuples
                .iter()
                .map(|tuple| {
                    Arguments::from_values(tuple.clone(), Provenance::Fixed, Complexity::ZERO)
                })
                .collect(),
            None => Self::build_fixed_pool(&generators, caps, rng),
        };

        Ok(ArgumentsGenerator {
            operation: operation.name.clone(),
            empty: false,
            generators,
            custom_random: operation.random.clone(),
            fixed,
            index: 0,
            complexity: Complexity::default(),
            bound: None,
            random_started: false,
        })
    }

    fn trim(mut pool: Vec<Arguments>, cap: usize, rng: &RecordingRng) -> Vec<Arguments> {
        if pool.len() <= cap {
            return pool;
        }
        rng.shuffle(&mut pool);
        pool.truncate(cap);
        pool
    }

    fn build_fixed_pool(
        generators: &[Box<dyn ValueGen>],
        caps: PoolCaps,
        rng: &RecordingRng,
    ) -> Vec<Arguments> {
        let simple_sets: Vec<Vec<Value>> =
            generators.iter().map(|generator| generator.simple()).collect();
        let edge_sets: Vec<Vec<Value>> =
            generators.iter().map(|generator| generator.edge()).collect();
        let both_sets: Vec<Vec<Value>> = simple_sets
            .iter()
            .zip(&edge_sets)
            .map(|(simple, edge)| {
                let mut combined = simple.clone();
                for value in edge {
                    if !combined.contains(value) {
                        combined.push(value.clone());
                    }
                }
                combined
            })
            .collect();

        let simple: Vec<Arguments> = product(&simple_sets)
            .into_iter()
            .map(|tuple| Arguments::from_values(tuple, Provenance::Simple, Complexity::ZERO))
            .collect();
        let edge: Vec<Arguments> = product(&edge_sets)
            .into_iter()
            .map(|tuple| Arguments::from_values(tuple, Provenance::Edge, Complexity::ZERO))
            .collect();
        let mixed: Vec<Arguments> = product(&both_sets)
            .into_iter()
            .map(|tuple| Arguments::from_values(tuple, Provenance::Mixed, Complexity::ZERO))
            .filter(|arguments| !simple.contains(arguments) && !edge.contains(arguments))
            .collect();

        let mut pool = Self::trim(simple, caps.simple, rng);
        pool.extend(Self::trim(edge, caps.edge, rng));
        pool.extend(Self::trim(mixed, caps.mixed, rng));
        Self::trim(pool, caps.fixed, rng)
    }

    pub(crate) fn fixed_len(&self) -> usize {
        if self.empty {
            1
        } else {
            self.fixed.len()
        }
    }

    pub(crate) fn generate(&mut self, rng: &RecordingRng) -> Result<Arguments, ConfigError> {
        if self.empty {
            return Ok(Arguments::empty());
        }
        let arguments = if self.index < self.fixed.len() {
            self.fixed[self.index].refresh()
        } else {
            self.random_started = true;
            self.random_at(self.bound.unwrap_or(self.complexity), rng)?
        };
        self.index += 1;
        Ok(arguments)
    }

    fn random_at(
        &self,
        complexity: Complexity,
        rng: &RecordingRng,
    ) -> Result<Arguments, ConfigError> {
        if let Some(custom) = &self.custom_random {
            let seed = rng.sub_seed();
            let values = custom(complexity, &mut StdRng::seed_from_u64(seed));
            let check = custom(complexity, &mut StdRng::seed_from_u64(seed));
            if values != check {
                return Err(ConfigError::BadRandomArguments {
                    operation: self.operation.clone(),
                    reason: "callback is not deterministic for a fixed seed".into(),
                });
            }
            return Ok(Arguments::from_values(
                values,
                Provenance::CustomRandom,
                complexity,
            ));
        }
        let folds = self
            .generators
            .iter()
            .map(|generator| {
                generator
                    .random(complexity, rng)
                    .map(|value| Fivefold::of(value, complexity))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arguments::from_fivefolds(
            folds,
            Provenance::Random,
            complexity,
        ))
    }

    /// Reports a successful step: once the random phase has begun, the
    /// complexity dial ratchets up.
    pub(crate) fn next(&mut self) {
        if self.random_started {
            self.complexity = self.complexity.next();
        }
    }

    /// Reports a failed step: future random tuples are bounded at or below
    /// the failing complexity, stepping down on each further failure.
    pub(crate) fn prev(&mut self) {
        if self.random_started {
            self.bound = Some(match self.bound {
                None => self.complexity,
                Some(bound) => bound.prev(),
            });
        }
    }
}
