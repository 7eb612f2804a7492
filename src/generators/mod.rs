//! Value and argument generation.
//!
//! Each parameter type gets a generator exposing three tiers: a small set of
//! simple cases, a set of edge cases, and unbounded random generation scaled
//! by a [`Complexity`] dial. Composite generators build on the generators of
//! their element types. Per-type overrides can replace any tier.

mod arguments;
mod containers;
mod object;
mod primitives;

pub(crate) use arguments::{ArgumentsGenerator, PoolCaps};
pub use arguments::{Arguments, Provenance};
pub use containers::{ArrayGen, ListGen, MapGen, SetGen};
pub use object::{AnyGen, ReceiverGen};
pub use primitives::{
    BooleanGen, ByteGen, CharGen, DoubleGen, FloatGen, IntGen, LongGen, ShortGen, StringGen,
};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::complexity::Complexity;
use crate::error::ConfigError;
use crate::rng::RecordingRng;
use crate::value::{Value, ValueType};

/// A source of values for one declared parameter type.
pub trait ValueGen {
    /// Small, human-obvious cases. Served before any random generation.
    fn simple(&self) -> Vec<Value>;

    /// Boundary cases likely to expose defects.
    fn edge(&self) -> Vec<Value>;

    /// One random value scaled by `complexity`.
    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError>;
}

/// Custom random source for a single type.
pub type RandomValue = Arc<dyn Fn(Complexity, &mut StdRng) -> Value + Send + Sync>;

/// Replacement tiers for one type.
#[derive(Clone, Default)]
pub(crate) struct TypeOverride {
    pub(crate) simple: Option<Vec<Value>>,
    pub(crate) edge: Option<Vec<Value>>,
    pub(crate) random: Option<RandomValue>,
}

/// Per-type generator overrides, applied wherever the type appears.
#[derive(Clone, Default)]
pub struct TypeOverrides {
    entries: Vec<(ValueType, TypeOverride)>,
}

impl TypeOverrides {
    fn entry_mut(&mut self, ty: ValueType) -> &mut TypeOverride {
        if let Some(position) = self.entries.iter().position(|(t, _)| *t == ty) {
            return &mut self.entries[position].1;
        }
        self.entries.push((ty, TypeOverride::default()));
        &mut self.entries.last_mut().unwrap().1
    }

    pub fn set_simple(&mut self, ty: ValueType, values: Vec<Value>) {
        self.entry_mut(ty).simple = Some(values);
    }

    pub fn set_edge(&mut self, ty: ValueType, values: Vec<Value>) {
        self.entry_mut(ty).edge = Some(values);
    }

    pub fn set_random(&mut self, ty: ValueType, random: RandomValue) {
        self.entry_mut(ty).random = Some(random);
    }

    pub(crate) fn get(&self, ty: &ValueType) -> Option<&TypeOverride> {
        self.entries
            .iter()
            .find(|(t, _)| t == ty)
            .map(|(_, config)| config)
    }

    /// Validates that overridden fixed tiers produce values of the declared
    /// type.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (ty, config) in &self.entries {
            for values in [&config.simple, &config.edge].into_iter().flatten() {
                for value in values {
                    if !ty.accepts(value) {
                        return Err(ConfigError::BadOverride {
                            ty: ty.clone(),
                            reason: format!("value {value} does not have type {ty}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Context available while constructing generators for one run.
pub(crate) struct GeneratorSetup<'a> {
    pub overrides: &'a TypeOverrides,
    /// Indices of tracked receivers available for receiver-typed
    /// parameters. Absent when testing never creates receivers.
    pub receiver_pool: Option<Rc<RefCell<Vec<usize>>>>,
}

/// Wraps a base generator with per-type replacement tiers.
struct OverrideGen {
    ty: ValueType,
    base: Box<dyn ValueGen>,
    config: TypeOverride,
}

impl ValueGen for OverrideGen {
    fn simple(&self) -> Vec<Value> {
        match &self.config.simple {
            Some(values) => values.clone(),
            None => self.base.simple(),
        }
    }

    fn edge(&self) -> Vec<Value> {
        match &self.config.edge {
            Some(values) => values.clone(),
            None => self.base.edge(),
        }
    }

    fn random(&self, complexity: Complexity, rng: &RecordingRng) -> Result<Value, ConfigError> {
        let Some(random) = &self.config.random else {
            return self.base.random(complexity, rng);
        };
        // The callback runs against an isolated child generator so its
        // draws stay inside the recorded stream. Running it twice from the
        // same seed enforces determinism.
        let seed = rng.sub_seed();
        let value = random(complexity, &mut StdRng::seed_from_u64(seed));
        let check = random(complexity, &mut StdRng::seed_from_u64(seed));
        if value != check {
            return Err(ConfigError::BadOverride {
                ty: self.ty.clone(),
                reason: "custom random source is not deterministic for a fixed seed".into(),
            });
        }
        if !self.ty.accepts(&value) {
            return Err(ConfigError::BadOverride {
                ty: self.ty.clone(),
                reason: format!("custom random source produced {value}"),
            });
        }
        Ok(value)
    }
}

/// Builds the generator for a declared parameter type, applying overrides.
pub(crate) fn generator_for(
    ty: &ValueType,
    setup: &GeneratorSetup<'_>,
    rng: &RecordingRng,
) -> Result<Box<dyn ValueGen>, ConfigError> {
    let base: Box<dyn ValueGen> = match ty {
        ValueType::Boolean => Box::new(BooleanGen),
        ValueType::Byte => Box::new(ByteGen),
        ValueType::Short => Box::new(ShortGen),
        ValueType::Int => Box::new(IntGen),
        ValueType::Long => Box::new(LongGen),
        ValueType::Float => Box::new(FloatGen),
        ValueType::Double => Box::new(DoubleGen),
        ValueType::Char => Box::new(CharGen),
        ValueType::Str => Box::new(StringGen),
        ValueType::List(element) => Box::new(ListGen::new(generator_for(element, setup, rng)?)),
        ValueType::SetOf(element) => Box::new(SetGen::new(generator_for(element, setup, rng)?)),
        ValueType::MapOf(key, value) => Box::new(MapGen::new(
            generator_for(key, setup, rng)?,
            generator_for(value, setup, rng)?,
        )),
        ValueType::Array(element) => Box::new(ArrayGen::build(element, setup, rng)?),
        ValueType::Receiver => match &setup.receiver_pool {
            Some(pool) => Box::new(ReceiverGen::new(pool.clone())),
            None => return Err(ConfigError::UnsupportedType { ty: ty.clone() }),
        },
        ValueType::Any => {
            let receiver = setup
                .receiver_pool
                .as_ref()
                .map(|pool| ReceiverGen::new(pool.clone()));
            Box::new(AnyGen::new(receiver, rng))
        }
    };
    Ok(match setup.overrides.get(ty) {
        Some(config) => Box::new(OverrideGen {
            ty: ty.clone(),
            base,
            config: clone_override(config),
        }),
        None => base,
    })
}

fn clone_override(config: &TypeOverride) -> TypeOverride {
    TypeOverride {
        simple: config.simple.clone(),
        edge: config.edge.clone(),
        random: config.random.clone(),
    }
}

/// Estimated sizes of the simple and edge tiers for a type, used when
/// deriving default test counts without consuming randomness.
pub(crate) fn pool_sizes(ty: &ValueType, overrides: &TypeOverrides) -> (usize, usize) {
    if let Some(config) = overrides.get(ty) {
        let defaults = default_pool_sizes(ty, overrides);
        return (
            config
                .simple
                .as_ref()
                .map(Vec::len)
                .unwrap_or(defaults.0),
            config.edge.as_ref().map(Vec::len).unwrap_or(defaults.1),
        );
    }
    default_pool_sizes(ty, overrides)
}

fn default_pool_sizes(ty: &ValueType, overrides: &TypeOverrides) -> (usize, usize) {
    match ty {
        ValueType::Boolean => (2, 0),
        ValueType::Char => (2, 0),
        ValueType::Byte
        | ValueType::Short
        | ValueType::Int
        | ValueType::Long
        | ValueType::Float
        | ValueType::Double => (3, 0),
        ValueType::Str => (4, 1),
        ValueType::List(_) | ValueType::SetOf(_) | ValueType::Array(_) => (2, 1),
        ValueType::MapOf(key, _) => {
            let (key_simple, _) = pool_sizes(key, overrides);
            (if key_simple > 1 { 4 } else { 3 }, 1)
        }
        ValueType::Receiver => (0, 0),
        ValueType::Any => (9, 1),
    }
}
