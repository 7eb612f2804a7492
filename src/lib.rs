//! # Lockstep: differential testing for paired implementations
//!
//! Runs a reference implementation and a candidate implementation in
//! lockstep and compares everything observable about them: return values,
//! thrown errors, printed output, and in-place argument modification.
//!
//! ## How a run works
//!
//! A [`Harness`] holds paired operations registered through
//! [`HarnessBuilder`]: constructors and factories that create receivers,
//! and methods that exercise them. Each test step generates one argument
//! tuple, instantiates it five ways (a main and a scratch copy per side,
//! plus an untouched copy for display), invokes both sides, and verifies
//! the observations against each other.
//!
//! Argument generation walks a fixed pool of simple, edge, and mixed
//! cases first, then streams random tuples at a complexity that ratchets
//! up while steps pass and shrinks back toward the simplest failing input
//! when they don't. Every random decision funnels through one seeded
//! source, so runs are reproducible and a recorded draw stream can be
//! replayed to detect nondeterminism.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lockstep::prelude::*;
//!
//! let mut builder = Harness::builder("Counter");
//! builder.constructor("Counter", vec![ValueType::Int], reference_new, candidate_new);
//! builder.method("add", vec![ValueType::Int], reference_add, candidate_add);
//! let harness = builder.build()?;
//!
//! let results = harness.test(Settings::default())?;
//! assert!(results.succeeded(), "{}", results.explain());
//! ```

pub mod capture;
pub mod complexity;
mod driver;
pub mod error;
pub mod generators;
pub mod harness;
pub mod operation;
pub mod prelude;
pub mod report;
pub mod rng;
mod runner;
pub mod value;
pub mod verify;

pub use crate::complexity::Complexity;
pub use crate::error::{ConfigError, FollowTraceError, TestError};
pub use crate::harness::{Harness, HarnessBuilder, OpConfig, Settings};
pub use crate::operation::{
    CallError, CallInput, ErrorKind, OpKind, Returned, StepVerdict,
};
pub use crate::report::{CallRecord, ReturnValue, StepKind, TestResults};
pub use crate::value::{instance_of, same_instance, Instance, Value, ValueType};
pub use crate::verify::Mismatch;
