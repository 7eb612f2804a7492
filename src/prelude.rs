//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust,ignore
//! use lockstep::prelude::*;
//! ```

// Harness construction and execution
pub use crate::harness::{Harness, HarnessBuilder, OpConfig, Settings};

// Values and types at the testing boundary
pub use crate::value::{instance_of, same_instance, Instance, Value, ValueType};

// Operation registration
pub use crate::operation::{
    ArgumentFilter, Callable, CallError, CallInput, ErrorKind, OpKind, RandomArguments,
    Returned, StepVerdict, Verifier,
};

// Results and reporting
pub use crate::report::{CallRecord, ReturnValue, StepKind, TestResults};
pub use crate::verify::Mismatch;

// Generation control
pub use crate::complexity::Complexity;
pub use crate::generators::RandomValue;

// Errors
pub use crate::error::{ConfigError, FollowTraceError, TestError};

// Commonly used external types
pub use std::cell::RefCell;
pub use std::rc::Rc;
pub use std::sync::Arc;

pub use anyhow::Result;
