//! Output capture and input control for a single invocation.
//!
//! Each call runs against an explicit [`CaptureContext`] instead of the
//! process streams: printed output lands in per-call sinks, reads consume
//! scripted stdin lines, and file access goes through a small virtual
//! filesystem. A process-wide lock keeps captures from overlapping, since
//! the observable streams are compared byte for byte.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::operation::{CallError, Returned};

static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

/// Scripted inputs for one invocation: stdin lines and initial file
/// contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureInputs {
    pub stdin: Vec<String>,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl CaptureInputs {
    pub fn stdin_lines<I, S>(lines: I) -> CaptureInputs
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CaptureInputs {
            stdin: lines.into_iter().map(Into::into).collect(),
            files: BTreeMap::new(),
        }
    }

    pub fn file(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> CaptureInputs {
        let mut files = BTreeMap::new();
        files.insert(name.into(), contents.into());
        CaptureInputs {
            stdin: Vec::new(),
            files,
        }
    }
}

/// The IO surface handed to a callable for the duration of one invocation.
pub struct CaptureContext {
    stdout: String,
    stderr: String,
    interleaved: String,
    consumed_stdin: String,
    pending_stdin: VecDeque<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl CaptureContext {
    fn new(inputs: CaptureInputs) -> CaptureContext {
        CaptureContext {
            stdout: String::new(),
            stderr: String::new(),
            interleaved: String::new(),
            consumed_stdin: String::new(),
            pending_stdin: inputs.stdin.into(),
            files: inputs.files,
        }
    }

    pub fn print(&mut self, text: &str) {
        self.stdout.push_str(text);
        self.interleaved.push_str(text);
    }

    pub fn println(&mut self, text: &str) {
        self.print(text);
        self.print("\n");
    }

    pub fn eprint(&mut self, text: &str) {
        self.stderr.push_str(text);
        self.interleaved.push_str(text);
    }

    pub fn eprintln(&mut self, text: &str) {
        self.eprint(text);
        self.eprint("\n");
    }

    /// Consumes the next scripted stdin line.
    ///
    /// Consumed input is echoed into the interleaved stream so prompts and
    /// responses appear in the order a terminal user would see them.
    pub fn read_line(&mut self) -> Option<String> {
        let line = self.pending_stdin.pop_front()?;
        self.consumed_stdin.push_str(&line);
        self.consumed_stdin.push('\n');
        self.interleaved.push_str(&line);
        self.interleaved.push('\n');
        Some(line)
    }

    pub fn read_file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn write_file(&mut self, name: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(name.into(), contents);
    }
}

/// Everything observable from one invocation.
#[derive(Debug)]
pub struct Captured {
    pub outcome: Result<Returned, CallError>,
    pub stdout: String,
    pub stderr: String,
    /// The stdin actually consumed, newline-joined.
    pub stdin: String,
    /// Stdout and stderr merged in emission order, with consumed stdin
    /// echoed in place.
    pub interleaved: String,
    pub files: BTreeMap<String, Vec<u8>>,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panicked".to_string()
    }
}

/// Runs `body` under the capture lock and collects its observable behavior.
///
/// Panics inside `body` are caught and reported as [`CallError`]s with the
/// panicked kind; the capture lock is released either way.
pub fn capture<F>(inputs: &CaptureInputs, body: F) -> Captured
where
    F: FnOnce(&mut CaptureContext) -> Result<Returned, CallError>,
{
    let _guard = CAPTURE_LOCK.lock();
    let mut context = CaptureContext::new(inputs.clone());
    let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut context)));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => Err(CallError::panicked(panic_message(payload))),
    };
    Captured {
        outcome,
        stdout: context.stdout,
        stderr: context.stderr,
        stdin: context.consumed_stdin,
        interleaved: context.interleaved,
        files: context.files,
    }
}
