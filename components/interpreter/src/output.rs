//! Where script output goes
//!
//! The VM never writes to the process streams directly. `print`, echoed
//! expression results and reported failures all go through an
//! [`OutputSink`].

use std::cell::RefCell;
use std::io::Write;
use std::time::Duration;

/// Receiver for script IO
pub trait OutputSink {
    /// Source about to be executed
    fn input(&self, _text: &str) {}

    /// Ordinary output, newline included
    fn stdout(&self, text: &str);

    /// Failures and diagnostics
    fn stderr(&self, text: &str);

    /// Wall time of a finished top-level execution
    fn execution_time(&self, _elapsed: Duration) {}
}

/// Default sink: forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn input(&self, text: &str) {
        tracing::debug!(target: "script::input", "{}", text);
    }

    fn stdout(&self, text: &str) {
        tracing::info!(target: "script::stdout", "{}", text.trim_end_matches('\n'));
    }

    fn stderr(&self, text: &str) {
        tracing::error!(target: "script::stderr", "{}", text.trim_end_matches('\n'));
    }

    fn execution_time(&self, elapsed: Duration) {
        tracing::debug!(target: "script::timing", elapsed_us = elapsed.as_micros() as u64, "execution finished");
    }
}

/// Writes to the process stdout and stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl OutputSink for StdioSink {
    fn stdout(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn stderr(&self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = err.write_all(b"\n");
        }
    }
}

/// Records output in memory
#[derive(Debug, Default)]
pub struct CaptureSink {
    stdout: RefCell<String>,
    stderr: RefCell<String>,
    inputs: RefCell<Vec<String>>,
    timings: RefCell<Vec<Duration>>,
}

impl CaptureSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to stdout so far
    pub fn stdout_text(&self) -> String {
        self.stdout.borrow().clone()
    }

    /// Everything written to stderr so far
    pub fn stderr_text(&self) -> String {
        self.stderr.borrow().clone()
    }

    /// Drain stdout
    pub fn take_stdout(&self) -> String {
        std::mem::take(&mut *self.stdout.borrow_mut())
    }

    /// Recorded inputs
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.borrow().clone()
    }

    /// Number of reported executions
    pub fn executions(&self) -> usize {
        self.timings.borrow().len()
    }
}

impl OutputSink for CaptureSink {
    fn input(&self, text: &str) {
        self.inputs.borrow_mut().push(text.to_string());
    }

    fn stdout(&self, text: &str) {
        self.stdout.borrow_mut().push_str(text);
    }

    fn stderr(&self, text: &str) {
        let mut err = self.stderr.borrow_mut();
        err.push_str(text);
        if !text.ends_with('\n') {
            err.push('\n');
        }
    }

    fn execution_time(&self, elapsed: Duration) {
        self.timings.borrow_mut().push(elapsed);
    }
}
