//! Trace output sinks.
//!
//! The session writes one formatted line at a time, in order, to a single
//! sink. Where the lines end up is the sink owner's business.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Prefix of diagnostic lines.
pub const DIAGNOSTIC_PREFIX: &str = "error: ";

/// Ordered, append-only destination for trace lines.
pub trait OutputSink: Send {
    /// Append one output line.
    fn append(&mut self, line: &str);

    /// Append one diagnostic line. Defaults to the ordinary stream.
    fn append_diagnostic(&mut self, line: &str) {
        self.append(line);
    }
}

/// Sink collecting lines into a shared buffer.
///
/// Clones share the buffer, so a caller can keep one clone to inspect
/// what the session wrote.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Remove and return everything written so far.
    pub fn take(&self) -> Vec<String> {
        core::mem::take(&mut *self.lines.lock())
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl OutputSink for VecSink {
    fn append(&mut self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Sink forwarding lines to the `log` facade.
///
/// Output format: `[trace] LINE`; diagnostics are logged as warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn append(&mut self, line: &str) {
        log::info!("[trace] {}", line);
    }

    fn append_diagnostic(&mut self, line: &str) {
        log::warn!("[trace] {}", line);
    }
}

impl<S: OutputSink + ?Sized> OutputSink for alloc::boxed::Box<S> {
    fn append(&mut self, line: &str) {
        (**self).append(line);
    }

    fn append_diagnostic(&mut self, line: &str) {
        (**self).append_diagnostic(line);
    }
}
