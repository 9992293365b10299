//! Output sink for the `puts` builtin.
//!
//! Implement [`PrintWriter`] to capture or redirect `puts` output from
//! executing Drift code. The sink must not re-enter the VM.

use std::io::{self, Write as _};

/// Trait for handling output from the `puts` builtin.
pub trait PrintWriter {
    /// Called once per `puts` argument with its canonical form; the
    /// implementation appends the trailing newline.
    fn write_line(&mut self, line: &str);
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: &str) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(line.as_bytes());
        let _ = handle.write_all(b"\n");
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing `puts` output programmatically; the
/// session uses one to build the host-facing result string.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: &str) {}
}
