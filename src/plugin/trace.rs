//! Two-channel plugin sink: a diagnostic trace (the host's own log) and a
//! user-visible output channel (the job log).

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Marker prefix for diagnostic trace lines, recognized by the job runner.
pub const TRACE_MARKER: &str = "##[plugin.trace]";

/// Sink for the two log channels a plugin can write to.
///
/// `trace` is for host/operator diagnostics; `output` is the plain,
/// job-facing channel. Both writes are line-atomic: implementations
/// serialize internally so callers may treat `PluginTrace` as freely
/// shareable and thread-safe.
#[derive(Clone)]
pub struct PluginTrace {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PluginTrace {
    /// Build a trace writing to the given sink (e.g. a file in tests).
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Default trace: diagnostic and user lines both go to stdout, which
    /// is how the enclosing job runner expects to observe this process.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Emit a diagnostic line, prefixed with [`TRACE_MARKER`].
    pub fn trace(&self, message: &str) {
        tracing::debug!(target: "log_plugin_host::trace", "{message}");
        self.write_line(&format!("{TRACE_MARKER} {message}"));
    }

    /// Emit a plain, user-visible line.
    pub fn output(&self, message: &str) {
        self.write_line(message);
    }

    fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{line}");
    }

    /// Wrap this trace so every message is prefixed with `name`, as
    /// `PluginContext` does for each plugin's `friendly_name`.
    pub fn prefixed(&self, name: &str) -> PrefixedTrace {
        PrefixedTrace {
            inner: self.clone(),
            prefix: name.to_string(),
        }
    }
}

/// A [`PluginTrace`] view that prefixes every message with a plugin's name.
#[derive(Clone)]
pub struct PrefixedTrace {
    inner: PluginTrace,
    prefix: String,
}

impl PrefixedTrace {
    pub fn trace(&self, message: &str) {
        self.inner.trace(&format!("{}: {}", self.prefix, message));
    }

    pub fn output(&self, message: &str) {
        self.inner.output(&format!("{}: {}", self.prefix, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    #[derive(Clone)]
    struct SharedBuf(StdArc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn trace_lines_carry_the_marker() {
        let buf = StdArc::new(StdMutex::new(Vec::new()));
        let shared = SharedBuf(buf.clone());
        let trace = PluginTrace::new(shared);
        trace.trace("hello");
        trace.output("world");
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains("##[plugin.trace] hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("##[plugin.trace] world"));
    }

    #[test]
    fn prefixed_trace_includes_plugin_name() {
        let buf = StdArc::new(StdMutex::new(Vec::new()));
        let shared = SharedBuf(buf.clone());
        let trace = PluginTrace::new(shared).prefixed("uploader");
        trace.output("done");
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains("uploader: done"));
    }
}
