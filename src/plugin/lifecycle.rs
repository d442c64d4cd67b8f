//! Plugin contract and per-plugin runtime bookkeeping.

use async_trait::async_trait;

use super::context::{PluginContext, Step};

/// Capability set implementers of a log plugin must provide.
///
/// All three lifecycle methods may perform I/O. A failure in
/// `process_line` is isolated to that plugin and never stops the drain;
/// see [`crate::plugin::worker::PluginWorker`] for the exact semantics.
#[async_trait]
pub trait Plugin<S>: Send + Sync {
    /// Stable human string used in user-visible messages. Not the
    /// plugin's internal identity key.
    fn friendly_name(&self) -> &str;

    /// Called once before any `process_line`. Return `false` to decline
    /// processing this job without treating it as an error.
    async fn initialize(&mut self, ctx: &PluginContext<S>) -> bool;

    /// Handle one already-split log line. Any `Err` is swallowed by the
    /// Worker and recorded (capped at 10 entries); it never stops the drain.
    async fn process_line(
        &mut self,
        ctx: &PluginContext<S>,
        step: Option<&Step>,
        message: &str,
    ) -> anyhow::Result<()>;

    /// Called at most once, only if `initialize` returned `true` and the
    /// plugin was not short-circuited. May perform bulk uploads.
    async fn finalize(&mut self, ctx: &PluginContext<S>);
}

/// Per-plugin runtime state owned by its Worker: whether `initialize`
/// succeeded, and the capped list of process-line/finalize errors
/// accumulated for end-of-run reporting.
#[derive(Debug, Default)]
pub struct PluginRuntimeState {
    pub initialized: bool,
    pub errors: Vec<String>,
}

/// Error list entries beyond this count are silently dropped so a
/// flapping plugin can't exhaust memory through its own error log.
pub const MAX_RECORDED_ERRORS: usize = 10;

impl PluginRuntimeState {
    pub fn record_error(&mut self, error: impl Into<String>) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(error.into());
        }
    }
}
