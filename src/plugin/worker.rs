//! Per-plugin drain task: Initialize → steady-state drain → post-finish
//! drain → report.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::context::PluginContext;
use super::isolation::call_plugin_safely_async;
use super::latch::ShortCircuitLatch;
use super::lifecycle::{Plugin, PluginRuntimeState};
use super::queue::OutputQueue;
use super::trace::PluginTrace;

/// Idle backoff between empty-queue polls in the steady-state drain.
/// Fixed, not configurable.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(500);

/// Splits a raw log line on its first colon into `(step id, message)`.
/// `"1:2:hello"` yields `("1", "2:hello")`.
fn split_line(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
}

/// Drives a single plugin through its full lifecycle against one
/// [`OutputQueue`] and [`ShortCircuitLatch`].
pub struct PluginWorker<S> {
    plugin: Box<dyn Plugin<S>>,
    ctx: PluginContext<S>,
    queue: Arc<OutputQueue>,
    latch: ShortCircuitLatch,
    host_trace: PluginTrace,
}

impl<S: Send + Sync + 'static> PluginWorker<S> {
    pub fn new(
        plugin: Box<dyn Plugin<S>>,
        ctx: PluginContext<S>,
        queue: Arc<OutputQueue>,
        latch: ShortCircuitLatch,
        host_trace: PluginTrace,
    ) -> Self {
        Self {
            plugin,
            ctx,
            queue,
            latch,
            host_trace,
        }
    }

    /// Run Phases 1–4 and hand the plugin and its context back to the
    /// caller (along with the final runtime state) so the Host can
    /// invoke `finalize` on the same plugin instance, per spec.
    pub async fn run(
        mut self,
        run_token: CancellationToken,
    ) -> (Box<dyn Plugin<S>>, PluginContext<S>, PluginRuntimeState) {
        let mut state = PluginRuntimeState::default();
        let name = self.plugin.friendly_name().to_string();

        // Phase 1 — Initialize.
        let init_result = call_plugin_safely_async(async {
            Ok::<_, anyhow::Error>(self.plugin.initialize(&self.ctx).await)
        })
        .await;

        match init_result {
            Ok(true) => {
                state.initialized = true;
            }
            Ok(false) => {
                state.record_error("initialize returned false");
                self.ctx
                    .output(&format!("Skip process outputs for {name}..."));
                self.latch.set();
            }
            Err(e) => {
                state.record_error(e.to_string());
                self.ctx
                    .output(&format!("Skip process outputs for {name}..."));
                self.latch.set();
            }
        }

        if state.initialized {
            // Phase 2 — steady-state drain.
            loop {
                if self.latch.is_set() || run_token.is_cancelled() {
                    break;
                }
                let drained = self.drain_once(&mut state).await;
                if !drained && self.latch.is_set() {
                    break;
                }
                if self.latch.is_set() || run_token.is_cancelled() {
                    break;
                }
                if !drained {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_BACKOFF) => {},
                        _ = run_token.cancelled() => break,
                        _ = self.latch.wait() => break,
                    }
                }
            }

            if run_token.is_cancelled() {
                let pending = self.queue.depth();
                if pending > 0 {
                    self.host_trace.trace(&format!(
                        "{name}: pending process {pending} log lines"
                    ));
                }
            }

            // Phase 3 — post-finish drain, one pass, no sleeping between
            // empties.
            if !self.latch.is_set() {
                self.drain_once(&mut state).await;
            }
        }

        // Phase 4 — report.
        if self.latch.is_set() && state.initialized {
            self.ctx.output(
                "Plugin has been short circuited due to exceed memory usage limit.",
            );
        }
        self.queue.clear();
        for error in &state.errors {
            self.ctx
                .output(&format!("Fail to process output: {error}"));
        }

        (self.plugin, self.ctx, state)
    }

    /// Drain the queue to empty, honoring the latch mid-drain. Returns
    /// whether at least one line was dequeued.
    async fn drain_once(&mut self, state: &mut PluginRuntimeState) -> bool {
        let mut drained_any = false;
        loop {
            if self.latch.is_set() {
                break;
            }
            let Some(line) = self.queue.try_dequeue() else {
                break;
            };
            drained_any = true;

            let Some((step_id, message)) = split_line(&line) else {
                // No colon at all: spec treats this as implementation
                // defined; we count it as a plugin-level fault like a
                // missing step id would be.
                state.record_error(format!("malformed line with no colon: {line:?}"));
                continue;
            };

            let step = self.ctx.step(step_id).cloned();
            if step.is_none() {
                state.record_error(format!("unknown step id: {step_id}"));
                continue;
            }

            let process = self
                .plugin
                .process_line(&self.ctx, step.as_ref(), message);

            tokio::select! {
                result = call_plugin_safely_async(process) => {
                    if let Err(e) = result {
                        state.record_error(e.to_string());
                    }
                }
                _ = self.latch.wait() => {
                    // Abandon without awaiting process_line's completion.
                    break;
                }
            }
        }
        drained_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::context::{Step, StepTable};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn step_table() -> StepTable {
        let mut m = HashMap::new();
        m.insert("1".to_string(), Step::new("1", "Build"));
        Arc::new(m)
    }

    fn ctx() -> PluginContext<()> {
        PluginContext::new(
            Arc::new(()),
            step_table(),
            Arc::new(HashMap::new()),
            Arc::new(HashMap::new()),
            Arc::new(HashMap::new()),
            &PluginTrace::new(std::io::sink()),
            "test",
        )
    }

    struct RecordingPlugin {
        seen: Arc<Mutex<Vec<String>>>,
        init_result: bool,
        fail_every_line: bool,
    }

    #[async_trait]
    impl Plugin<()> for RecordingPlugin {
        fn friendly_name(&self) -> &str {
            "recorder"
        }

        async fn initialize(&mut self, _ctx: &PluginContext<()>) -> bool {
            self.init_result
        }

        async fn process_line(
            &mut self,
            _ctx: &PluginContext<()>,
            step: Option<&Step>,
            message: &str,
        ) -> anyhow::Result<()> {
            if self.fail_every_line {
                anyhow::bail!("boom");
            }
            self.seen.lock().unwrap().push(format!(
                "{}:{}",
                step.map(|s| s.id.as_str()).unwrap_or("?"),
                message
            ));
            Ok(())
        }

        async fn finalize(&mut self, _ctx: &PluginContext<()>) {}
    }

    #[tokio::test]
    async fn happy_path_delivers_lines_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(OutputQueue::new());
        queue.enqueue("1:hello".into());
        queue.enqueue("1:world".into());

        let plugin = RecordingPlugin {
            seen: seen.clone(),
            init_result: true,
            fail_every_line: false,
        };
        let worker = PluginWorker::new(
            Box::new(plugin),
            ctx(),
            queue,
            ShortCircuitLatch::new(),
            PluginTrace::new(std::io::sink()),
        );

        let run_token = CancellationToken::new();
        run_token.cancel();
        let (_, _, state) = worker.run(run_token).await;

        assert!(state.initialized);
        assert!(state.errors.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["1:hello", "1:world"]);
    }

    #[tokio::test]
    async fn initialize_decline_skips_processing() {
        let queue = Arc::new(OutputQueue::new());
        queue.enqueue("1:x".into());
        let plugin = RecordingPlugin {
            seen: Arc::new(Mutex::new(Vec::new())),
            init_result: false,
            fail_every_line: false,
        };
        let worker = PluginWorker::new(
            Box::new(plugin),
            ctx(),
            queue.clone(),
            ShortCircuitLatch::new(),
            PluginTrace::new(std::io::sink()),
        );
        let run_token = CancellationToken::new();
        run_token.cancel();
        let (_, _, state) = worker.run(run_token).await;

        assert!(!state.initialized);
        assert_eq!(queue.depth(), 0, "queue must be cleared unconditionally");
    }

    #[tokio::test]
    async fn process_line_errors_are_capped_and_reported() {
        let queue = Arc::new(OutputQueue::new());
        for _ in 0..15 {
            queue.enqueue("1:x".into());
        }
        let plugin = RecordingPlugin {
            seen: Arc::new(Mutex::new(Vec::new())),
            init_result: true,
            fail_every_line: true,
        };
        let worker = PluginWorker::new(
            Box::new(plugin),
            ctx(),
            queue,
            ShortCircuitLatch::new(),
            PluginTrace::new(std::io::sink()),
        );
        let run_token = CancellationToken::new();
        run_token.cancel();
        let (_, _, state) = worker.run(run_token).await;

        assert!(state.initialized);
        assert_eq!(state.errors.len(), 10);
    }

    #[tokio::test]
    async fn latch_abandons_in_flight_process_line() {
        struct BlockingPlugin {
            entered: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Plugin<()> for BlockingPlugin {
            fn friendly_name(&self) -> &str {
                "blocker"
            }
            async fn initialize(&mut self, _ctx: &PluginContext<()>) -> bool {
                true
            }
            async fn process_line(
                &mut self,
                _ctx: &PluginContext<()>,
                _step: Option<&Step>,
                _message: &str,
            ) -> anyhow::Result<()> {
                self.entered.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok(())
            }
            async fn finalize(&mut self, _ctx: &PluginContext<()>) {}
        }

        let queue = Arc::new(OutputQueue::new());
        queue.enqueue("1:x".into());
        let latch = ShortCircuitLatch::new();
        let entered = Arc::new(AtomicUsize::new(0));
        let plugin = BlockingPlugin {
            entered: entered.clone(),
        };
        let worker = PluginWorker::new(
            Box::new(plugin),
            ctx(),
            queue,
            latch.clone(),
            PluginTrace::new(std::io::sink()),
        );

        let run_token = CancellationToken::new();
        let handle = tokio::spawn(worker.run(run_token));

        // Give the worker a chance to enter process_line, then trip the
        // latch; the worker must return instead of hanging forever.
        while entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        latch.set();

        let (_, _, state) = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker must not hang once the latch trips")
            .unwrap();
        assert!(state.initialized);
    }
}
