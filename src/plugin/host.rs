//! Host: assembles queues, latches, workers, and the pressure monitor;
//! exposes `enqueue`, `finish`, `run`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::context::{PluginContext, StepTable};
use super::isolation::call_plugin_safely_async;
use super::latch::ShortCircuitLatch;
use super::lifecycle::Plugin;
use super::pressure::{MonitoredPlugin, PressureMonitor};
use super::queue::OutputQueue;
use super::trace::PluginTrace;
use super::worker::PluginWorker;

/// Construction-time tunables. See `HostConfig` in `crate::config` for the
/// environment-overridable form of these defaults. `consecutive_samples_to_trip`
/// and `idle_backoff` are fixed constants (see [`super::pressure`] and
/// [`super::worker`]) and are not part of this struct.
#[derive(Debug, Clone, Copy)]
pub struct HostTuning {
    pub short_circuit_threshold: usize,
    pub monitor_period: Duration,
}

impl Default for HostTuning {
    fn default() -> Self {
        Self {
            short_circuit_threshold: 1000,
            monitor_period: Duration::from_secs(10),
        }
    }
}

/// Errors in using the Host API. Per-plugin failures are never surfaced
/// here — they are swallowed and traced, per spec.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("run() was already called on this host")]
    AlreadyRun,
}

/// The queue/latch/context half of a plugin's state, alive for the
/// host's whole lifetime so `enqueue`/`finish` can reach it without
/// touching the plugin instance itself.
struct PluginHandle<S> {
    name: String,
    queue: Arc<OutputQueue>,
    latch: ShortCircuitLatch,
    ctx: PluginContext<S>,
}

/// Owns plugin lifecycle and dispatch for one job's log stream.
///
/// `enqueue` and `finish` take `&self` and only ever touch
/// [`PluginHandle`]s, so a `Host` wrapped in `Arc` can be fed from a
/// producer task while `run` drains it concurrently from another — the
/// boxed `Plugin` instances themselves are handed out exactly once, via
/// the `Mutex<Option<_>>`, to whichever task calls `run` first.
pub struct Host<S> {
    handles: Vec<PluginHandle<S>>,
    plugins: Mutex<Option<Vec<Box<dyn Plugin<S>>>>>,
    trace: PluginTrace,
    tuning: HostTuning,
    job_finished: ShortCircuitLatch,
}

impl<S: Send + Sync + 'static> Host<S> {
    /// Construct a host with its per-plugin state pre-allocated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<S>,
        steps: StepTable,
        endpoints: Arc<HashMap<String, String>>,
        repositories: Arc<HashMap<String, String>>,
        variables: Arc<HashMap<String, String>>,
        plugins: Vec<Box<dyn Plugin<S>>>,
        trace: PluginTrace,
        tuning: HostTuning,
    ) -> Self {
        let mut handles = Vec::with_capacity(plugins.len());
        for plugin in &plugins {
            let name = plugin.friendly_name().to_string();
            let ctx = PluginContext::new(
                Arc::clone(&service),
                Arc::clone(&steps),
                Arc::clone(&endpoints),
                Arc::clone(&repositories),
                Arc::clone(&variables),
                &trace,
                &name,
            );
            handles.push(PluginHandle {
                name,
                queue: Arc::new(OutputQueue::new()),
                latch: ShortCircuitLatch::new(),
                ctx,
            });
        }

        Self {
            handles,
            plugins: Mutex::new(Some(plugins)),
            trace,
            tuning,
            job_finished: ShortCircuitLatch::new(),
        }
    }

    /// Convenience constructor using default tunables and a stdout trace.
    pub fn with_defaults(
        service: Arc<S>,
        steps: StepTable,
        plugins: Vec<Box<dyn Plugin<S>>>,
    ) -> Self {
        Self::new(
            service,
            steps,
            Arc::new(HashMap::new()),
            Arc::new(HashMap::new()),
            Arc::new(HashMap::new()),
            plugins,
            PluginTrace::stdout(),
            HostTuning::default(),
        )
    }

    /// Push a line onto every live plugin's queue. Empty lines are
    /// dropped silently. Safe to call concurrently with `run()`.
    pub fn enqueue(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if line.is_empty() {
            return;
        }
        for handle in &self.handles {
            if !handle.latch.is_set() {
                handle.queue.enqueue(line.to_string());
            }
        }
    }

    /// Idempotently signal that no more lines will be enqueued.
    pub fn finish(&self) {
        self.job_finished.set();
    }

    /// Execute the shutdown protocol and return once every worker and
    /// finalizer has settled. Calling this more than once returns
    /// [`HostError::AlreadyRun`] without touching any plugin state.
    pub async fn run(self: Arc<Self>) -> Result<(), HostError> {
        let plugins = self
            .plugins
            .lock()
            .take()
            .ok_or(HostError::AlreadyRun)?;

        // Step 1 — start the pressure monitor with its own cancellation.
        let monitor_cancel = CancellationToken::new();
        let monitored: Vec<MonitoredPlugin> = self
            .handles
            .iter()
            .map(|h| MonitoredPlugin {
                name: h.name.clone(),
                queue: Arc::clone(&h.queue),
                latch: h.latch.clone(),
            })
            .collect();
        let monitor = PressureMonitor::new(
            self.tuning.short_circuit_threshold,
            self.tuning.monitor_period,
            self.trace.clone(),
        );
        let monitor_cancel_for_task = monitor_cancel.clone();
        let monitor_handle =
            tokio::spawn(async move { monitor.run(&monitored, monitor_cancel_for_task).await });

        // Step 2 — start one worker per plugin, sharing one run_token.
        // `plugins` and `self.handles` were built from the same input
        // vector in the same order, so zipping them pairs each boxed
        // plugin with its own queue/latch/context.
        let run_token = CancellationToken::new();
        let mut worker_handles = Vec::with_capacity(plugins.len());
        for (plugin, handle) in plugins.into_iter().zip(self.handles.iter()) {
            let latch_for_finalize = handle.latch.clone();
            let worker = PluginWorker::new(
                plugin,
                handle.ctx.clone(),
                Arc::clone(&handle.queue),
                handle.latch.clone(),
                self.trace.clone(),
            );
            let token = run_token.clone();
            let join = tokio::spawn(async move { worker.run(token).await });
            worker_handles.push((handle.name.clone(), latch_for_finalize, join));
        }

        // Steps 3-4 — wait for finish(), then cancel run_token. The
        // monitor stays alive: a worker may still overflow during
        // post-finish drain.
        self.job_finished.wait().await;
        run_token.cancel();

        // Step 5 — await every worker, swallowing and tracing failures.
        // Each worker hands back its plugin and context so the finalize
        // pass below can use the very instance that ran.
        let mut finalize_candidates = Vec::with_capacity(worker_handles.len());
        for (name, latch, join) in worker_handles {
            match join.await {
                Ok((plugin, ctx, state)) => {
                    finalize_candidates.push((name, latch, plugin, ctx, state));
                }
                Err(join_err) => {
                    self.trace
                        .trace(&format!("{name}: worker task panicked: {join_err}"));
                }
            }
        }

        // Step 6 — cancel the monitor, await its exit.
        monitor_cancel.cancel();
        let _ = monitor_handle.await;

        // Steps 7-8 — finalize every plugin that initialized and whose
        // latch is unset (it may have tripped after Phase 2/3 completed,
        // e.g. the monitor firing just as the worker wound down), run
        // concurrently, swallow and trace failures.
        let trace = self.trace.clone();
        let finalizers = finalize_candidates
            .into_iter()
            .filter(|(_, latch, _, _, state)| state.initialized && !latch.is_set())
            .map(|(name, _latch, mut plugin, ctx, _state)| {
                let trace = trace.clone();
                tokio::spawn(async move {
                    let result = call_plugin_safely_async(async {
                        plugin.finalize(&ctx).await;
                        Ok::<_, anyhow::Error>(())
                    })
                    .await;
                    if let Err(e) = result {
                        trace.trace(&format!("{name}: finalize failed: {e}"));
                    }
                })
            });

        for handle in finalizers {
            let _ = handle.await;
        }

        Ok(())
    }
}
