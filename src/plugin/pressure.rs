//! Periodic queue-depth sampling and the short-circuit safety valve.
//!
//! The monitor never pops a queue and never blocks a producer; it only
//! reads [`OutputQueue::depth`] and, on sustained overflow, trips the
//! plugin's [`ShortCircuitLatch`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::latch::ShortCircuitLatch;
use super::queue::OutputQueue;
use super::trace::PluginTrace;

/// Number of consecutive overflow samples required to trip a latch.
/// Fixed, not configurable: transient bursts from a single fat step must
/// not trip the safety valve, only sustained pressure does.
pub const CONSECUTIVE_SAMPLES_TO_TRIP: u32 = 10;

/// One monitored plugin's queue, latch, and name (for diagnostics).
pub struct MonitoredPlugin {
    pub name: String,
    pub queue: std::sync::Arc<OutputQueue>,
    pub latch: ShortCircuitLatch,
}

/// Single cooperative task sampling every registered plugin's queue depth
/// once per `period`.
pub struct PressureMonitor {
    threshold: usize,
    period: Duration,
    trace: PluginTrace,
}

impl PressureMonitor {
    pub fn new(threshold: usize, period: Duration, trace: PluginTrace) -> Self {
        Self {
            threshold,
            period,
            trace,
        }
    }

    /// Run the sampling loop until `cancel` fires. Cancellation is only
    /// observed at the top of the loop: a sweep already in progress always
    /// finishes before the token is checked again.
    pub async fn run(&self, plugins: &[MonitoredPlugin], cancel: CancellationToken) {
        // Keyed by position in `plugins`, not by `friendly_name`: the name
        // is display-only and two plugins may share one, which would alias
        // their counters in a name-keyed map.
        let mut counters: Vec<u32> = vec![0; plugins.len()];

        let mut interval = tokio::time::interval(self.period);
        // The first tick fires immediately; consume it so the first real
        // sample happens after a full period, matching "once per period".
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep(plugins, &mut counters);
                }
            }
        }
    }

    fn sweep(&self, plugins: &[MonitoredPlugin], counters: &mut [u32]) {
        for (p, counter) in plugins.iter().zip(counters.iter_mut()) {
            if p.latch.is_set() {
                continue;
            }
            let depth = p.queue.depth();
            if depth > self.threshold {
                *counter += 1;
                self.trace.trace(&format!(
                    "{}: queue depth {depth} exceeds threshold {} ({}/{} consecutive samples)",
                    p.name, self.threshold, *counter, CONSECUTIVE_SAMPLES_TO_TRIP
                ));
                if *counter >= CONSECUTIVE_SAMPLES_TO_TRIP {
                    p.latch.set();
                    self.trace.trace(&format!(
                        "{}: short-circuited after {} consecutive overflow samples",
                        p.name, CONSECUTIVE_SAMPLES_TO_TRIP
                    ));
                }
            } else if *counter != 0 {
                *counter = 0;
                self.trace
                    .trace(&format!("{}: queue depth back within threshold", p.name));
            }
        }
    }
}
