//! One-shot short-circuit signal.
//!
//! A `ShortCircuitLatch` is the sole coordination channel between the
//! [`super::pressure::PressureMonitor`] and a plugin's
//! [`super::worker::PluginWorker`]: once set, it is set forever, and any
//! task waiting on it wakes without polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Clone)]
pub struct ShortCircuitLatch {
    inner: Arc<Inner>,
}

struct Inner {
    set: AtomicBool,
    notify: Notify,
}

impl ShortCircuitLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                set: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Trip the latch. Idempotent: a second call is a no-op beyond waking
    /// any late waiters again.
    pub fn set(&self) {
        self.inner.set.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Resolve the first time `set()` is observed. Returns immediately if
    /// the latch is already set.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            // Register interest before re-checking to avoid a lost wakeup
            // if `set()` races between the check above and this call.
            let notified = self.inner.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShortCircuitLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn set_is_idempotent_and_observable() {
        let latch = ShortCircuitLatch::new();
        assert!(!latch.is_set());
        latch.set();
        latch.set();
        assert!(latch.is_set());
        tokio::time::timeout(Duration::from_millis(50), latch.wait())
            .await
            .expect("wait should resolve immediately once set");
    }

    #[tokio::test]
    async fn wait_wakes_on_later_set() {
        let latch = ShortCircuitLatch::new();
        let waiter = latch.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        latch.set();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("waiter task should complete")
            .unwrap();
    }
}
