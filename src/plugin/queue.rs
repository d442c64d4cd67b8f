//! Per-plugin output queue.
//!
//! Each plugin owns one `OutputQueue`: an unbounded, multi-producer,
//! single-consumer FIFO of raw log lines. Backpressure in this system is
//! sampling-based (see [`super::pressure`]), not blocking, so the queue
//! deliberately never applies backpressure to its producers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// An owned line handed to a plugin: `(step id, message)` already split on
/// the first colon.
pub type Line = String;

/// Unbounded MPSC FIFO with an approximate, monotone-under-the-consumer
/// depth counter.
pub struct OutputQueue {
    tx: Sender<Line>,
    rx: Receiver<Line>,
    depth: Arc<AtomicUsize>,
}

impl OutputQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Push a line onto the queue. Safe to call from any number of
    /// concurrent producers.
    pub fn enqueue(&self, line: Line) {
        // Sender is cheap to clone (crossbeam's channel is already MPSC),
        // so no cloning is needed here; `Sender` itself supports concurrent
        // `send` calls.
        if self.tx.send(line).is_ok() {
            self.depth.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Pop the next line, if any, without blocking.
    pub fn try_dequeue(&self) -> Option<Line> {
        match self.rx.try_recv() {
            Ok(line) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Some(line)
            }
            Err(_) => None,
        }
    }

    /// Approximate current depth. Exact with a single consumer at rest;
    /// may lag slightly under concurrent producers, but is monotone with
    /// respect to what the consumer has drained.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Drain the queue unconditionally, discarding every pending line.
    pub fn clear(&self) {
        while self.try_dequeue().is_some() {}
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let q = OutputQueue::new();
        q.enqueue("1:a".into());
        q.enqueue("1:b".into());
        q.enqueue("1:c".into());
        assert_eq!(q.depth(), 3);
        assert_eq!(q.try_dequeue().as_deref(), Some("1:a"));
        assert_eq!(q.try_dequeue().as_deref(), Some("1:b"));
        assert_eq!(q.depth(), 1);
        assert_eq!(q.try_dequeue().as_deref(), Some("1:c"));
        assert_eq!(q.try_dequeue(), None);
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let q = OutputQueue::new();
        for i in 0..10 {
            q.enqueue(format!("1:{i}"));
        }
        q.clear();
        assert_eq!(q.depth(), 0);
        assert_eq!(q.try_dequeue(), None);
    }

    #[test]
    fn many_producers_one_consumer() {
        use std::thread;

        let q = Arc::new(OutputQueue::new());
        let mut handles = Vec::new();
        for p in 0..8 {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    q.enqueue(format!("{p}:{i}"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.depth(), 800);
        let mut drained = 0;
        while q.try_dequeue().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 800);
    }
}
