//! Probe Task Queue
//!
//! Bounded, deduplicated FIFO of backend URLs pending a probe. The
//! dedup mark is inserted before the channel push and cleared after the
//! channel receive, so set membership always equals the multiset of
//! URLs in the channel.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;

/// Error returned when the bounded queue cannot accept a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The channel is saturated; the task was dropped.
    Full,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => write!(f, "probe task queue is full"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Deduplicated bounded FIFO of probe targets.
pub struct ProbeTaskQueue {
    pending: Mutex<HashSet<String>>,
    tx: mpsc::Sender<String>,
    rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl ProbeTaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            pending: Mutex::new(HashSet::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Enqueue a probe task. Returns `Ok(true)` when enqueued,
    /// `Ok(false)` when the URL was already pending (coalesced), and
    /// `Err(QueueError::Full)` when the channel is saturated - the
    /// dedup mark is rolled back so a later attempt can retry.
    pub fn add_task(&self, url: &str) -> Result<bool, QueueError> {
        {
            let mut pending = self.pending.lock();
            if !pending.insert(url.to_string()) {
                tracing::debug!("probe task for {} already queued", url);
                return Ok(false);
            }
        }
        match self.tx.try_send(url.to_string()) {
            Ok(()) => Ok(true),
            Err(_) => {
                self.pending.lock().remove(url);
                Err(QueueError::Full)
            }
        }
    }

    /// Wait for the next task. Returns `None` only if the queue has
    /// been closed. Cancellable: callers select against a shutdown
    /// signal.
    pub async fn get_task(&self) -> Option<String> {
        let url = self.rx.lock().await.recv().await?;
        self.pending.lock().remove(&url);
        Some(url)
    }

    /// Number of unique URLs currently queued.
    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_add_and_get() {
        let q = ProbeTaskQueue::new(8);
        assert_eq!(q.add_task("http://b1:8001"), Ok(true));
        assert_eq!(q.size(), 1);

        let task = q.get_task().await;
        assert_eq!(task.as_deref(), Some("http://b1:8001"));
        assert_eq!(q.size(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_are_coalesced() {
        let q = ProbeTaskQueue::new(8);
        assert_eq!(q.add_task("http://x:1"), Ok(true));
        for _ in 0..9 {
            assert_eq!(q.add_task("http://x:1"), Ok(false));
        }
        assert_eq!(q.size(), 1);

        assert_eq!(q.get_task().await.as_deref(), Some("http://x:1"));
        // nothing else queued
        let next = tokio::time::timeout(Duration::from_millis(50), q.get_task()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_adds_yield_one_task() {
        let q = Arc::new(ProbeTaskQueue::new(16));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let q = q.clone();
            handles.push(tokio::spawn(async move { q.add_task("http://x:1") }));
        }
        let mut enqueued = 0;
        for h in handles {
            if h.await.unwrap() == Ok(true) {
                enqueued += 1;
            }
        }
        assert_eq!(enqueued, 1);
        assert_eq!(q.size(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_returns_error_and_rolls_back_mark() {
        let q = ProbeTaskQueue::new(1);
        assert_eq!(q.add_task("http://a:1"), Ok(true));
        assert_eq!(q.add_task("http://b:1"), Err(QueueError::Full));
        // the rejected URL was not left marked: it can be queued later
        assert_eq!(q.size(), 1);
        assert_eq!(q.get_task().await.as_deref(), Some("http://a:1"));
        assert_eq!(q.add_task("http://b:1"), Ok(true));
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let q = ProbeTaskQueue::new(8);
        q.add_task("http://a:1").unwrap();
        q.add_task("http://b:1").unwrap();
        q.add_task("http://c:1").unwrap();
        assert_eq!(q.get_task().await.as_deref(), Some("http://a:1"));
        assert_eq!(q.get_task().await.as_deref(), Some("http://b:1"));
        assert_eq!(q.get_task().await.as_deref(), Some("http://c:1"));
    }

    #[tokio::test]
    async fn test_get_task_blocks_until_available() {
        let q = Arc::new(ProbeTaskQueue::new(8));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.get_task().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.add_task("http://late:1").unwrap();

        let got = waiter.await.unwrap();
        assert_eq!(got.as_deref(), Some("http://late:1"));
    }

    #[test]
    fn test_queue_error_display() {
        assert_eq!(QueueError::Full.to_string(), "probe task queue is full");
    }
}
