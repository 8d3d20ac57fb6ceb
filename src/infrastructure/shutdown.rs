//! Graceful Shutdown Handler
//!
//! Coordinated shutdown for the scheduler loop, the probe dispatcher,
//! and in-flight probe workers: a broadcast stop signal plus a drain
//! wait bounded by a timeout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Notify;

/// Shutdown coordinator for background tasks.
#[derive(Clone)]
pub struct ShutdownController {
    initiated: Arc<AtomicBool>,
    active_tasks: Arc<AtomicUsize>,
    signal_tx: broadcast::Sender<()>,
    drained: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (signal_tx, _) = broadcast::channel(1);
        Self {
            initiated: Arc::new(AtomicBool::new(false)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            signal_tx,
            drained: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to the stop signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.signal_tx.subscribe()
    }

    /// Initiate shutdown. Idempotent.
    pub fn signal(&self) {
        if !self.initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating shutdown");
            let _ = self.signal_tx.send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// RAII guard tracking one in-flight task.
    pub fn guard(&self) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: self.clone(),
        }
    }

    /// Wait until all tracked tasks have finished, up to `timeout`.
    /// Returns whether the drain completed.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        if self.active_tasks() == 0 {
            return true;
        }
        tokio::select! {
            _ = self.drained.notified() => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "drain timeout: {} tasks still active",
                    self.active_tasks()
                );
                false
            }
        }
    }

    fn task_ended(&self) {
        let prev = self.active_tasks.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 && self.is_shutdown() {
            self.drained.notify_waiters();
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the active-task count on drop.
pub struct TaskGuard {
    controller: ShutdownController,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.task_ended();
    }
}

/// Completes when Ctrl+C or SIGTERM arrives, then signals the
/// controller.
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    controller.signal();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_controller_state() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert_eq!(controller.active_tasks(), 0);
    }

    #[test]
    fn test_signal_is_idempotent() {
        let controller = ShutdownController::new();
        controller.signal();
        controller.signal();
        assert!(controller.is_shutdown());
    }

    #[test]
    fn test_guard_tracks_tasks() {
        let controller = ShutdownController::new();
        {
            let _g1 = controller.guard();
            let _g2 = controller.guard();
            assert_eq!(controller.active_tasks(), 2);
        }
        assert_eq!(controller.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_receives_signal() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        controller.signal();
        let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_ok());
    }

    #[tokio::test]
    async fn test_drain_immediate_when_no_tasks() {
        let controller = ShutdownController::new();
        controller.signal();
        assert!(controller.wait_for_drain(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_drain_waits_for_guard_drop() {
        let controller = ShutdownController::new();
        let guard = controller.guard();
        controller.signal();

        let ctrl = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        assert!(ctrl.wait_for_drain(Duration::from_millis(300)).await);
    }

    #[tokio::test]
    async fn test_drain_times_out_with_stuck_task() {
        let controller = ShutdownController::new();
        let _guard = controller.guard();
        controller.signal();
        assert!(!controller.wait_for_drain(Duration::from_millis(30)).await);
    }

    #[test]
    fn test_clone_shares_state() {
        let controller = ShutdownController::new();
        let cloned = controller.clone();
        let _guard = controller.guard();
        assert_eq!(cloned.active_tasks(), 1);
        cloned.signal();
        assert!(controller.is_shutdown());
    }
}
