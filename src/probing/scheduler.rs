//! Probe Scheduler
//!
//! Periodic loop deciding which replicas to probe. Two triggers per
//! tick: forced probes for replicas whose last probe is older than the
//! forced interval, and at most one probabilistic probe whose rate
//! adapts inversely with the observed RPS so the probe/request ratio
//! stays bounded. Selection is without replacement via a rotating
//! history set.

use crate::infrastructure::ShutdownController;
use crate::probing::{ProbeTaskQueue, QueueError, RpsWindow};
use crate::registry::Registry;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct SchedulerState {
    /// URLs already chosen probabilistically this rotation.
    probe_history: HashSet<String>,
    last_probe_time: HashMap<String, Instant>,
    rng: StdRng,
}

/// Periodic probe-task producer.
pub struct ProbeScheduler {
    registry: Arc<Registry>,
    queue: Arc<ProbeTaskQueue>,
    rps: Arc<RpsWindow>,
    state: Mutex<SchedulerState>,
    tick: Duration,
    forced_interval: Duration,
    /// Probes-per-second floor for the probabilistic trigger.
    probe_rate: f64,
    shutdown: ShutdownController,
}

impl ProbeScheduler {
    pub fn new(
        registry: Arc<Registry>,
        queue: Arc<ProbeTaskQueue>,
        rps: Arc<RpsWindow>,
        tick: Duration,
        forced_interval: Duration,
        probe_rate: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            registry,
            queue,
            rps,
            state: Mutex::new(SchedulerState {
                probe_history: HashSet::new(),
                last_probe_time: HashMap::new(),
                rng,
            }),
            tick,
            forced_interval,
            probe_rate,
            shutdown: ShutdownController::new(),
        }
    }

    /// Launch the tick loop.
    pub fn start(self: &Arc<Self>) {
        let scheduler = self.clone();
        let mut stop = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = interval.tick() => scheduler.run_pass(),
                }
            }
            tracing::debug!("probe scheduler stopped");
        });
    }

    pub fn stop(&self) {
        self.shutdown.signal();
    }

    /// One scheduling pass. Public so tests can drive ticks directly.
    pub fn run_pass(&self) {
        let healthy: Vec<String> = self
            .registry
            .list_backends()
            .into_iter()
            .filter(|b| b.health)
            .map(|b| b.url)
            .collect();

        let mut tasks: Vec<String> = Vec::new();
        {
            let mut state = self.state.lock();
            let now = Instant::now();
            let healthy_set: HashSet<&String> = healthy.iter().collect();

            // lazy purge of bookkeeping for replicas no longer live
            state.probe_history.retain(|url| healthy_set.contains(url));
            state.last_probe_time.retain(|url, _| healthy_set.contains(url));

            if healthy.is_empty() {
                return;
            }

            // forced probes: nothing observed within the forced interval
            for url in &healthy {
                let due = match state.last_probe_time.get(url) {
                    Some(at) => now.duration_since(*at) >= self.forced_interval,
                    None => true,
                };
                if due {
                    state.last_probe_time.insert(url.clone(), now);
                    tasks.push(url.clone());
                    tracing::debug!("forced probe scheduled for {}", url);
                }
            }

            // probabilistic probe: R = min(1, rate / RPS), drawn over the
            // replicas not yet chosen in this rotation
            let rps = self.rps.current_rps().max(1e-6);
            let r = (self.probe_rate / rps).min(1.0);

            let mut available: Vec<&String> = healthy
                .iter()
                .filter(|url| !state.probe_history.contains(*url))
                .collect();
            if available.is_empty() {
                state.probe_history.clear();
                available = healthy.iter().collect();
            }

            if state.rng.gen::<f64>() < r {
                let idx = state.rng.gen_range(0..available.len());
                let url = available[idx].clone();
                state.probe_history.insert(url.clone());
                state.last_probe_time.insert(url.clone(), now);
                tracing::debug!("probe scheduled for {} (R={:.3}, rps={:.2})", url, r, rps);
                tasks.push(url);
            }
        }

        for url in tasks {
            match self.queue.add_task(&url) {
                Ok(_) => {}
                Err(QueueError::Full) => {
                    tracing::warn!("probe queue full, dropping task for {}", url);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn scheduler(
        registry: Arc<Registry>,
        queue: Arc<ProbeTaskQueue>,
        rps: Arc<RpsWindow>,
    ) -> ProbeScheduler {
        ProbeScheduler::new(
            registry,
            queue,
            rps,
            Duration::from_millis(20),
            Duration::from_secs(20),
            5.0,
            StdRng::seed_from_u64(7),
        )
    }

    fn components() -> (Arc<Registry>, Arc<ProbeTaskQueue>, Arc<RpsWindow>) {
        (
            Arc::new(Registry::new(Duration::from_secs(60), 100)),
            Arc::new(ProbeTaskQueue::new(64)),
            Arc::new(RpsWindow::default()),
        )
    }

    #[tokio::test]
    async fn test_forced_probes_on_first_pass() {
        let (registry, queue, rps) = components();
        for url in ["http://f1:1", "http://f2:1", "http://f3:1"] {
            registry.register(url, None);
        }

        let sched = scheduler(registry, queue.clone(), rps);
        sched.run_pass();

        // never-probed replicas are all forced on the first pass
        assert!(queue.size() >= 3);
        let mut seen = HashSet::new();
        while queue.size() > 0 {
            seen.insert(queue.get_task().await.unwrap());
        }
        for url in ["http://f1:1", "http://f2:1", "http://f3:1"] {
            assert!(seen.contains(url), "missing forced probe for {}", url);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_probe_respects_interval() {
        let (registry, queue, rps) = components();
        registry.register("http://f1:1", None);

        // probe_rate 0 disables the probabilistic trigger so only the
        // forced path is exercised
        let sched = ProbeScheduler::new(
            registry.clone(),
            queue.clone(),
            rps,
            Duration::from_millis(20),
            Duration::from_secs(20),
            0.0,
            StdRng::seed_from_u64(7),
        );

        sched.run_pass();
        assert_eq!(queue.size(), 1);
        queue.get_task().await;

        // within the interval: no forced probe
        tokio::time::advance(Duration::from_secs(5)).await;
        // re-register so the heartbeat stays fresh under paused time
        registry.register("http://f1:1", None);
        sched.run_pass();
        assert_eq!(queue.size(), 0);

        // past the interval: forced again
        tokio::time::advance(Duration::from_secs(16)).await;
        registry.register("http://f1:1", None);
        sched.run_pass();
        assert_eq!(queue.size(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_replicas_are_not_probed() {
        let (registry, queue, rps) = components();
        registry.register("http://up:1", None);
        registry.register("http://down:1", None);
        registry.mark_unhealthy("http://down:1");

        let sched = scheduler(registry, queue.clone(), rps);
        sched.run_pass();

        let mut seen = HashSet::new();
        while queue.size() > 0 {
            seen.insert(queue.get_task().await.unwrap());
        }
        assert!(seen.contains("http://up:1"));
        assert!(!seen.contains("http://down:1"));
    }

    #[tokio::test]
    async fn test_probabilistic_rotation_covers_all_replicas() {
        let (registry, queue, rps) = components();
        let urls = ["http://a:1", "http://b:1", "http://c:1"];
        for url in urls {
            registry.register(url, None);
        }

        // zero RPS -> R = 1 -> one probabilistic probe every pass
        let sched = scheduler(registry, queue.clone(), rps);

        // the history accumulates one distinct URL per pass until every
        // replica has been chosen, then resets
        for expected in 1..=3 {
            sched.run_pass();
            assert_eq!(sched.state.lock().probe_history.len(), expected);
            while queue.size() > 0 {
                queue.get_task().await;
            }
        }
    }

    #[tokio::test]
    async fn test_bookkeeping_purged_after_unregister() {
        let (registry, queue, rps) = components();
        registry.register("http://a:1", None);
        registry.register("http://b:1", None);

        let sched = scheduler(registry.clone(), queue.clone(), rps);
        sched.run_pass();
        while queue.size() > 0 {
            queue.get_task().await;
        }

        registry.unregister("http://b:1");
        sched.run_pass();

        let state = sched.state.lock();
        assert!(!state.last_probe_time.contains_key("http://b:1"));
        assert!(!state.probe_history.contains("http://b:1"));
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_noop() {
        let (registry, queue, rps) = components();
        let sched = scheduler(registry, queue.clone(), rps);
        sched.run_pass();
        assert_eq!(queue.size(), 0);
    }

    #[tokio::test]
    async fn test_queue_full_drops_are_tolerated() {
        let (registry, _, rps) = components();
        let queue = Arc::new(ProbeTaskQueue::new(1));
        for url in ["http://a:1", "http://b:1", "http://c:1"] {
            registry.register(url, None);
        }

        let sched = ProbeScheduler::new(
            registry,
            queue.clone(),
            rps,
            Duration::from_millis(20),
            Duration::from_secs(20),
            5.0,
            StdRng::seed_from_u64(7),
        );
        // must not panic; only one task fits
        sched.run_pass();
        assert_eq!(queue.size(), 1);
    }
}
