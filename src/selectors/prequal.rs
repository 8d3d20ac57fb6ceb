//! Prequal Selector
//!
//! Hot/cold lexicographic backend selection. Each replica is classified
//! against its own RIF history: cold replicas compete on latency, hot
//! replicas on load. Ties inside an epsilon band go to the
//! least-recently-picked candidate, and a starvation override
//! guarantees every healthy replica is picked at least once per
//! threshold interval.

use crate::domain::entities::Replica;
use crate::domain::ports::Selector;
use crate::domain::stats;
use crate::probing::{ProbePool, RpsWindow};
use crate::registry::Registry;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tie-breaking band for latency and RIF comparisons, in ms.
const EPSILON: f64 = 1e-6;

/// How long a healthy-replica snapshot stays valid.
const SNAPSHOT_CACHE: Duration = Duration::from_millis(5);

#[derive(Clone, Copy)]
struct PickInfo {
    /// Last pick instant; initialized to first-seen so fresh replicas
    /// age into the starvation override instead of triggering it.
    at: Instant,
    count: u64,
}

struct SelectorState {
    rng: StdRng,
    snapshot: Vec<Replica>,
    snapshot_at: Option<Instant>,
    /// Median cache keyed by (ring length, last value): recomputation
    /// is skipped while the ring has not changed.
    median_cache: HashMap<String, (usize, f64, f64)>,
    last_pick: HashMap<String, PickInfo>,
}

/// The Prequal pick policy.
pub struct PrequalSelector {
    registry: Arc<Registry>,
    pool: Arc<ProbePool>,
    rps: Arc<RpsWindow>,
    starvation_threshold: Duration,
    state: Mutex<SelectorState>,
}

impl PrequalSelector {
    pub fn new(
        registry: Arc<Registry>,
        pool: Arc<ProbePool>,
        rps: Arc<RpsWindow>,
        starvation_threshold: Duration,
        rng: StdRng,
    ) -> Self {
        Self {
            registry,
            pool,
            rps,
            starvation_threshold,
            state: Mutex::new(SelectorState {
                rng,
                snapshot: Vec::new(),
                snapshot_at: None,
                median_cache: HashMap::new(),
                last_pick: HashMap::new(),
            }),
        }
    }

    /// Pick counts per replica, for diagnostics.
    pub fn pick_count(&self, url: &str) -> u64 {
        self.state
            .lock()
            .last_pick
            .get(url)
            .map(|p| p.count)
            .unwrap_or(0)
    }

    fn pick(&self) -> Option<String> {
        self.rps.record();

        let mut state = self.state.lock();
        let now = Instant::now();

        // refresh the healthy snapshot outside the cache window
        let stale = match state.snapshot_at {
            Some(at) => now.duration_since(at) >= SNAPSHOT_CACHE,
            None => true,
        };
        if stale {
            state.snapshot = self
                .registry
                .list_backends()
                .into_iter()
                .filter(|b| b.health)
                .collect();
            state.snapshot_at = Some(now);

            // lazy purge of bookkeeping for replicas no longer visible,
            // and first-seen initialization for new ones
            let urls: Vec<String> = state.snapshot.iter().map(|b| b.url.clone()).collect();
            state.last_pick.retain(|url, _| urls.iter().any(|u| u == url));
            state.median_cache.retain(|url, _| urls.iter().any(|u| u == url));
            for url in urls {
                state
                    .last_pick
                    .entry(url)
                    .or_insert(PickInfo { at: now, count: 0 });
            }
        }

        if state.snapshot.is_empty() {
            return None;
        }

        let probed: Vec<Replica> = state
            .snapshot
            .iter()
            .filter(|b| b.hot_cold.is_probed())
            .cloned()
            .collect();

        // bootstrap: nothing probed yet, route to any healthy replica
        if probed.is_empty() {
            let n = state.snapshot.len();
            let idx = state.rng.gen_range(0..n);
            let url = state.snapshot[idx].url.clone();
            Self::record_pick(&mut state, &url, now);
            return Some(url);
        }

        // starvation override: anything unpicked for the threshold is
        // served immediately, oldest first
        let starved = probed
            .iter()
            .filter_map(|b| {
                let info = state.last_pick.get(&b.url)?;
                (now.duration_since(info.at) >= self.starvation_threshold)
                    .then_some((b.url.clone(), (info.at, info.count)))
            })
            .min_by_key(|(_, key)| *key);
        if let Some((url, _)) = starved {
            tracing::debug!("starvation override picked {}", url);
            Self::record_pick(&mut state, &url, now);
            return Some(url);
        }

        // classify each probed replica against its own RIF median
        let mut cold: Vec<&Replica> = Vec::new();
        let mut hot: Vec<(&Replica, f64)> = Vec::new();
        for replica in &probed {
            let rifs = {
                let pooled = self.pool.rif_values(&replica.url);
                if pooled.is_empty() {
                    replica.probe.rif_values()
                } else {
                    pooled
                }
            };
            if rifs.is_empty() {
                cold.push(replica);
                continue;
            }
            let count = rifs.len();
            let last = rifs[count - 1];
            let cached = state.median_cache.get(&replica.url).copied();
            let med = match cached {
                Some((c, l, m)) if c == count && l == last => m,
                _ => {
                    let m = stats::median(&rifs).unwrap_or(0.0);
                    state
                        .median_cache
                        .insert(replica.url.clone(), (count, last, m));
                    m
                }
            };
            if last < med {
                cold.push(replica);
            } else {
                hot.push((replica, med));
            }
        }

        let chosen = if !cold.is_empty() {
            // cold rule: lowest latency wins
            let scored: Vec<(&Replica, f64)> = cold
                .iter()
                .map(|b| {
                    let latency = self
                        .pool
                        .current_latency(&b.url)
                        .or_else(|| b.probe.avg_latency_ms())
                        .unwrap_or(f64::INFINITY);
                    (*b, latency)
                })
                .collect();
            Self::least_recently_picked_min(&state, &scored)
        } else {
            // hot rule: lowest effective RIF (ring median; replicas
            // without a ring never reach this branch)
            let scored: Vec<(&Replica, f64)> =
                hot.iter().map(|(b, med)| (*b, *med)).collect();
            Self::least_recently_picked_min(&state, &scored)
        };

        let url = match chosen {
            Some(url) => url,
            None => {
                let n = probed.len();
                let idx = state.rng.gen_range(0..n);
                probed[idx].url.clone()
            }
        };
        Self::record_pick(&mut state, &url, now);
        Some(url)
    }

    /// Minimum-score candidate with epsilon tie-banding, broken by
    /// least-recently-picked.
    fn least_recently_picked_min(
        state: &SelectorState,
        scored: &[(&Replica, f64)],
    ) -> Option<String> {
        if scored.is_empty() {
            return None;
        }
        let best = scored
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::INFINITY, f64::min);
        let candidates: Vec<&Replica> = scored
            .iter()
            .filter(|(_, score)| *score <= best + EPSILON)
            .map(|(b, _)| *b)
            .collect();
        // oldest last pick first; pick count breaks instant collisions
        // so never-picked candidates win their tie
        candidates
            .into_iter()
            .min_by_key(|b| state.last_pick.get(&b.url).map(|p| (p.at, p.count)))
            .map(|b| b.url.clone())
    }

    fn record_pick(state: &mut SelectorState, url: &str, now: Instant) {
        let info = state
            .last_pick
            .entry(url.to_string())
            .or_insert(PickInfo { at: now, count: 0 });
        info.at = now;
        info.count += 1;
    }
}

#[async_trait]
impl Selector for PrequalSelector {
    async fn pick_backend(&self) -> Option<String> {
        self.pick()
    }

    fn name(&self) -> &'static str {
        "prequal"
    }
}
