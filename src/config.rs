use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Core proxy settings
    pub listen_addr: String,
    pub load_balancer_class: String,
    pub debug: bool,

    // Heartbeat / liveness
    pub heartbeat_secs: u64,
    pub heartbeat_timeout_secs: u64,

    // Probing
    pub probe_path: String,
    pub probe_rate: f64,
    pub probe_timeout_ms: u64,
    pub probe_tick_ms: u64,
    pub forced_probe_interval_secs: u64,
    pub probe_workers: usize,
    pub probe_queue_capacity: usize,

    // Probe pool
    pub max_probe_pool: usize,
    pub max_backends: usize,
    pub latency_window_secs: u64,

    // Selection
    pub starvation_threshold_secs: u64,
    pub rng_seed: Option<u64>,

    // Forwarding
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_tick(&self) -> Duration {
        Duration::from_millis(self.probe_tick_ms)
    }

    pub fn forced_probe_interval(&self) -> Duration {
        Duration::from_secs(self.forced_probe_interval_secs)
    }

    pub fn latency_window(&self) -> Duration {
        Duration::from_secs(self.latency_window_secs)
    }

    pub fn starvation_threshold(&self) -> Duration {
        Duration::from_secs(self.starvation_threshold_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            load_balancer_class: "prequal".to_string(),
            debug: false,
            heartbeat_secs: 30,
            heartbeat_timeout_secs: 60,
            probe_path: "/probe".to_string(),
            probe_rate: 5.0,
            probe_timeout_ms: 2000,
            probe_tick_ms: 20,
            forced_probe_interval_secs: 20,
            probe_workers: 8,
            probe_queue_capacity: 256,
            max_probe_pool: 100,
            max_backends: 64,
            latency_window_secs: 300,
            starvation_threshold_secs: 1,
            rng_seed: None,
            upstream_timeout_secs: 10,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn load_config() -> anyhow::Result<Config> {
    let listen_addr = env_string("PREQUAL_LISTEN_ADDR", "0.0.0.0:8000");
    let load_balancer_class = env_string("LOAD_BALANCER_CLASS", "prequal");
    let debug = std::env::var("DEBUG").is_ok();

    let heartbeat_secs = env_parse("BACKEND_HEARTBEAT_SECONDS", 30u64);
    // liveness timeout defaults to twice the heartbeat interval
    let heartbeat_timeout_secs =
        env_parse("BACKEND_HEARTBEAT_TIMEOUT", 2 * heartbeat_secs);

    let probe_path = env_string("BACKEND_HEALTH_PATH", "/probe");
    let probe_rate = env_parse("PROBE_RATE", 5.0f64);
    let probe_timeout_ms = env_parse("PROBE_TIMEOUT_MS", 2000u64);
    let probe_tick_ms = env_parse("PROBE_TICK_MS", 20u64);
    let forced_probe_interval_secs = env_parse("FORCED_PROBE_INTERVAL_SECS", 20u64);
    let probe_workers = env_parse("PROBE_WORKERS", 8usize);
    let probe_queue_capacity = env_parse("PROBE_QUEUE_CAPACITY", 256usize);

    let max_probe_pool = env_parse("MAX_PROBE_POOL", 100usize);
    let max_backends = env_parse("MAX_BACKENDS", 64usize);
    let latency_window_secs = env_parse("LATENCY_WINDOW_SECONDS", 300u64);

    let starvation_threshold_secs = env_parse("STARVATION_THRESHOLD_SECS", 1u64);
    let rng_seed = std::env::var("PREQUAL_RNG_SEED")
        .ok()
        .and_then(|v| v.parse().ok());

    let upstream_timeout_secs = env_parse("UPSTREAM_TIMEOUT_SECS", 10u64);

    Ok(Config {
        listen_addr,
        load_balancer_class,
        debug,
        heartbeat_secs,
        heartbeat_timeout_secs,
        probe_path,
        probe_rate,
        probe_timeout_ms,
        probe_tick_ms,
        forced_probe_interval_secs,
        probe_workers,
        probe_queue_capacity,
        max_probe_pool,
        max_backends,
        latency_window_secs,
        starvation_threshold_secs,
        rng_seed,
        upstream_timeout_secs,
    })
}
