//! prequal-proxy Library
//!
//! This module exposes the proxy components for use in integration
//! tests and as a library.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod metrics;
pub mod probing;
pub mod registry;
pub mod selectors;

// Re-export commonly used types
pub use adapters::inbound::http_server;
pub use adapters::outbound::HttpProbeTransport;
pub use config::{load_config, Config};
pub use domain::entities::{HotCold, ProbeResponse, Replica};
pub use domain::ports::{ProbeTransport, Selector};
pub use metrics::ProxyMetrics;
pub use probing::{ProbeManager, ProbePool, ProbeScheduler, ProbeTaskQueue, RpsWindow};
pub use registry::Registry;
pub use selectors::build_selector;
