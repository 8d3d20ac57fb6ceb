//! Probing Subsystem
//!
//! Background observation of replica load: a deduplicated task queue,
//! a bounded pool of per-replica samples, the worker manager that
//! executes probe RPCs, and the scheduler that decides when to probe.

pub mod manager;
pub mod pool;
pub mod queue;
pub mod rps;
pub mod scheduler;

pub use manager::ProbeManager;
pub use pool::ProbePool;
pub use queue::{ProbeTaskQueue, QueueError};
pub use rps::RpsWindow;
pub use scheduler::ProbeScheduler;
