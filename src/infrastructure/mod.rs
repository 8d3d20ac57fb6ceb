//! Infrastructure
//!
//! Cross-cutting runtime concerns shared by the probing tasks and the
//! ingress server.

pub mod shutdown;

pub use shutdown::{shutdown_signal, ShutdownController, TaskGuard};
