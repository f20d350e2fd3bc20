//! # Runtime
//!
//! Process-level wiring: startup and the reconcile loop with its shutdown path.

pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::{run_watch_loop, spawn_shutdown_listener, TerminationSignals};
