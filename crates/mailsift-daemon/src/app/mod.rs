//! Application wiring and lifecycle management.

mod init;
mod lifecycle;
mod scheduler;
mod state;

pub use init::run_daemon;
pub use lifecycle::{check_status, spawn_background, stop_daemon};
pub use state::DaemonState;
