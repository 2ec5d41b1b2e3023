//! Session lifecycle handlers.
//!
//! Sign-in, sign-up, sign-out, forced refresh, and the session-updated
//! push from an external browser session.

mod common;
mod refresh;
mod sign_in;
mod sign_out;
mod sign_up;
mod status;

use crate::app::DaemonState;
use mailsift_ipc::IpcServer;

/// Register all session lifecycle handlers.
pub async fn register_handlers(server: &IpcServer, state: DaemonState) {
    status::register(server, state.clone()).await;
    sign_in::register(server, state.clone()).await;
    sign_up::register(server, state.clone()).await;
    sign_out::register(server, state.clone()).await;
    refresh::register(server, state).await;
}
