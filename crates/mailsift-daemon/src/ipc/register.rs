//! Handler registration for the IPC server.

use crate::app::DaemonState;
use crate::auth;
use crate::ipc::handlers;
use mailsift_ipc::IpcServer;
use tracing::info;

/// Register all IPC handlers.
pub async fn register_handlers(server: &IpcServer, state: DaemonState) {
    handlers::health::register(server).await;
    auth::register_handlers(server, state.clone()).await;
    handlers::authorization::register(server, state.clone()).await;
    handlers::capture::register(server, state.clone()).await;
    handlers::contacts::register(server, state.clone()).await;
    handlers::sync::register(server, state.clone()).await;
    handlers::settings::register(server, state).await;

    info!("All IPC handlers registered");
}
