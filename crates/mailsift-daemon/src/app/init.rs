//! Daemon initialization.

use crate::app::{scheduler, DaemonState};
use crate::extract::TokenExtractor;
use crate::ipc::register_handlers;
use mailsift_auth::{
    AuthError, CredentialRefresher, EntitlementCache, FunctionsClient, IdentityProvider,
    SupabaseIdentity, SystemClock, DAEMON_EXPIRY_BUFFER_SECS,
};
use mailsift_core::{Config, Paths};
use mailsift_ipc::IpcServer;
use mailsift_storage::{CaptureStore, CredentialStore, FileStorage, StorageArea};
use mailsift_sync::{CaptureService, SyncEngine};
use std::sync::Arc;
use tracing::{info, warn};

/// Run the daemon.
pub async fn run_daemon(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    // Singleton enforcement: check if daemon is already running
    let socket_path = paths.socket_file();
    if socket_path.exists() {
        let client = mailsift_ipc::IpcClient::new(&socket_path.to_string_lossy());
        if client.call_method(mailsift_ipc::Method::Health).await.is_ok() {
            eprintln!("Error: Daemon is already running. Use 'mailsiftd stop' to stop it first.");
            std::process::exit(1);
        }
        // Socket exists but daemon not responding - clean up stale socket
        eprintln!("Removing stale socket file");
        let _ = std::fs::remove_file(&socket_path);
    }

    // Clean up stale PID file if it exists
    let pid_file = paths.pid_file();
    if pid_file.exists() {
        let _ = std::fs::remove_file(&pid_file);
    }

    info!("Starting mailsift daemon");

    // Log config values to verify compile-time env vars
    info!(
        supabase_url = %config.supabase_url,
        supabase_key_prefix = %key_prefix(&config.supabase_publishable_key),
        "Configuration loaded"
    );

    // Ensure directories exist
    paths.ensure_dirs()?;

    // Write PID file
    let pid = std::process::id();
    std::fs::write(paths.pid_file(), pid.to_string())?;
    info!(pid = pid, "Daemon started");

    // Durable storage backing both the credential and the capture collection
    let storage: Arc<dyn StorageArea> = Arc::new(FileStorage::open(paths.store_file())?);
    info!(path = %paths.store_file().display(), "Storage initialized");

    let credentials = Arc::new(CredentialStore::new(storage.clone()));
    let captures = Arc::new(CaptureStore::new(storage));

    // Remote clients
    let identity = Arc::new(SupabaseIdentity::new(
        &config.supabase_url,
        &config.supabase_publishable_key,
    ));
    let functions = Arc::new(FunctionsClient::new(
        &config.functions_url(),
        &config.supabase_publishable_key,
    ));

    // Session and entitlement engine
    let refresher = Arc::new(CredentialRefresher::new(
        credentials.clone(),
        identity.clone(),
        Arc::new(SystemClock),
        DAEMON_EXPIRY_BUFFER_SECS,
    ));
    let entitlement = Arc::new(EntitlementCache::new(
        refresher.clone(),
        functions.clone(),
        credentials.clone(),
        Arc::new(SystemClock),
    ));

    let sync = Arc::new(SyncEngine::new(
        captures.clone(),
        credentials.clone(),
        refresher.clone(),
        functions.clone(),
    ));
    let capture_service = Arc::new(CaptureService::new(
        entitlement.clone(),
        captures.clone(),
        credentials.clone(),
        sync.clone(),
        Arc::new(TokenExtractor),
    ));

    validate_startup_session(&refresher, identity.clone(), &credentials, &entitlement).await;

    let ipc_server = IpcServer::new(&paths.socket_file().to_string_lossy());

    let state = DaemonState {
        config: Arc::new(config),
        paths: Arc::new(paths.clone()),
        credentials,
        captures,
        identity,
        refresher,
        entitlement,
        sync,
        capture_service,
    };

    // Register handlers
    register_handlers(&ipc_server, state.clone()).await;

    // Periodic token refresh and entitlement recheck
    let scheduler_task = scheduler::start(state, ipc_server.shutdown_receiver());

    // Run server
    info!(
        socket = %paths.socket_file().display(),
        "IPC server starting"
    );

    let server_result = ipc_server.run().await;

    let _ = scheduler_task.await;

    // Cleanup
    let _ = std::fs::remove_file(paths.pid_file());
    let _ = std::fs::remove_file(paths.socket_file());

    info!("Daemon stopped");

    server_result.map_err(|e| e.into())
}

/// Loggable prefix of the publishable key. Char-based so a multibyte key
/// never splits mid-character.
fn key_prefix(key: &str) -> String {
    key.chars().take(20).collect()
}

/// Validate the existing session on startup. A stale credential gets
/// refreshed; a fresh one is checked against the server, and a rejected
/// one is cleared so the user re-signs-in.
async fn validate_startup_session(
    refresher: &CredentialRefresher,
    identity: Arc<dyn IdentityProvider>,
    credentials: &CredentialStore,
    entitlement: &EntitlementCache,
) {
    match refresher.ensure_fresh().await {
        Ok(Some(credential)) => match identity.fetch_user(credential.access_token).await {
            Ok(user) => info!(user_id = %user.id, "Existing session validated"),
            Err(AuthError::SessionInvalid) => {
                warn!("Server no longer accepts the stored session, clearing it");
                if let Err(e) = credentials.clear_credential() {
                    warn!(error = %e, "Failed to clear rejected credential");
                }
                if let Err(e) = credentials.clear_authorization() {
                    warn!(error = %e, "Failed to clear authorization flag");
                }
                entitlement.invalidate();
            }
            Err(e) => info!(error = %e, "Session check inconclusive, keeping stored session"),
        },
        Ok(None) => info!("No existing session"),
        Err(e) => warn!(error = %e, "Session validation failed, user will need to sign in again"),
    }
}
