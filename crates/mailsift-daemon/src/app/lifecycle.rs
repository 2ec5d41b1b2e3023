//! Daemon lifecycle management (background start, stop, status).

use mailsift_core::Paths;
use mailsift_ipc::Method;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Start the daemon as a detached background process.
///
/// Re-executes the current binary with `start --foreground`, stdout and
/// stderr redirected into the logs directory. The child outlives this
/// process.
pub fn spawn_background(paths: &Paths, log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;

    let log_path = paths.logs_dir().join("daemon.log");
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let mut command = background_command(std::env::current_exe()?, paths, log_level);
    command
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);

    let child = command.spawn()?;
    println!("Daemon started (pid {})", child.id());
    println!("  Logs: {}", log_path.display());
    Ok(())
}

fn background_command(exe: PathBuf, paths: &Paths, log_level: &str) -> Command {
    let mut command = Command::new(exe);
    command
        .arg("start")
        .arg("--foreground")
        .arg("--log-level")
        .arg(log_level)
        .arg("--base-dir")
        .arg(paths.base_dir());
    command
}

/// Stop the daemon.
pub async fn stop_daemon(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Daemon is not running (socket not found)");
        // Clean up stale PID file if it exists
        if pid_path.exists() {
            let _ = std::fs::remove_file(&pid_path);
        }
        return Ok(());
    }

    // Try graceful shutdown first
    let client = mailsift_ipc::IpcClient::new(&socket_path.to_string_lossy());

    match client.call_method(Method::Shutdown).await {
        Ok(response) => {
            if response.is_success() {
                println!("Daemon shutdown initiated");
            } else {
                println!("Shutdown failed: {:?}", response.error);
            }
        }
        Err(e) => {
            println!("Failed to connect to daemon: {}", e);
        }
    }

    // Wait for daemon to stop (up to 3 seconds)
    for _ in 0..30 {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        if !socket_path.exists() {
            println!("Daemon stopped");
            return Ok(());
        }
    }

    // The daemon owns the socket; if it never removed it, assume it is gone
    // and clean up so the next start doesn't trip over a stale file.
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(&pid_path);
        println!("Daemon did not confirm shutdown, cleaned up socket");
    }

    Ok(())
}

/// Check daemon status.
pub async fn check_status(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Daemon is not running (socket not found)");
        return Ok(());
    }

    let client = mailsift_ipc::IpcClient::new(&socket_path.to_string_lossy());

    match client.call_method(Method::Health).await {
        Ok(response) => {
            if response.is_success() {
                if let Some(result) = response.result {
                    let version = result
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    let status = result
                        .get("status")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");

                    // Try to read PID
                    let pid = std::fs::read_to_string(&pid_path).ok();

                    println!("Daemon is running");
                    println!("  Status:  {}", status);
                    println!("  Version: {}", version);
                    if let Some(pid) = pid {
                        println!("  PID:     {}", pid.trim());
                    }
                    println!("  Socket:  {}", socket_path.display());
                } else {
                    println!("Daemon is running (no details available)");
                }
            } else {
                println!("Daemon returned error: {:?}", response.error);
            }
        }
        Err(e) => {
            println!("Failed to connect to daemon: {}", e);
            println!("Daemon may not be running or socket may be stale");
        }
    }

    Ok(())
}
