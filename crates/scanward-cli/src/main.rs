//! Scanward CLI
//!
//! Command-line interface for the Scanward daemon and its media scans.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanward_core::DaemonConfig;
use scanward_ipc::{DispatchOutcome, IpcClient, IpcError, Request, Response, ResponseData};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scanward")]
#[command(about = "Scanward - media library scan coordinator")]
#[command(version)]
struct Cli {
    /// Daemon socket (default: from config)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Scanward daemon
    Start {
        /// Run in foreground (for debugging)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the Scanward daemon
    Stop,

    /// Show daemon and scan status
    Status,

    /// Check if daemon is running
    Ping,

    /// Bootstrap the media library
    Init {
        /// Retry media that failed to parse with a previous version
        #[arg(long)]
        upgrade: bool,
    },

    /// Reload the whole library, or a single entry point
    Reload {
        path: Option<String>,
    },

    /// Discover media under a path
    Discover {
        path: String,
    },

    /// Discover a newly attached storage root
    DiscoverDevice {
        path: String,
    },

    /// Pause background scanning
    Pause,

    /// Resume background scanning
    Resume,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt().with_target(false).init();
    }

    let cli = Cli::parse();
    let client = match cli.socket {
        Some(socket) => IpcClient::with_socket_path(socket),
        None => IpcClient::with_socket_path(DaemonConfig::load().socket_path),
    };

    match cli.command {
        Commands::Start { foreground } => cmd_start(&client, foreground).await,
        Commands::Stop => cmd_stop(&client).await,
        Commands::Status => cmd_status(&client).await,
        Commands::Ping => cmd_ping(&client).await,
        Commands::Init { upgrade } => cmd_scan(&client, Request::Init { upgrade }).await,
        Commands::Reload { path } => {
            let path = path.map(|p| entry_point(&p)).transpose()?;
            cmd_scan(&client, Request::Reload { path }).await
        }
        Commands::Discover { path } => {
            let path = Some(entry_point(&path)?);
            cmd_scan(&client, Request::Discover { path }).await
        }
        Commands::DiscoverDevice { path } => {
            let path = entry_point(&path)?;
            cmd_scan(&client, Request::DiscoverDevice { path }).await
        }
        Commands::Pause => cmd_scan(&client, Request::PauseScan).await,
        Commands::Resume => cmd_scan(&client, Request::ResumeScan).await,
    }
}

/// Absolute entry point for a path argument; `file://` URIs pass through.
fn entry_point(path: &str) -> Result<String> {
    if path.starts_with("file://") {
        return Ok(path.to_string());
    }
    let resolved = Path::new(path)
        .canonicalize()
        .with_context(|| format!("Invalid path: {}", path))?;
    Ok(resolved.display().to_string())
}

async fn cmd_start(client: &IpcClient, foreground: bool) -> Result<()> {
    if foreground {
        println!("Starting Scanward daemon in foreground...");
        println!("Press Ctrl+C to stop.");

        let status = std::process::Command::new("scanward-daemon")
            .status()
            .context("Failed to start daemon. Is scanward-daemon in PATH?")?;

        if !status.success() {
            anyhow::bail!("Daemon exited with error");
        }
    } else {
        if client.is_daemon_running() {
            println!("Scanward daemon is already running.");
            return Ok(());
        }

        let child = std::process::Command::new("scanward-daemon")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to start daemon")?;

        println!("✓ Scanward daemon started (PID: {})", child.id());
    }

    Ok(())
}

async fn cmd_stop(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("Scanward daemon is not running.");
        return Ok(());
    }

    match client.request(Request::Shutdown).await {
        Ok(Response::Ack) => {
            println!("✓ Scanward daemon stopping...");

            // Wait a moment for the session to release its lock
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;

            if !client.is_daemon_running() {
                println!("✓ Daemon stopped.");
            }
        }
        Ok(resp) => {
            println!("Unexpected response: {:?}", resp);
        }
        Err(e) => {
            println!("Failed to stop daemon: {}", e);
        }
    }

    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("Scanward daemon is not running.");
        println!("\nStart with: scanward start");
        return Ok(());
    }

    match client.get_status().await {
        Ok(ResponseData::Status {
            version,
            uptime_secs,
            session_active,
            indicator,
            parsing_percent,
            current_discovery,
            reload_count,
            pending_operations,
            lock_held,
            pending_devices,
        }) => {
            println!("Scanward Daemon v{}", version);
            println!();
            println!("  Status:     Running");
            println!("  Uptime:     {}", format_duration(uptime_secs));
            println!(
                "  Session:    {}",
                if session_active { "active" } else { "idle" }
            );

            if session_active {
                println!("  Parsing:    {}%", parsing_percent);
                if let Some(path) = current_discovery {
                    println!("  Discovering: {}", path);
                }
                println!("  Reloads:    {}", reload_count);
                println!("  Queued:     {}", pending_operations);
                println!("  Lock:       {}", if lock_held { "held" } else { "released" });
            }

            if let Some(indicator) = indicator {
                println!();
                println!("  {}: {}", indicator.title, indicator.body);
                if let Some(action) = indicator.action {
                    println!("  [{}]", action);
                }
            }

            if !pending_devices.is_empty() {
                println!();
                println!("New storage devices:");
                for path in pending_devices {
                    println!("  {}  (scan with: scanward discover-device {})", path, path);
                }
            }
        }
        Ok(_) => {
            println!("Unexpected status response");
        }
        Err(e) => {
            println!("Failed to get status: {}", e);
        }
    }

    Ok(())
}

async fn cmd_scan(client: &IpcClient, request: Request) -> Result<()> {
    if !client.is_daemon_running() {
        println!("✗ Daemon not running. Start with: scanward start");
        return Ok(());
    }

    match client.call(request).await {
        Ok(Some(ResponseData::Dispatched { command, outcome })) => {
            println!("{}", describe_dispatch(&command, outcome));
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(IpcError::Remote { message, .. }) => {
            println!("✗ {}", message);
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }

    Ok(())
}

fn describe_dispatch(command: &str, outcome: DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Delivered => format!("✓ {} sent to the running scan", command),
        DispatchOutcome::Started => format!("✓ {} started a new scan", command),
        DispatchOutcome::NoSession => format!("• {}: no scan is running", command),
    }
}

async fn cmd_ping(client: &IpcClient) -> Result<()> {
    if !client.is_daemon_running() {
        println!("✗ Daemon not running");
        return Ok(());
    }

    let start = std::time::Instant::now();
    match client.request(Request::Ping).await {
        Ok(Response::Ok {
            data: Some(ResponseData::Pong { .. }),
        }) => {
            let elapsed = start.elapsed();
            println!("✓ Pong! ({:.2}ms)", elapsed.as_secs_f64() * 1000.0);
        }
        Ok(_) => {
            println!("✗ Unexpected response");
        }
        Err(e) => {
            println!("✗ Error: {}", e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_entry_point_resolution() {
        let temp_dir = tempfile::tempdir().unwrap();
        let resolved = entry_point(temp_dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            resolved,
            temp_dir.path().canonicalize().unwrap().display().to_string()
        );

        assert_eq!(
            entry_point("file:///media/usb1").unwrap(),
            "file:///media/usb1"
        );
        assert!(entry_point("/definitely/not/here").is_err());
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["scanward", "init", "--upgrade"]).unwrap();
        assert!(matches!(cli.command, Commands::Init { upgrade: true }));

        let cli = Cli::try_parse_from(["scanward", "reload"]).unwrap();
        assert!(matches!(cli.command, Commands::Reload { path: None }));

        let cli =
            Cli::try_parse_from(["scanward", "--socket", "/tmp/x.sock", "discover-device", "/m"])
                .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert!(matches!(cli.command, Commands::DiscoverDevice { .. }));

        assert!(Cli::try_parse_from(["scanward", "discover"]).is_err());
    }

    #[test]
    fn test_describe_dispatch() {
        assert!(describe_dispatch("pause-scan", DispatchOutcome::NoSession)
            .contains("no scan is running"));
        assert!(describe_dispatch("init", DispatchOutcome::Started).contains("started"));
    }
}
