use std::fs::OpenOptions;

use anyhow::Result;
use tracing_appender::non_blocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use seedsync_core::config::{self, Config};
use seedsync_core::engine::{EngineDriver, RealPtySpawner};
use seedsync_core::installer::{HelperInstaller, HelperPaths};
use seedsync_core::scanner::RemoteScanner;
use seedsync_core::transport::{Ssh2Shell, ShellTransport};

fn main() -> Result<()> {
    let config = Config::load();
    init_tracing();

    if config.remote_address.is_empty() {
        eprintln!(
            "no remote configured yet; edit {}",
            config::config_dir().join("config.json").display()
        );
        return Ok(());
    }

    let shell = Ssh2Shell::connect(&config.remote_address, config.remote_port, &config.remote_user)?;
    let mut transport = ShellTransport::new(shell, config.remote_user.clone(), config.remote_address.clone());

    let mut installer = HelperInstaller::new(&mut transport);
    let paths = HelperPaths {
        native_local: config.native_helper_path.clone(),
        native_remote: config.remote_helper_install_path.clone(),
        portable_local: config.portable_helper_path.clone(),
        portable_remote: format!("{}.py", config.remote_helper_install_path),
    };
    installer.install(&paths, md5_hex_digest)?;
    drop(installer);

    let mut scanner = RemoteScanner::new(&mut transport, &config.remote_helper_install_path, &config.scan_root);
    let entries = match scanner.scan() {
        Ok(entries) => {
            tracing::info!(count = entries.len(), "scan complete");
            println!("scanned {} top-level entries under {}", entries.len(), config.scan_root);
            entries
        }
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            eprintln!("scan failed: {e}");
            return Ok(());
        }
    };

    let Some(first) = entries.first() else {
        println!("nothing to queue, remote root is empty");
        return Ok(());
    };

    let spawner = RealPtySpawner { engine_binary: config.engine_binary_path.to_string_lossy().into_owned() };
    let mut engine = EngineDriver::spawn(spawner, config.remote_user.clone(), config.remote_address.clone())?;
    let local_dir = config.local_download_dir.to_string_lossy().into_owned();
    engine.queue(&config.scan_root, &first.name, &local_dir, first.is_dir)?;
    match engine.status() {
        Ok(jobs) => {
            tracing::info!(jobs = jobs.len(), "queued transfer and fetched engine status");
            println!("queued {} ({} job(s) now tracked by the engine)", first.name, jobs.len());
        }
        Err(e) => {
            tracing::error!(error = %e, "could not read engine status after queuing");
            eprintln!("queued {} but could not read engine status: {e}", first.name);
        }
    }

    Ok(())
}

/// Digests the local helper binary the same way `md5sum` would, so it can
/// be compared against the remote copy's digest before deciding whether to
/// re-upload it.
fn md5_hex_digest(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn init_tracing() {
    let logs_dir = config::config_dir().join("logs");
    let _ = std::fs::create_dir_all(&logs_dir);
    let log_path = logs_dir.join("debug.log");

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let (writer, guard) = non_blocking(file);
            let _ = Box::leak(Box::new(guard));
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_filter(EnvFilter::new("info"));
            tracing_subscriber::registry().with(layer).init();
        }
        Err(e) => {
            eprintln!("warning: could not open debug log at {}: {}", log_path.display(), e);
        }
    }
}
