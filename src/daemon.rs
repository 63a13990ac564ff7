//! Foreground watch daemon.
//!
//! Keeps the bookmark watcher running until SIGINT or SIGTERM, restarting its
//! loop whenever bookmarks change. A PID file guards against two instances
//! writing the same database.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::{AppContext, ChanError, Result};

/// Parse interval string like "30s", "1m", "2h"
pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map(|h| h * 3600)
            .map_err(|_| format!("Invalid hours: {}", hours))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map(|m| m * 60)
            .map_err(|_| format!("Invalid minutes: {}", minutes))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '30s', '1m', '2h'", s))
    }
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Holds the PID file for the lifetime of the daemon; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn default_path() -> Option<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("chanwatch").join("watch.pid"))
    }

    /// Fails when the file names a live process. Stale files are replaced.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(pid) = Self::read_pid(path) {
            if process_exists(pid) {
                return Err(ChanError::Other(format!(
                    "Another watcher is already running (PID {})",
                    pid
                )));
            }
            debug!("Replacing stale PID file for {}", pid);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_pid(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid)])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(windows)]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Daemon runner
pub struct Daemon {
    ctx: Arc<AppContext>,
    pid_path: Option<PathBuf>,
}

impl Daemon {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            pid_path: PidFile::default_path(),
        }
    }

    pub fn with_pid_path(mut self, path: PathBuf) -> Self {
        self.pid_path = Some(path);
        self
    }

    /// Runs until a shutdown signal arrives. The context must be initialized.
    pub async fn run(&self) -> Result<()> {
        let _pid_file = match &self.pid_path {
            Some(path) => Some(PidFile::acquire(path)?),
            None => {
                warn!("No PID file location, running without single-instance guard");
                None
            }
        };

        if !self.ctx.config.watcher.enabled {
            warn!("Bookmark watching is disabled in the configuration");
        }

        let watcher = self.ctx.bookmark_watcher();
        let mut changes = self.ctx.bookmarks_manager.listen_for_bookmarks_changes();

        info!(
            "Watching {} bookmarks (base interval: {}, PID: {})",
            self.ctx.bookmarks_manager.active_bookmarks_count(),
            format_interval(self.ctx.config.watcher.foreground_interval_ms / 1000),
            std::process::id()
        );
        watcher.start_watching();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    watcher.start_watching();
                }
            }
        }

        info!("Watcher shutting down...");
        watcher.stop_watching();
        self.ctx.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("30m").unwrap(), 1800);
        assert_eq!(parse_interval("45s").unwrap(), 45);
        assert_eq!(parse_interval("90").unwrap(), 90);
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(3600), "1h");
        assert_eq!(format_interval(1800), "30m");
        assert_eq!(format_interval(30), "30s");
        assert_eq!(format_interval(90), "90s");
    }

    #[cfg(unix)]
    #[test]
    fn test_pid_file_guards_single_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("watch.pid");

        let pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(PidFile::read_pid(&path), Some(std::process::id()));
        assert!(PidFile::acquire(&path).is_err());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.pid");
        fs::write(&path, "4000000000\n").unwrap();

        let _pid_file = PidFile::acquire(&path).unwrap();
        assert_eq!(PidFile::read_pid(&path), Some(std::process::id()));
    }
}
