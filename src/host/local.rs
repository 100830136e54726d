//! Standalone host adapters for the daemon binary.
//!
//! When backup-warden runs as its own process there is no game server to
//! drive: [`LocalHost`] resolves targets from a plain data directory and
//! turns commands and broadcasts into log lines, and [`TickScheduler`] maps
//! the two scheduling modes onto the binary's tokio event loop.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::{BackupTarget, Host, HostScheduler, Job};
use crate::utils::errors::Result;

/// Host adapter over a local data directory. Every immediate subdirectory is
/// one backup target, identified by its directory name.
pub struct LocalHost {
    data_dir: PathBuf,
}

impl LocalHost {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

impl Host for LocalHost {
    fn dispatch(&self, command: &str) -> Result<()> {
        // Standalone runs have no console to drive; quiesce commands are
        // satisfied trivially because nothing else writes the data dir.
        debug!(command, "Host command dispatched");
        Ok(())
    }

    fn flush_player_state(&self) -> Result<()> {
        Ok(())
    }

    fn broadcast(&self, message: &str) {
        if !message.is_empty() {
            info!(message, "Broadcast");
        }
    }

    fn online_user_count(&self) -> usize {
        0
    }

    fn active_targets(&self) -> Vec<BackupTarget> {
        let mut targets = Vec::new();
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.data_dir.display(), error = %e, "Failed to enumerate targets");
                return targets;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    targets.push(BackupTarget {
                        id: name.to_string(),
                        source: path.clone(),
                    });
                }
            }
        }
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }
}

/// Scheduler backed by the daemon's own event loop: off-context jobs run on
/// tokio's blocking pool, on-context jobs are queued to the loop's channel
/// and executed between ticks.
pub struct TickScheduler {
    on_context: UnboundedSender<Job>,
}

impl TickScheduler {
    pub fn new(on_context: UnboundedSender<Job>) -> Self {
        Self { on_context }
    }
}

impl HostScheduler for TickScheduler {
    fn schedule_off_context(&self, job: Job) {
        tokio::task::spawn_blocking(job);
    }

    fn schedule_on_context(&self, job: Job) {
        if self.on_context.send(job).is_err() {
            warn!("Owning loop is gone, dropping on-context job");
        }
    }
}
