//! Backup executor - the off-context half of the pipeline.
//!
//! Runs the copy, compress, and prune steps for one [`BackupRequest`]. It
//! never touches host state: everything it needs was frozen into the request
//! while the owning context was quiesced, and its only outputs are files
//! under the backup root plus a [`BackupResult`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::fs::archive;
use crate::host::BackupTarget;
use crate::naming::SnapshotNamer;
use crate::retention;
use crate::utils::errors::BackupError;

/// One backup run's frozen inputs. Built at the end of `Preparing`,
/// consumed exactly once, never persisted.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Label for a manual run; snapshots land under `custom/<label>`.
    pub label: Option<String>,

    /// Targets resolved from the live listing minus the skip list.
    pub targets: Vec<BackupTarget>,

    /// Whether this run was triggered by an operator.
    pub manual: bool,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step succeeded.
    Completed,
    /// At least one target or step failed; whatever could be captured was.
    PartiallyFailed,
    /// Quiescing failed before any copying started.
    Aborted,
}

/// Backup execution result carried back to the owning context.
#[derive(Debug, Clone)]
pub struct BackupResult {
    pub status: RunStatus,
    pub targets_copied: usize,
    pub targets_skipped: usize,
    pub entries_deleted: usize,
    pub duration: Duration,
}

impl BackupResult {
    /// Result for a run that never reached the copy phase.
    pub fn aborted() -> Self {
        Self {
            status: RunStatus::Aborted,
            targets_copied: 0,
            targets_skipped: 0,
            entries_deleted: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Running tally for one backup run.
#[derive(Debug, Default)]
struct RunStats {
    copied: usize,
    skipped: usize,
    partial: bool,
}

/// Main backup executor
pub struct BackupExecutor {
    config: BackupConfig,
    namer: SnapshotNamer,
}

impl BackupExecutor {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            namer: SnapshotNamer::new(config.date_format.clone()),
            config: config.clone(),
        }
    }

    /// Execute one backup run. Must be called off the owning context; every
    /// failure degrades to a warning or a partial result, never a panic, so
    /// the resume hand-off that follows this call always happens.
    pub fn run(&self, request: BackupRequest) -> BackupResult {
        let started = Instant::now();
        let now = Local::now().naive_local();
        let mut stats = RunStats::default();

        info!(
            targets = request.targets.len(),
            manual = request.manual,
            aggregate = self.config.aggregate,
            "Starting backup run"
        );

        if self.config.aggregate {
            self.run_aggregated(&request, now, &mut stats);
        } else {
            self.run_per_target(&request, now, &mut stats);
        }

        let entries_deleted = self.prune();

        let status = if stats.partial {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };

        BackupResult {
            status,
            targets_copied: stats.copied,
            targets_skipped: stats.skipped,
            entries_deleted,
            duration: started.elapsed(),
        }
    }

    /// Aggregated mode: all targets for the run share one dated (or labeled)
    /// parent directory, optionally zipped as a whole.
    fn run_aggregated(
        &self,
        request: &BackupRequest,
        now: chrono::NaiveDateTime,
        stats: &mut RunStats,
    ) {
        let name = self.namer.run_name(now, request.label.as_deref());
        if name.used_fallback {
            warn!(
                configured = %self.config.date_format,
                "Invalid date format, using fallback"
            );
        }
        let dest = self.config.root.join(&name.value);

        if let Err(e) = fs::create_dir_all(&dest) {
            warn!(dest = %dest.display(), error = %e, "Failed to create snapshot directory");
            stats.partial = true;
            return;
        }

        for target in &request.targets {
            self.copy_into(&target.source, &dest.join(&target.id), &target.id, stats);
        }

        if self.config.include_plugins {
            self.copy_into(&self.config.plugins_dir, &dest.join("plugins"), "plugins", stats);
        }

        if self.config.zip {
            self.compress_and_remove(&dest, stats);
        }
    }

    /// Per-target mode: each target is copied and optionally zipped
    /// independently, so one failure never affects its siblings.
    fn run_per_target(
        &self,
        request: &BackupRequest,
        now: chrono::NaiveDateTime,
        stats: &mut RunStats,
    ) {
        if self.config.include_targets {
            for target in &request.targets {
                let name = self.namer.target_name(&target.id, now);
                if name.used_fallback {
                    warn!(
                        configured = %self.config.date_format,
                        "Invalid date format, using fallback"
                    );
                }
                self.snapshot_one(
                    &target.source,
                    &self.config.root.join(&name.value),
                    &target.id,
                    stats,
                );
            }
        } else {
            info!("Target backup is disabled");
        }

        if self.config.include_plugins {
            let name = self.namer.target_name("plugins", now);
            self.snapshot_one(
                &self.config.plugins_dir,
                &self.config.root.join(&name.value),
                "plugins",
                stats,
            );
        } else {
            info!("Plugin backup is disabled");
        }
    }

    /// Copy one source into a destination, then zip and remove that single
    /// destination if compression is enabled.
    fn snapshot_one(&self, src: &Path, dest: &Path, id: &str, stats: &mut RunStats) {
        if !self.copy_into(src, dest, id, stats) {
            return;
        }
        if self.config.zip {
            self.compress_and_remove(dest, stats);
        }
    }

    /// Copy a tree, classifying the failure modes: a vanished source is
    /// skipped with a warning, any other I/O error marks the run partial.
    /// Returns whether the copy landed.
    fn copy_into(&self, src: &Path, dest: &Path, id: &str, stats: &mut RunStats) -> bool {
        match archive::copy_tree(src, dest) {
            Ok(()) => {
                stats.copied += 1;
                true
            }
            Err(BackupError::SourceMissing(path)) => {
                warn!(target = id, path = %path.display(), "Source vanished, skipping target");
                stats.skipped += 1;
                false
            }
            Err(e) => {
                warn!(target = id, error = %e, "Failed to copy target, continuing");
                stats.partial = true;
                false
            }
        }
    }

    /// Zip a snapshot directory and remove the uncompressed copy. The copy
    /// is only deleted after the archive was fully written; a compression
    /// failure leaves it in place.
    fn compress_and_remove(&self, dest: &Path, stats: &mut RunStats) {
        match archive::compress_dir(dest) {
            Ok(archive_path) => {
                info!(archive = %archive_path.display(), "Snapshot compressed");
                if let Err(e) = archive::remove_tree(dest) {
                    warn!(dest = %dest.display(), error = %e, "Failed to remove uncompressed snapshot");
                    stats.partial = true;
                }
            }
            Err(e) => {
                warn!(
                    dest = %dest.display(),
                    error = %e,
                    "Compression failed, keeping uncompressed snapshot"
                );
                stats.partial = true;
            }
        }
    }

    /// Prune the backup root down to the configured retention cap. The
    /// listing is taken fresh on every run; a listing failure is a warning,
    /// not fatal.
    fn prune(&self) -> usize {
        let entries = match retention::list_entries(&self.config.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.config.root.display(), error = %e, "Failed to list backup root, skipping prune");
                return 0;
            }
        };

        let decision = retention::plan(entries, self.config.max_backups as usize);
        if decision.delete.is_empty() {
            return 0;
        }

        let doomed: Vec<PathBuf> = decision.delete.iter().map(|e| e.path.clone()).collect();
        info!(count = doomed.len(), ?doomed, "Removing expired backups");
        retention::apply(&decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> BackupConfig {
        let mut config = Config::default().backup;
        config.root = root.to_path_buf();
        config.zip = false;
        config
    }

    fn make_target(dir: &Path, id: &str) -> BackupTarget {
        let source = dir.join(id);
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("level.dat"), id.as_bytes()).unwrap();
        BackupTarget {
            id: id.to_string(),
            source,
        }
    }

    fn request(targets: Vec<BackupTarget>, label: Option<&str>) -> BackupRequest {
        BackupRequest {
            label: label.map(String::from),
            targets,
            manual: label.is_some(),
        }
    }

    #[test]
    fn test_aggregated_labeled_run() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let targets = vec![make_target(&data, "world"), make_target(&data, "world_nether")];

        let executor = BackupExecutor::new(&test_config(&root));
        let result = executor.run(request(targets, Some("pre-update")));

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.targets_copied, 2);
        assert!(root.join("custom/pre-update/world/level.dat").is_file());
        assert!(root.join("custom/pre-update/world_nether/level.dat").is_file());
    }

    #[test]
    fn test_per_target_run_produces_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let targets = vec![make_target(&data, "world"), make_target(&data, "world_nether")];

        let mut config = test_config(&root);
        config.aggregate = false;
        let executor = BackupExecutor::new(&config);
        let result = executor.run(request(targets, None));

        assert_eq!(result.status, RunStatus::Completed);
        let entries: Vec<String> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|n| n.starts_with("world-")));
        assert!(entries.iter().any(|n| n.starts_with("world_nether-")));
    }

    #[test]
    fn test_vanished_target_is_skipped_not_partial() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let mut targets = vec![make_target(&data, "world")];
        targets.push(BackupTarget {
            id: "ghost".to_string(),
            source: data.join("ghost"),
        });

        let executor = BackupExecutor::new(&test_config(&root));
        let result = executor.run(request(targets, Some("snap")));

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.targets_copied, 1);
        assert_eq!(result.targets_skipped, 1);
        assert!(root.join("custom/snap/world").is_dir());
        assert!(!root.join("custom/snap/ghost").exists());
    }

    #[test]
    fn test_zip_replaces_directory() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let targets = vec![make_target(&data, "world")];

        let mut config = test_config(&root);
        config.zip = true;
        let executor = BackupExecutor::new(&config);
        let result = executor.run(request(targets, Some("snap")));

        assert_eq!(result.status, RunStatus::Completed);
        assert!(root.join("custom/snap.zip").is_file());
        assert!(!root.join("custom/snap").exists());
    }

    #[test]
    fn test_compress_failure_keeps_directory_and_marks_partial() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let targets = vec![make_target(&data, "world")];

        // A directory squatting on the archive path forces the zip to fail.
        fs::create_dir_all(root.join("custom/snap.zip")).unwrap();

        let mut config = test_config(&root);
        config.zip = true;
        let executor = BackupExecutor::new(&config);
        let result = executor.run(request(targets, Some("snap")));

        assert_eq!(result.status, RunStatus::PartiallyFailed);
        assert!(root.join("custom/snap/world/level.dat").is_file());
    }

    #[test]
    fn test_prune_respects_max_backups() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        fs::create_dir_all(&root).unwrap();
        for i in 0..4 {
            fs::create_dir_all(root.join(format!("0{i}012024-000000"))).unwrap();
        }
        let targets = vec![make_target(&data, "world")];

        let mut config = test_config(&root);
        config.max_backups = 3;
        let executor = BackupExecutor::new(&config);
        let result = executor.run(request(targets, None));

        assert_eq!(result.entries_deleted, 2);
        assert_eq!(fs::read_dir(&root).unwrap().count(), 3);
    }

    #[test]
    fn test_plugins_copied_in_aggregated_mode() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let root = temp_dir.path().join("backups");
        let plugins = temp_dir.path().join("plugins");
        fs::create_dir_all(&plugins).unwrap();
        fs::write(plugins.join("warden.jar"), b"jar").unwrap();
        let targets = vec![make_target(&data, "world")];

        let mut config = test_config(&root);
        config.include_plugins = true;
        config.plugins_dir = plugins;
        let executor = BackupExecutor::new(&config);
        let result = executor.run(request(targets, Some("snap")));

        assert_eq!(result.status, RunStatus::Completed);
        assert!(root.join("custom/snap/plugins/warden.jar").is_file());
    }
}
