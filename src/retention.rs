//! Retention policy over the backup root.
//!
//! Entries are discovered by listing the root on every run; there is no
//! persisted index. Identity is the path, recency is the filesystem
//! modification time. The plan keeps the `max` most recently modified
//! entries and marks everything else for deletion.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

/// One completed backup as it exists on disk: a snapshot directory or a
/// zipped archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Outcome of planning retention over one listing.
#[derive(Debug, Default)]
pub struct RetentionDecision {
    pub keep: Vec<BackupEntry>,
    pub delete: Vec<BackupEntry>,
}

/// List every entry in the backup root. All entries are retention candidates;
/// no embedded metadata is trusted.
pub fn list_entries(root: &Path) -> std::io::Result<Vec<BackupEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let modified = entry
            .metadata()?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(BackupEntry {
            path: entry.path(),
            modified,
        });
    }
    Ok(entries)
}

/// Decide which entries to keep. The `max` most recently modified entries
/// survive; timestamp ties go to the first-listed entry. Selection is done
/// by repeated newest-pick rather than a sort, so the tie-break is stable.
///
/// `max == 0` keeps nothing; configuration validation clamps `max_backups`
/// to at least 1 so this crate never passes 0.
pub fn plan(entries: Vec<BackupEntry>, max: usize) -> RetentionDecision {
    if entries.len() <= max {
        return RetentionDecision {
            keep: entries,
            delete: Vec::new(),
        };
    }

    let mut remaining = entries;
    let mut keep = Vec::with_capacity(max);
    for _ in 0..max {
        let mut newest = 0;
        for (i, candidate) in remaining.iter().enumerate().skip(1) {
            if candidate.modified > remaining[newest].modified {
                newest = i;
            }
        }
        keep.push(remaining.remove(newest));
    }

    RetentionDecision {
        keep,
        delete: remaining,
    }
}

/// Delete every entry marked for removal, independently. A failure on one
/// entry (including an entry that vanished since listing) is logged and
/// never stops the remaining deletions. Returns the number actually deleted.
pub fn apply(decision: &RetentionDecision) -> usize {
    let mut deleted = 0;
    for entry in &decision.delete {
        let result = if entry.path.is_dir() {
            fs::remove_dir_all(&entry.path)
        } else {
            fs::remove_file(&entry.path)
        };
        match result {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Failed to delete expired backup");
            }
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(name: &str, secs: u64) -> BackupEntry {
        BackupEntry {
            path: PathBuf::from(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_under_limit_keeps_all() {
        let entries = vec![entry("a", 1), entry("b", 2)];
        let decision = plan(entries.clone(), 5);
        assert_eq!(decision.keep, entries);
        assert!(decision.delete.is_empty());
    }

    #[test]
    fn test_over_limit_deletes_oldest() {
        let entries = vec![
            entry("old1", 10),
            entry("new1", 50),
            entry("old2", 20),
            entry("new2", 40),
            entry("new3", 30),
        ];
        let decision = plan(entries, 3);

        let kept: Vec<&str> = decision.keep.iter().map(|e| e.path.to_str().unwrap()).collect();
        let dropped: Vec<&str> = decision.delete.iter().map(|e| e.path.to_str().unwrap()).collect();
        assert_eq!(kept, vec!["new1", "new2", "new3"]);
        assert_eq!(dropped, vec!["old1", "old2"]);
    }

    #[test]
    fn test_partition_is_exact() {
        let entries: Vec<BackupEntry> =
            (0..7).map(|i| entry(&format!("e{i}"), i * 10)).collect();
        let decision = plan(entries.clone(), 4);

        assert_eq!(decision.keep.len(), 4);
        assert_eq!(decision.delete.len(), 3);
        let oldest_kept = decision.keep.iter().map(|e| e.modified).min().unwrap();
        let newest_dropped = decision.delete.iter().map(|e| e.modified).max().unwrap();
        assert!(oldest_kept >= newest_dropped);
        for e in &entries {
            let in_keep = decision.keep.contains(e);
            let in_delete = decision.delete.contains(e);
            assert!(in_keep ^ in_delete);
        }
    }

    #[test]
    fn test_ties_go_to_first_listed() {
        let entries = vec![entry("first", 10), entry("second", 10), entry("third", 10)];
        let decision = plan(entries, 2);

        let kept: Vec<&str> = decision.keep.iter().map(|e| e.path.to_str().unwrap()).collect();
        assert_eq!(kept, vec!["first", "second"]);
        assert_eq!(decision.delete[0].path, PathBuf::from("third"));
    }

    #[test]
    fn test_plan_is_idempotent() {
        let entries: Vec<BackupEntry> =
            (0..6).map(|i| entry(&format!("e{i}"), 100 - i * 7)).collect();
        let first = plan(entries.clone(), 3);
        let second = plan(entries, 3);
        assert_eq!(first.keep, second.keep);
        assert_eq!(first.delete, second.delete);
    }

    #[test]
    fn test_max_zero_keeps_nothing() {
        let decision = plan(vec![entry("a", 1)], 0);
        assert!(decision.keep.is_empty());
        assert_eq!(decision.delete.len(), 1);
    }

    #[test]
    fn test_apply_tolerates_vanished_entry() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        fs::create_dir(&real).unwrap();

        let decision = RetentionDecision {
            keep: Vec::new(),
            delete: vec![
                BackupEntry {
                    path: temp_dir.path().join("vanished"),
                    modified: SystemTime::UNIX_EPOCH,
                },
                BackupEntry {
                    path: real.clone(),
                    modified: SystemTime::UNIX_EPOCH,
                },
            ],
        };

        assert_eq!(apply(&decision), 1);
        assert!(!real.exists());
    }

    #[test]
    fn test_list_entries_sees_dirs_and_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("05012024-010101")).unwrap();
        fs::write(temp_dir.path().join("06012024-010101.zip"), b"zip").unwrap();

        let entries = list_entries(temp_dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
