//! Snapshot primitives: recursive tree copy, directory-to-zip compression,
//! and tree removal.
//!
//! Every function is self-contained; no state is carried across calls. The
//! delete-after-compress ordering lives in the executor, which only removes
//! an uncompressed tree once [`compress_dir`] has returned the archive path.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::utils::errors::{BackupError, Result};

/// Recursively copy the directory tree at `src` into `dst`.
///
/// A missing source is reported as [`BackupError::SourceMissing`] without
/// creating any part of the destination. Symlinks are not followed and not
/// copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(BackupError::SourceMissing(src.to_path_buf()));
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Compress the directory at `dir` into a sibling `<dir>.zip` and return the
/// archive path. The source directory is left in place; on failure the
/// partial archive is removed before the error is returned.
pub fn compress_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(BackupError::SourceMissing(dir.to_path_buf()));
    }

    let archive_path = sibling_archive_path(dir);
    match write_archive(dir, &archive_path) {
        Ok(()) => Ok(archive_path),
        Err(e) => {
            let _ = fs::remove_file(&archive_path);
            Err(e)
        }
    }
}

/// Remove a directory tree. Callers only invoke this on an uncompressed copy
/// after its archive has been written.
pub fn remove_tree(dir: &Path) -> Result<()> {
    fs::remove_dir_all(dir)?;
    Ok(())
}

/// `<dir>.zip` next to `dir`, appending rather than replacing an extension
/// so dotted names survive intact.
fn sibling_archive_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

fn write_archive(dir: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = match entry.path().strip_prefix(dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let name = rel.to_string_lossy().replace('\\', "/");

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(name, options)?;
        } else if file_type.is_file() {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}
