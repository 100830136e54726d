//! Custom error types for the backup pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source directory not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Host dispatch failed: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
