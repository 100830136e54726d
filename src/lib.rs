//! Backup Warden Library
//!
//! Two-phase backup pipeline for a running server's live directories:
//! quiesce writers on the owning tick context, copy and optionally zip each
//! target on a background worker, prune entries past the retention cap, then
//! resume writers back on the owning context.

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod fs;
pub mod host;
pub mod naming;
pub mod retention;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{BackupCoordinator, Phase, Trigger};
pub use executor::{BackupExecutor, BackupRequest, BackupResult, RunStatus};
pub use host::{BackupTarget, Host, HostScheduler, Job};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
