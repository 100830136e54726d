//! Host integration seams.
//!
//! The backup core never talks to a concrete server object. It drives two
//! narrow traits instead: [`Host`] for command dispatch, messaging and target
//! enumeration, and [`HostScheduler`] for moving work on and off the owning
//! tick context. Any embedding adapts to these; [`local`] provides the
//! standalone adapters used by the daemon binary.

pub mod local;

use std::path::PathBuf;

use crate::utils::errors::Result;

/// A unit of work handed to the host scheduler. Fire-and-forget; the core
/// never observes a return value.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// One live data directory eligible for capture in a backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    /// Identifier used for destination naming and skip-list matching.
    pub id: String,

    /// Live directory to copy from.
    pub source: PathBuf,
}

/// Commands and queries the backup core issues against the owning process.
///
/// Every method here must only be called from the owning context; the
/// coordinator guarantees that.
pub trait Host: Send + Sync + 'static {
    /// Dispatch a console command ("save-all", "save-off", "save-on").
    fn dispatch(&self, command: &str) -> Result<()>;

    /// Flush in-memory player/session state to disk.
    fn flush_player_state(&self) -> Result<()>;

    /// Broadcast a message to connected users. Empty messages are a no-op.
    fn broadcast(&self, message: &str);

    /// Number of users currently connected.
    fn online_user_count(&self) -> usize;

    /// Enumerate the live directories eligible for backup.
    fn active_targets(&self) -> Vec<BackupTarget>;
}

/// The host's two-mode task scheduler.
pub trait HostScheduler: Send + Sync + 'static {
    /// Queue a job on a background worker, off the owning context.
    fn schedule_off_context(&self, job: Job);

    /// Queue a job to run on the owning context's next tick.
    fn schedule_on_context(&self, job: Job);
}
