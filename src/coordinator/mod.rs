//! The two-phase backup state machine.
//!
//! One cycle is `Idle -> Preparing -> Copying -> Finishing -> Idle`.
//! `Preparing` and `Finishing` run on the owning context because they drive
//! host commands and broadcasts; `Copying` runs on a background worker so
//! the tick loop never blocks on directory I/O. At most one run is ever in
//! flight: a trigger arriving mid-run is queued and replayed once the
//! coordinator returns to `Idle`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::executor::{BackupExecutor, BackupRequest, BackupResult, RunStatus};
use crate::host::{Host, HostScheduler};
use crate::naming;
use crate::utils::errors::Result;

/// Coordinator phase. Transitions only happen on the owning context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Preparing,
    Copying,
    Finishing,
}

/// One backup trigger. Manual parameters travel inside the trigger value
/// rather than through shared mutable fields, so nothing leaks into the
/// next cycle.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub manual: bool,
    pub label: Option<String>,
}

impl Trigger {
    /// Interval-driven trigger, subject to the users-online gate.
    pub fn scheduled() -> Self {
        Self {
            manual: false,
            label: None,
        }
    }

    /// Operator-issued trigger; always proceeds.
    pub fn manual(label: Option<String>) -> Self {
        Self {
            manual: true,
            label,
        }
    }
}

pub struct BackupCoordinator {
    config: Config,
    host: Arc<dyn Host>,
    scheduler: Arc<dyn HostScheduler>,
    executor: Arc<BackupExecutor>,
    phase: Mutex<Phase>,
    /// A single queued trigger; later arrivals while one is queued are dropped.
    pending: Mutex<Option<Trigger>>,
    /// Handle to ourselves for the cross-context hand-offs.
    me: Weak<Self>,
}

impl BackupCoordinator {
    pub fn new(
        config: Config,
        host: Arc<dyn Host>,
        scheduler: Arc<dyn HostScheduler>,
    ) -> Arc<Self> {
        let executor = Arc::new(BackupExecutor::new(&config.backup));
        Arc::new_cyclic(|me| Self {
            config,
            host,
            scheduler,
            executor,
            phase: Mutex::new(Phase::Idle),
            pending: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }

    /// Accept a trigger. Must be called on the owning context.
    ///
    /// A trigger while a run is in flight is queued (capacity one) rather
    /// than started, since concurrent copies of the same directories produce
    /// corrupt archives. Scheduled triggers are dropped when the
    /// users-online gate is closed; manual triggers always proceed.
    pub fn trigger(&self, trigger: Trigger) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase != Phase::Idle {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                if pending.is_none() {
                    info!(phase = ?*phase, "Backup already in flight, queuing trigger");
                    *pending = Some(trigger);
                } else {
                    debug!("A trigger is already queued, dropping this one");
                }
                return;
            }

            if !trigger.manual
                && self.config.backup.only_with_users
                && self.host.online_user_count() == 0
            {
                info!("No users online, skipping scheduled backup");
                return;
            }

            *phase = Phase::Preparing;
        }

        self.prepare(trigger);
    }

    /// `Preparing`: quiesce writers, freeze the target list, hand off to the
    /// background copy phase. Runs on the owning context.
    fn prepare(&self, trigger: Trigger) {
        if !self.config.messages.started.trim().is_empty() {
            self.host.broadcast(&self.config.messages.started);
        }

        // Auto-save must be off before any file is copied, otherwise the
        // copies may catch files mid-write.
        if let Err(e) = self.quiesce() {
            error!(error = %e, "Failed to quiesce host, aborting backup run");
            self.finish(BackupResult::aborted());
            return;
        }

        let skip: HashSet<&str> = self.config.backup.skip.iter().map(String::as_str).collect();
        if !skip.is_empty() {
            info!(skipped = ?self.config.backup.skip, "Targets excluded from backup");
        }
        let targets: Vec<_> = self
            .host
            .active_targets()
            .into_iter()
            .filter(|t| !t.id.is_empty() && !skip.contains(t.id.as_str()))
            .collect();

        // A label must stay a single path component under custom/, else the
        // snapshot (and the zip-mode delete) would land outside the root.
        let label = trigger.label.filter(|label| {
            if naming::is_safe_label(label) {
                true
            } else {
                warn!(label = %label, "Unsafe backup label ignored, using dated name");
                false
            }
        });

        let request = BackupRequest {
            label,
            targets,
            manual: trigger.manual,
        };

        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            *phase = Phase::Copying;
        }

        let me = self.me.clone();
        let executor = Arc::clone(&self.executor);
        let scheduler = Arc::clone(&self.scheduler);
        self.scheduler.schedule_off_context(Box::new(move || {
            let result = executor.run(request);
            // Writers must be resumed no matter how the run went, so the
            // finish hand-off is unconditional.
            scheduler.schedule_on_context(Box::new(move || {
                if let Some(coordinator) = me.upgrade() {
                    coordinator.finish(result);
                }
            }));
        }));
    }

    fn quiesce(&self) -> Result<()> {
        self.host.dispatch("save-all")?;
        self.host.dispatch("save-off")?;
        self.host.flush_player_state()
    }

    /// `Finishing`: resume writers and report. Runs on the owning context
    /// for every outcome, including aborted runs.
    fn finish(&self, result: BackupResult) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            *phase = Phase::Finishing;
        }

        if self.config.backup.reenable_autosave {
            if let Err(e) = self.host.dispatch("save-on") {
                error!(error = %e, "Failed to re-enable auto-save");
            }
        }

        match result.status {
            RunStatus::Completed => info!(
                copied = result.targets_copied,
                skipped = result.targets_skipped,
                pruned = result.entries_deleted,
                duration_ms = result.duration.as_millis() as u64,
                "Backup run completed"
            ),
            RunStatus::PartiallyFailed => warn!(
                copied = result.targets_copied,
                skipped = result.targets_skipped,
                pruned = result.entries_deleted,
                "Backup run partially failed"
            ),
            RunStatus::Aborted => error!("Backup run aborted before copying"),
        }

        if !self.config.messages.finished.trim().is_empty() {
            self.host.broadcast(&self.config.messages.finished);
        }

        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            *phase = Phase::Idle;
        }

        let queued = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(trigger) = queued {
            info!("Replaying queued backup trigger");
            self.trigger(trigger);
        }
    }
}
