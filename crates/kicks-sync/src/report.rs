//! # Cycle Reports
//!
//! Every sync cycle produces a [`CycleReport`] instead of scattering log
//! lines: per-entity counts plus one [`SyncFailure`] per record that stayed
//! local. The engine hands finished reports to a [`SyncObserver`].
//!
//! ```text
//!  CycleReport { trigger: Timer, sales: { pushed: 2, pulled: 5, kept_local: 1 },
//!                failures: [ SyncFailure { entity: product, local_id: 7,
//!                                          stage: push, reason: "..." } ] }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use kicks_core::SyncEntity;

use crate::error::SyncError;

// =============================================================================
// Triggers
// =============================================================================

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Once, when the agent starts.
    Startup,
    /// The fixed background timer.
    Timer,
    /// The till window regained focus.
    Focus,
    /// The till screen became visible again.
    Visibility,
    /// An operator asked for it.
    Manual,
    /// Remote endpoint or key changed.
    SettingsChanged,
    /// Disaster-recovery upload.
    ForcePush,
}

/// How much of the remote store a cycle reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullMode {
    /// Every row, in pages.
    Full,
    /// Only the newest window of rows.
    Recent,
}

impl SyncTrigger {
    pub fn pull_mode(&self) -> PullMode {
        match self {
            SyncTrigger::Startup | SyncTrigger::Manual | SyncTrigger::SettingsChanged => PullMode::Full,
            SyncTrigger::Timer | SyncTrigger::Focus | SyncTrigger::Visibility | SyncTrigger::ForcePush => {
                PullMode::Recent
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Timer => "timer",
            SyncTrigger::Focus => "focus",
            SyncTrigger::Visibility => "visibility",
            SyncTrigger::Manual => "manual",
            SyncTrigger::SettingsChanged => "settings_changed",
            SyncTrigger::ForcePush => "force_push",
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Failures
// =============================================================================

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Push,
    Pull,
    Realtime,
    ForcePush,
    /// Best-effort stock mirror from the inventory ledger.
    Mirror,
}

/// One record that could not be reconciled this time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub entity: SyncEntity,
    pub stage: SyncStage,
    pub local_id: Option<i64>,
    pub remote_id: Option<i64>,
    pub reason: String,
    pub retryable: bool,
}

impl SyncFailure {
    pub fn new(entity: SyncEntity, stage: SyncStage, err: &SyncError) -> Self {
        SyncFailure {
            entity,
            stage,
            local_id: None,
            remote_id: None,
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    pub fn local(mut self, id: i64) -> Self {
        self.local_id = Some(id);
        self
    }

    pub fn remote(mut self, id: Option<i64>) -> Self {
        self.remote_id = id;
        self
    }
}

// =============================================================================
// Counts & Report
// =============================================================================

/// Per-entity tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    /// Local records confirmed remotely (insert or update).
    pub pushed: usize,
    /// Remote records written locally.
    pub pulled: usize,
    /// Remote records skipped because the local copy had pending edits.
    pub kept_local: usize,
    /// Mappings recovered by natural key during force push.
    pub healed: usize,
    /// Records force push found already present remotely.
    pub present: usize,
    pub failed: usize,
}

/// Outcome of one push-then-pull pass (or one force push).
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sales: EntityCounts,
    pub products: EntityCounts,
    pub expenses: EntityCounts,
    pub failures: Vec<SyncFailure>,
}

impl CycleReport {
    pub fn new(trigger: SyncTrigger) -> Self {
        CycleReport {
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            sales: EntityCounts::default(),
            products: EntityCounts::default(),
            expenses: EntityCounts::default(),
            failures: Vec::new(),
        }
    }

    pub fn counts(&self, entity: SyncEntity) -> &EntityCounts {
        match entity {
            SyncEntity::Sale => &self.sales,
            SyncEntity::Product => &self.products,
            SyncEntity::Expense => &self.expenses,
        }
    }

    pub fn counts_mut(&mut self, entity: SyncEntity) -> &mut EntityCounts {
        match entity {
            SyncEntity::Sale => &mut self.sales,
            SyncEntity::Product => &mut self.products,
            SyncEntity::Expense => &mut self.expenses,
        }
    }

    /// Records a failure and bumps the entity's `failed` count.
    pub fn fail(&mut self, failure: SyncFailure) {
        self.counts_mut(failure.entity).failed += 1;
        self.failures.push(failure);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_pushed(&self) -> usize {
        self.sales.pushed + self.products.pushed + self.expenses.pushed
    }

    pub fn total_pulled(&self) -> usize {
        self.sales.pulled + self.products.pulled + self.expenses.pulled
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Receives cycle outcomes (status bar, audit log, tests).
pub trait SyncObserver: Send + Sync {
    fn cycle_finished(&self, report: &CycleReport);

    fn cycle_skipped(&self, _trigger: SyncTrigger) {}

    /// Failures outside a cycle (realtime events, stock mirror).
    fn failure(&self, _failure: &SyncFailure) {}
}

/// Writes reports to the tracing log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn cycle_finished(&self, report: &CycleReport) {
        info!(
            trigger = %report.trigger,
            pushed = report.total_pushed(),
            pulled = report.total_pulled(),
            failed = report.failures.len(),
            "Sync cycle finished"
        );
        for failure in &report.failures {
            self.failure(failure);
        }
    }

    fn cycle_skipped(&self, trigger: SyncTrigger) {
        info!(trigger = %trigger, "Sync cycle skipped, another one is running");
    }

    fn failure(&self, failure: &SyncFailure) {
        warn!(
            entity = %failure.entity,
            stage = ?failure.stage,
            local_id = ?failure.local_id,
            remote_id = ?failure.remote_id,
            retryable = failure.retryable,
            reason = %failure.reason,
            "Record stayed local"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_pull_modes() {
        assert_eq!(SyncTrigger::Startup.pull_mode(), PullMode::Full);
        assert_eq!(SyncTrigger::SettingsChanged.pull_mode(), PullMode::Full);
        assert_eq!(SyncTrigger::Timer.pull_mode(), PullMode::Recent);
        assert_eq!(SyncTrigger::Focus.pull_mode(), PullMode::Recent);
    }

    #[test]
    fn test_fail_counts_per_entity() {
        let mut report = CycleReport::new(SyncTrigger::Timer);
        report.fail(SyncFailure::new(SyncEntity::Product, SyncStage::Push, &SyncError::Http("reset".into())).local(7));
        assert_eq!(report.products.failed, 1);
        assert_eq!(report.sales.failed, 0);
        assert!(!report.is_clean());
        assert!(report.failures[0].retryable);
        assert_eq!(report.failures[0].local_id, Some(7));
    }

    #[test]
    fn test_report_serializes() {
        let mut report = CycleReport::new(SyncTrigger::Focus);
        report.finish();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trigger"], "focus");
        assert!(json["finished_at"].is_string());
    }
}
