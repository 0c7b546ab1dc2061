use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backup::Backup;
use crate::error::{ApplyError, ProbeError};
use crate::model::{Outcome, ReconciliationResult, RunSummary};

/// Live state of an artifact as reported by a probe.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentState<S> {
    Present(S),
    Absent,
}

pub enum DesiredState<S> {
    Value(S),
    Satisfies {
        description: String,
        predicate: Box<dyn Fn(&S) -> bool>,
    },
}

impl<S: PartialEq + fmt::Debug> DesiredState<S> {
    pub fn satisfies(
        description: impl Into<String>,
        predicate: impl Fn(&S) -> bool + 'static,
    ) -> Self {
        Self::Satisfies {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    /// An absent artifact never satisfies a desired state.
    pub fn is_satisfied_by(&self, current: &CurrentState<S>) -> bool {
        let CurrentState::Present(value) = current else {
            return false;
        };
        match self {
            DesiredState::Value(expected) => expected == value,
            DesiredState::Satisfies { predicate, .. } => predicate(value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DesiredState::Value(expected) => format!("{expected:?}"),
            DesiredState::Satisfies { description, .. } => description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupPolicy {
    None,
    CopyBeforeWrite(PathBuf),
}

pub type ProbeFn<S> = Box<dyn Fn() -> Result<CurrentState<S>, ProbeError>>;
pub type ApplyFn = Box<dyn Fn() -> Result<(), ApplyError>>;

/// One piece of system state to converge. Built fresh for every pass; all
/// knowledge of the live system comes from `probe`.
pub struct ReconciliationTarget<S> {
    name: String,
    probe: ProbeFn<S>,
    desired: DesiredState<S>,
    apply: ApplyFn,
    backup_policy: BackupPolicy,
}

impl<S: PartialEq + fmt::Debug> ReconciliationTarget<S> {
    pub fn new(
        name: impl Into<String>,
        probe: impl Fn() -> Result<CurrentState<S>, ProbeError> + 'static,
        desired: DesiredState<S>,
        apply: impl Fn() -> Result<(), ApplyError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(probe),
            desired,
            apply: Box::new(apply),
            backup_policy: BackupPolicy::None,
        }
    }

    pub fn with_backup(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn probe(&self) -> Result<CurrentState<S>, ProbeError> {
        (self.probe)()
    }

    pub fn desired(&self) -> &DesiredState<S> {
        &self.desired
    }

    pub fn backup_policy(&self) -> &BackupPolicy {
        &self.backup_policy
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    InSync,
    Drifted,
    Unavailable,
    Unknown,
}

/// Result of comparing a target without touching it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drift {
    pub target: String,
    pub status: DriftStatus,
    pub message: String,
}

/// Type-erased target so a pass can mix state types.
pub trait Target {
    fn name(&self) -> &str;
    fn reconcile_with(&self, reconciler: &Reconciler) -> ReconciliationResult;
    fn detect_with(&self, reconciler: &Reconciler) -> Drift;
}

impl<S: PartialEq + fmt::Debug> Target for ReconciliationTarget<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn reconcile_with(&self, reconciler: &Reconciler) -> ReconciliationResult {
        reconciler.reconcile(self)
    }

    fn detect_with(&self, reconciler: &Reconciler) -> Drift {
        reconciler.detect(self)
    }
}

/// Orchestrates probe, compare, backup and apply for single targets.
/// Sequential use only; it holds no state between calls.
pub struct Reconciler {
    backup: Box<dyn Backup>,
}

impl Reconciler {
    pub fn new(backup: Box<dyn Backup>) -> Self {
        Self { backup }
    }

    pub fn reconcile<S: PartialEq + fmt::Debug>(
        &self,
        target: &ReconciliationTarget<S>,
    ) -> ReconciliationResult {
        let name = target.name();
        let desired = target.desired().describe();

        let current = match target.probe() {
            Ok(current) => current,
            Err(err) => return probe_failure_result(name, err),
        };

        if target.desired().is_satisfied_by(&current) {
            debug!(artifact = name, "already in desired state");
            return ReconciliationResult::new(name, Outcome::Skipped, format!("already {desired}"));
        }

        let mut backup_path = None;
        let mut notes = Vec::new();
        if let BackupPolicy::CopyBeforeWrite(path) = target.backup_policy() {
            match self.backup.backup(path) {
                Ok(written) => backup_path = written,
                Err(err) => {
                    warn!(artifact = name, error = %err, "backup failed; continuing");
                    notes.push(format!("backup skipped: {err}"));
                }
            }
        }

        let mut result = match (target.apply)() {
            Ok(()) => {
                info!(artifact = name, desired = %desired, "applied");
                let verb = match current {
                    CurrentState::Absent => "created",
                    CurrentState::Present(_) => "set",
                };
                ReconciliationResult::new(name, Outcome::Applied, format!("{verb} {desired}"))
            }
            Err(err) => {
                warn!(artifact = name, error = %err, "apply failed");
                ReconciliationResult::new(name, Outcome::Failed, err.to_string())
            }
        };
        result.backup = backup_path;
        result.notes = notes;
        result
    }

    pub fn detect<S: PartialEq + fmt::Debug>(&self, target: &ReconciliationTarget<S>) -> Drift {
        let name = target.name().to_string();
        let desired = target.desired().describe();
        match target.probe() {
            Ok(current) if target.desired().is_satisfied_by(&current) => Drift {
                target: name,
                status: DriftStatus::InSync,
                message: format!("already {desired}"),
            },
            Ok(CurrentState::Absent) => Drift {
                target: name,
                status: DriftStatus::Drifted,
                message: format!("absent; would create {desired}"),
            },
            Ok(CurrentState::Present(_)) => Drift {
                target: name,
                status: DriftStatus::Drifted,
                message: format!("would set {desired}"),
            },
            Err(err) if err.is_unavailable() => Drift {
                target: name,
                status: DriftStatus::Unavailable,
                message: err.to_string(),
            },
            Err(err) => Drift {
                target: name,
                status: DriftStatus::Unknown,
                message: err.to_string(),
            },
        }
    }

    /// Reconciles every target in order. A failing target never stops the
    /// ones after it.
    pub fn run_pass(&self, targets: &[Box<dyn Target>]) -> RunSummary {
        let mut summary = RunSummary::new();
        info!(run_id = %summary.run_id, targets = targets.len(), "reconciliation pass started");
        for target in targets {
            summary.record(target.reconcile_with(self));
        }
        info!(
            run_id = %summary.run_id,
            applied = summary.applied,
            skipped = summary.skipped,
            warned = summary.warned,
            failed = summary.failed,
            "reconciliation pass finished"
        );
        summary
    }

    pub fn detect_pass(&self, targets: &[Box<dyn Target>]) -> Vec<Drift> {
        targets
            .iter()
            .map(|target| target.detect_with(self))
            .collect()
    }
}

fn probe_failure_result(name: &str, err: ProbeError) -> ReconciliationResult {
    if err.is_unavailable() {
        debug!(artifact = name, error = %err, "prerequisite missing");
        return ReconciliationResult::new(name, Outcome::Skipped, err.to_string());
    }
    warn!(artifact = name, error = %err, "cannot determine current state; leaving untouched");
    ReconciliationResult::new(name, Outcome::Warned, format!("left unchanged: {err}"))
}
