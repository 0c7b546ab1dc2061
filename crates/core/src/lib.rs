pub mod backup;
pub mod checks;
pub mod collector;
pub mod diagnostics;
pub mod doctor;
pub mod error;
pub mod formats;
pub mod host;
pub mod lock;
pub mod markdown;
pub mod model;
pub mod plan;
pub mod profile;
pub mod reconcile;
pub mod targets;

pub use backup::{Backup, NoBackup, TimestampedCopy};
pub use checks::{build_checks, human_bytes};
pub use collector::{AbsencePolicy, DiagnosticCheck, DiagnosticCollector, Finding};
pub use diagnostics::{build_diagnostics_bundle, write_diagnostics_bundle, DiagnosticsBundle};
pub use doctor::{collect_host_info, DiskSummary, HostInfo};
pub use error::{ApplyError, BackupError, ProbeError};
pub use host::Host;
pub use lock::{PassLock, DEFAULT_LOCK_PATH};
pub use markdown::{render_diagnostic_markdown, render_drift_markdown, render_run_markdown};
pub use model::{
    DiagnosticReport, DiagnosticResult, Outcome, ReconciliationResult, RunSummary, Severity,
    REPORT_VERSION,
};
pub use plan::build_targets;
pub use profile::{DataMount, Profile, Thresholds};
pub use reconcile::{
    BackupPolicy, CurrentState, DesiredState, Drift, DriftStatus, ReconciliationTarget,
    Reconciler, Target,
};
