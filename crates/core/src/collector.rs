use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::model::{DiagnosticReport, DiagnosticResult, Severity};

/// What a probe concluded about the live system.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Pass,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fail,
            message: message.into(),
        }
    }
}

/// How a probe error is graded when the inspected subsystem is missing or
/// cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsencePolicy {
    Optional,
    Required,
}

impl AbsencePolicy {
    fn severity(self) -> Severity {
        match self {
            AbsencePolicy::Optional => Severity::Warn,
            AbsencePolicy::Required => Severity::Fail,
        }
    }
}

pub type CheckProbe = Box<dyn Fn() -> Result<Finding, ProbeError>>;

/// A named read-only probe.
pub struct DiagnosticCheck {
    name: String,
    category: String,
    probe: CheckProbe,
    remediation: Option<String>,
    absence: AbsencePolicy,
}

impl DiagnosticCheck {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        probe: impl Fn() -> Result<Finding, ProbeError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            probe: Box::new(probe),
            remediation: None,
            absence: AbsencePolicy::Optional,
        }
    }

    pub fn remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.absence = AbsencePolicy::Required;
        self
    }

    pub fn absence(mut self, policy: AbsencePolicy) -> Self {
        self.absence = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// Runs checks in registration order. Holds no state between runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticCollector;

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self
    }

    /// Every check is attempted exactly once; a failing or panicking probe
    /// becomes a result instead of ending the batch.
    pub fn run(&self, checks: &[DiagnosticCheck]) -> DiagnosticReport {
        let results = checks.iter().map(run_check).collect::<Vec<_>>();
        let report = DiagnosticReport::new(results);
        info!(
            checks = report.total(),
            passed = report.count(Severity::Pass),
            warned = report.count(Severity::Warn),
            failed = report.count(Severity::Fail),
            score = report.score(),
            "diagnostics finished"
        );
        report
    }
}

fn run_check(check: &DiagnosticCheck) -> DiagnosticResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (check.probe)()));
    let finding = match outcome {
        Ok(Ok(finding)) => finding,
        Ok(Err(err)) => {
            let severity = check.absence.severity();
            debug!(
                check = %check.name,
                error = %err,
                ?severity,
                "probe error graded by absence policy"
            );
            Finding {
                severity,
                message: err.to_string(),
            }
        }
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            warn!(check = %check.name, detail = %detail, "probe panicked");
            Finding::fail(format!("probe aborted: {detail}"))
        }
    };

    let remediation = match finding.severity {
        Severity::Pass => None,
        Severity::Warn | Severity::Fail => check.remediation.clone(),
    };

    DiagnosticResult {
        check: check.name.clone(),
        category: check.category.clone(),
        severity: finding.severity,
        message: finding.message,
        remediation,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
