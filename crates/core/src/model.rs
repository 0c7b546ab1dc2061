use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Skipped,
    Warned,
    Failed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Skipped => "skipped",
            Outcome::Warned => "warned",
            Outcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationResult {
    pub outcome: Outcome,
    pub message: String,
    /// Name of the target this result was produced for.
    pub target: String,
    #[serde(default)]
    pub backup: Option<PathBuf>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ReconciliationResult {
    pub fn new(target: &str, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            target: target.to_string(),
            backup: None,
            notes: Vec::new(),
        }
    }
}

/// Counters and results of one reconciliation pass. Each pass starts at zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub applied: usize,
    pub skipped: usize,
    pub warned: usize,
    pub failed: usize,
    pub results: Vec<ReconciliationResult>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            applied: 0,
            skipped: 0,
            warned: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: ReconciliationResult) {
        match result.outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Warned => self.warned += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Results an operator should read: warnings, failures and anything
    /// carrying a side note (e.g. a backup that could not be written).
    pub fn issues(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|result| {
            matches!(result.outcome, Outcome::Warned | Outcome::Failed) || !result.notes.is_empty()
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Pass => "PASS",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticResult {
    pub check: String,
    pub category: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticReport {
    pub results: Vec<DiagnosticResult>,
}

impl DiagnosticReport {
    pub fn new(results: Vec<DiagnosticResult>) -> Self {
        Self { results }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|result| result.severity == severity)
            .count()
    }

    /// Percentage of passing checks, rounded. An empty report scores 0.
    pub fn score(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let passes = self.count(Severity::Pass);
        ((passes as f64 * 100.0) / total as f64).round() as u8
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &DiagnosticResult> {
        self.results
            .iter()
            .filter(|result| result.severity == Severity::Fail)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticResult> {
        self.results
            .iter()
            .filter(|result| result.severity == Severity::Warn)
    }

    pub fn has_critical_issues(&self) -> bool {
        self.critical_issues().next().is_some()
    }

    /// Category names in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for result in &self.results {
            if !seen.contains(&result.category.as_str()) {
                seen.push(&result.category);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DiagnosticReport, DiagnosticResult, Outcome, ReconciliationResult, RunSummary, Severity,
    };

    fn result(name: &str, severity: Severity) -> DiagnosticResult {
        DiagnosticResult {
            check: name.to_string(),
            category: "system".to_string(),
            severity,
            message: String::new(),
            remediation: None,
        }
    }

    #[test]
    fn empty_report_scores_zero() {
        let report = DiagnosticReport::default();
        assert_eq!(report.score(), 0);
        assert!(!report.has_critical_issues());
    }

    #[test]
    fn score_rounds_to_nearest_percent() {
        let report = DiagnosticReport::new(vec![
            result("a", Severity::Pass),
            result("b", Severity::Pass),
            result("c", Severity::Warn),
        ]);
        assert_eq!(report.score(), 67);
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = RunSummary::new();
        summary.record(ReconciliationResult::new("a", Outcome::Applied, "done"));
        summary.record(ReconciliationResult::new("b", Outcome::Skipped, "ok"));
        summary.record(ReconciliationResult::new("c", Outcome::Failed, "boom"));
        let mut noted = ReconciliationResult::new("d", Outcome::Applied, "done");
        noted.notes.push("backup failed".to_string());
        summary.record(noted);

        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
        let issues = summary.issues().map(|r| r.target.as_str()).collect::<Vec<_>>();
        assert_eq!(issues, vec!["c", "d"]);
    }
}
