use crate::checks::human_bytes;
use crate::doctor::HostInfo;
use crate::model::{DiagnosticReport, DiagnosticResult, RunSummary, Severity};
use crate::reconcile::{Drift, DriftStatus};

pub fn render_diagnostic_markdown(report: &DiagnosticReport, host: Option<&HostInfo>) -> String {
    let mut out = String::new();
    out.push_str("# Docker Host Health Report\n\n");
    out.push_str(&format!(
        "- Score: `{}/100`\n- Checks: {} passed, {} warned, {} failed\n",
        report.score(),
        report.count(Severity::Pass),
        report.count(Severity::Warn),
        report.count(Severity::Fail)
    ));
    if let Some(host) = host {
        out.push_str(&format!(
            "- Host: `{}` ({} {}), kernel `{}`\n- Memory: {}, swap: {}\n",
            host.board_model.as_deref().unwrap_or("unknown board"),
            host.os,
            host.arch,
            host.kernel_version.as_deref().unwrap_or("unknown"),
            human_bytes(host.total_memory_bytes),
            human_bytes(host.total_swap_bytes)
        ));
    }
    out.push('\n');

    out.push_str("## Critical Issues\n\n");
    push_issues(&mut out, report.critical_issues(), "No critical issues.");

    out.push_str("## Warnings\n\n");
    push_issues(&mut out, report.warnings(), "No warnings.");

    out.push_str("## Checks\n\n");
    for category in report.categories() {
        out.push_str(&format!("### {category}\n\n"));
        for result in report.results.iter().filter(|r| r.category == category) {
            out.push_str(&format!(
                "- [{}] `{}`: {}\n",
                result.severity.label(),
                result.check,
                result.message
            ));
        }
        out.push('\n');
    }

    out
}

fn push_issues<'a>(
    out: &mut String,
    issues: impl Iterator<Item = &'a DiagnosticResult>,
    empty: &str,
) {
    let mut any = false;
    for issue in issues {
        any = true;
        out.push_str(&format!("- `{}`: {}\n", issue.check, issue.message));
        if let Some(hint) = &issue.remediation {
            out.push_str(&format!("  - Fix: {hint}\n"));
        }
    }
    if !any {
        out.push_str(empty);
        out.push('\n');
    }
    out.push('\n');
}

pub fn render_run_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# Optimization Run\n\n");
    out.push_str(&format!(
        "- Run: `{}`\n- Applied: {}\n- Skipped: {}\n- Warned: {}\n- Failed: {}\n\n",
        summary.run_id, summary.applied, summary.skipped, summary.warned, summary.failed
    ));

    out.push_str("## Targets\n\n");
    if summary.results.is_empty() {
        out.push_str("No targets evaluated.\n\n");
    } else {
        for result in &summary.results {
            out.push_str(&format!(
                "- `{}` -> `{}`: {}\n",
                result.target,
                result.outcome.label(),
                result.message
            ));
            if let Some(backup) = &result.backup {
                out.push_str(&format!("  - backup: `{}`\n", backup.display()));
            }
            for note in &result.notes {
                out.push_str(&format!("  - note: {note}\n"));
            }
        }
        out.push('\n');
    }

    let issues = summary.issues().collect::<Vec<_>>();
    if !issues.is_empty() {
        out.push_str("## Needs Attention\n\n");
        for result in issues {
            out.push_str(&format!("- `{}`: {}\n", result.target, result.message));
        }
        out.push('\n');
    }

    out
}

pub fn render_drift_markdown(drifts: &[Drift]) -> String {
    let mut out = String::new();
    out.push_str("# Optimization Plan (dry run)\n\n");
    let pending = drifts
        .iter()
        .filter(|drift| drift.status == DriftStatus::Drifted)
        .count();
    out.push_str(&format!(
        "- Targets: {}\n- Would change: {pending}\n\n",
        drifts.len()
    ));
    for drift in drifts {
        out.push_str(&format!(
            "- `{}` [{}]: {}\n",
            drift.target,
            drift_label(drift.status),
            drift.message
        ));
    }
    out
}

pub fn drift_label(status: DriftStatus) -> &'static str {
    match status {
        DriftStatus::InSync => "in_sync",
        DriftStatus::Drifted => "drifted",
        DriftStatus::Unavailable => "unavailable",
        DriftStatus::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::{render_diagnostic_markdown, render_run_markdown};
    use crate::model::{
        DiagnosticReport, DiagnosticResult, Outcome, ReconciliationResult, RunSummary, Severity,
    };

    #[test]
    fn diagnostic_markdown_lists_remediation_under_issues() {
        let report = DiagnosticReport::new(vec![
            DiagnosticResult {
                check: "docker-daemon".to_string(),
                category: "docker".to_string(),
                severity: Severity::Fail,
                message: "daemon not responding".to_string(),
                remediation: Some("sudo systemctl enable --now docker".to_string()),
            },
            DiagnosticResult {
                check: "swap".to_string(),
                category: "system".to_string(),
                severity: Severity::Pass,
                message: "swap is 1.0 GB".to_string(),
                remediation: None,
            },
        ]);
        let markdown = render_diagnostic_markdown(&report, None);

        assert!(markdown.contains("Score: `50/100`"));
        assert!(markdown.contains("  - Fix: sudo systemctl enable --now docker"));
        assert!(markdown.contains("No warnings."));
        let docker = markdown.find("### docker").unwrap();
        let system = markdown.find("### system").unwrap();
        assert!(docker < system);
    }

    #[test]
    fn run_markdown_surfaces_notes() {
        let mut summary = RunSummary::new();
        let mut applied = ReconciliationResult::new("fstab", Outcome::Applied, "set noatime");
        applied.notes.push("backup skipped: read-only".to_string());
        summary.record(applied);
        let markdown = render_run_markdown(&summary);

        assert!(markdown.contains("`fstab` -> `applied`"));
        assert!(markdown.contains("## Needs Attention"));
    }
}
