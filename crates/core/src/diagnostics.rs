use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doctor::HostInfo;
use crate::model::{DiagnosticReport, DiagnosticResult, Severity, REPORT_VERSION};

/// Serializable health report: the derived score and views are materialised
/// so consumers do not need to recompute them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsBundle {
    pub report_version: String,
    pub run_id: String,
    pub generated_at: String,
    pub app_version: String,
    pub score: u8,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub critical_issues: Vec<DiagnosticResult>,
    pub warnings: Vec<DiagnosticResult>,
    pub results: Vec<DiagnosticResult>,
    pub host: Option<HostInfo>,
}

pub fn build_diagnostics_bundle(
    report: &DiagnosticReport,
    host: Option<HostInfo>,
) -> DiagnosticsBundle {
    DiagnosticsBundle {
        report_version: REPORT_VERSION.to_string(),
        run_id: Uuid::new_v4().to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        score: report.score(),
        passed: report.count(Severity::Pass),
        warned: report.count(Severity::Warn),
        failed: report.count(Severity::Fail),
        critical_issues: report.critical_issues().cloned().collect(),
        warnings: report.warnings().cloned().collect(),
        results: report.results.clone(),
        host,
    }
}

pub fn write_diagnostics_bundle(
    bundle: &DiagnosticsBundle,
    output_path: impl AsRef<Path>,
) -> Result<()> {
    let path = output_path.as_ref();
    let payload =
        serde_json::to_string_pretty(bundle).context("failed to serialize diagnostics bundle")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write diagnostics bundle to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_diagnostics_bundle, write_diagnostics_bundle, DiagnosticsBundle};
    use crate::model::{DiagnosticReport, DiagnosticResult, Severity};

    fn result(check: &str, severity: Severity) -> DiagnosticResult {
        DiagnosticResult {
            check: check.to_string(),
            category: "docker".to_string(),
            severity,
            message: format!("{check} message"),
            remediation: Some("fix it".to_string()),
        }
    }

    #[test]
    fn bundle_materialises_score_and_views() {
        let report = DiagnosticReport::new(vec![
            result("docker-cli", Severity::Pass),
            result("docker-daemon", Severity::Fail),
            result("docker-daemon-config", Severity::Warn),
            result("swap", Severity::Pass),
        ]);
        let bundle = build_diagnostics_bundle(&report, None);

        assert_eq!(bundle.score, 50);
        assert_eq!(bundle.failed, 1);
        assert_eq!(bundle.critical_issues[0].check, "docker-daemon");
        assert_eq!(bundle.warnings[0].check, "docker-daemon-config");
        assert_eq!(bundle.results.len(), 4);
    }

    #[test]
    fn written_bundle_parses_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("health.json");
        let bundle = build_diagnostics_bundle(&DiagnosticReport::default(), None);
        write_diagnostics_bundle(&bundle, &path).expect("bundle written");

        let parsed: DiagnosticsBundle =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.score, 0);
        assert_eq!(parsed.run_id, bundle.run_id);
    }
}
