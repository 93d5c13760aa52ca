use super::{severity_breakdown, summary_line, Sections};
use crate::rules::{Finding, Severity};
use crate::CheckReport;

/// Render a report as plain console text: score, findings grouped by
/// impact, then the policy verdict.
pub fn render(report: &CheckReport, verbose: bool) -> String {
    let mut output = String::new();
    let findings = &report.findings;

    output.push_str(&format!("\n  {}\n", report.repo.display_name()));
    let host_label = if report.simulated { "Simulated host" } else { "Host" };
    output.push_str(&format!("  {}: {}\n\n", host_label, report.host.summary()));

    let breakdown = severity_breakdown(findings);
    if breakdown.is_empty() {
        output.push_str(&format!("  Score {}%\n", report.score.probability));
    } else {
        output.push_str(&format!(
            "  Score {}% {}\n",
            report.score.probability, breakdown
        ));
    }
    output.push_str(&format!("  Confidence: {}\n", report.score.confidence));
    if verbose && !report.score.low_confidence_rules.is_empty() {
        output.push_str(&format!(
            "  Low-confidence rules: {}\n",
            report.score.low_confidence_rules.join(", ")
        ));
    }
    output.push_str(&format!("  {}\n\n", summary_line(findings)));

    if findings.is_empty() {
        output.push_str("  No compatibility issues detected.\n\n");
    } else {
        let sections = Sections::of(findings);
        section(&mut output, "Hard failures", &sections.hard_failures, verbose);
        section(&mut output, "Runtime risks", &sections.runtime_risks, verbose);
        section(&mut output, "Observations", &sections.observations, verbose);
    }

    let status = if report.verdict.pass { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "  Result: {} (threshold: {}, highest: {})\n\n",
        status,
        report.verdict.fail_threshold,
        report
            .verdict
            .highest_severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".into()),
    ));

    output
}

fn section(output: &mut String, title: &str, findings: &[&Finding], verbose: bool) {
    if findings.is_empty() {
        return;
    }
    output.push_str(&format!("  {title}\n"));
    for f in findings {
        let bullet = if f.severity == Severity::High { "●" } else { "○" };
        if verbose {
            output.push_str(&format!("    {} {} [{}]\n", bullet, f.message, f.rule_id));
        } else {
            output.push_str(&format!("    {} {}\n", bullet, f.message));
        }
        if f.severity == Severity::High {
            if !f.reason.is_empty() {
                output.push_str(&format!("        {}\n", f.reason));
            }
            if !f.host_summary.is_empty() {
                output.push_str(&format!("        {}\n", f.host_summary));
            }
        }
        if verbose {
            for (key, value) in f.evidence.iter() {
                let value = value
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| value.to_string());
                output.push_str(&format!("        {key}: {value}\n"));
            }
        }
    }
    output.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::{finding, report};

    #[test]
    fn groups_findings_and_prints_verdict() {
        let r = report(vec![
            finding("python_version_mismatch", Severity::High, "Python 3.13 outside range"),
            finding("lock_file_missing", Severity::Medium, "No lock file"),
            finding("docker_only", Severity::Info, "Docker only"),
        ]);
        let out = render(&r, false);
        assert!(out.contains("Hard failures"));
        assert!(out.contains("● Python 3.13 outside range"));
        assert!(out.contains("○ No lock file"));
        assert!(out.contains("Observations"));
        assert!(out.contains("reason for python_version_mismatch"));
        assert!(out.contains("Primary blocker: Python 3.13 outside range"));
        assert!(out.contains("Result: FAIL (threshold: high, highest: high)"));
        assert!(!out.contains("[lock_file_missing]"));
    }

    #[test]
    fn verbose_adds_rule_ids_and_evidence() {
        let r = report(vec![finding("lock_file_missing", Severity::Medium, "No lock file")]);
        let out = render(&r, true);
        assert!(out.contains("[lock_file_missing]"));
        assert!(out.contains("file: pyproject.toml"));
        assert!(out.contains("No deterministic blockers detected."));
    }

    #[test]
    fn empty_report() {
        let out = render(&report(Vec::new()), false);
        assert!(out.contains("Score 100%"));
        assert!(out.contains("No compatibility issues detected."));
        assert!(out.contains("Result: PASS (threshold: high, highest: none)"));
    }

    #[test]
    fn simulated_host_is_labelled() {
        let mut r = report(Vec::new());
        r.simulated = true;
        assert!(render(&r, false).contains("Simulated host: linux x86_64"));
    }
}
