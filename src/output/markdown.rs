use super::{severity_breakdown, summary_line, Sections};
use crate::rules::Finding;
use crate::CheckReport;

/// Render a report as GitHub-flavored Markdown, suitable for PR comments
/// and job summaries.
pub fn render(report: &CheckReport, verbose: bool) -> String {
    let mut md = String::new();
    let findings = &report.findings;

    md.push_str(&format!("## hostfit: {}\n\n", report.repo.display_name()));
    let host_label = if report.simulated { "Simulated host" } else { "Host" };
    md.push_str(&format!("**{}:** {}\n\n", host_label, report.host.summary()));
    md.push_str(&format!(
        "**Estimated success:** {}% {}\n\n",
        report.score.probability,
        severity_breakdown(findings)
    ));
    md.push_str(&format!("**Confidence:** {}\n\n", report.score.confidence));
    md.push_str(&format!("> {}\n\n", summary_line(findings)));

    if findings.is_empty() {
        md.push_str("No compatibility issues detected.\n\n");
    } else {
        let sections = Sections::of(findings);
        table(&mut md, "Hard failures", &sections.hard_failures);
        table(&mut md, "Runtime risks", &sections.runtime_risks);
        table(&mut md, "Observations", &sections.observations);
    }

    if verbose && !report.score.low_confidence_rules.is_empty() {
        md.push_str(&format!(
            "Low-confidence rules: {}\n\n",
            report
                .score
                .low_confidence_rules
                .iter()
                .map(|r| format!("`{r}`"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    let status = if report.verdict.pass { "PASS" } else { "FAIL" };
    md.push_str(&format!(
        "**Result:** {} (threshold: {})\n",
        status, report.verdict.fail_threshold
    ));
    md
}

fn table(md: &mut String, title: &str, findings: &[&Finding]) {
    if findings.is_empty() {
        return;
    }
    md.push_str(&format!("### {title}\n\n"));
    md.push_str("| Severity | Rule | Finding | Reason |\n");
    md.push_str("|---|---|---|---|\n");
    for f in findings {
        md.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            f.severity.label(),
            f.rule_id,
            escape(&f.message),
            escape(&f.reason)
        ));
    }
    md.push('\n');
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::{finding, report};
    use crate::rules::Severity;

    #[test]
    fn renders_tables_per_section() {
        let r = report(vec![
            finding("python_version_mismatch", Severity::High, "Python a|b"),
            finding("lock_file_missing", Severity::Medium, "No lock file"),
        ]);
        let md = render(&r, false);
        assert!(md.starts_with("## hostfit: svc"));
        assert!(md.contains("### Hard failures"));
        assert!(md.contains("| HIGH | `python_version_mismatch` | Python a\\|b |"));
        assert!(md.contains("### Runtime risks"));
        assert!(!md.contains("### Observations"));
        assert!(md.contains("**Result:** FAIL"));
    }

    #[test]
    fn clean_report() {
        let md = render(&report(Vec::new()), true);
        assert!(md.contains("**Estimated success:** 100%"));
        assert!(md.contains("No compatibility issues detected."));
        assert!(md.contains("**Result:** PASS"));
    }
}
