pub mod console;
pub mod json;
pub mod markdown;
pub mod sarif;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::{Finding, Severity};
use crate::CheckReport;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
    Markdown,
    Sarif,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            "markdown" | "md" => Some(Self::Markdown),
            "sarif" => Some(Self::Sarif),
            _ => None,
        }
    }
}

/// Render a check report into the specified format.
pub fn render(report: &CheckReport, format: OutputFormat, verbose: bool) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render(report, verbose)),
        OutputFormat::Json => json::render(report),
        OutputFormat::Markdown => Ok(markdown::render(report, verbose)),
        OutputFormat::Sarif => sarif::render(report),
    }
}

/// Findings grouped the way every human-readable renderer shows them.
pub(crate) struct Sections<'a> {
    pub hard_failures: Vec<&'a Finding>,
    pub runtime_risks: Vec<&'a Finding>,
    pub observations: Vec<&'a Finding>,
}

impl<'a> Sections<'a> {
    pub fn of(findings: &'a [Finding]) -> Self {
        let mut sections = Sections {
            hard_failures: Vec::new(),
            runtime_risks: Vec::new(),
            observations: Vec::new(),
        };
        for f in findings {
            match f.severity {
                Severity::High => sections.hard_failures.push(f),
                Severity::Medium | Severity::Low => sections.runtime_risks.push(f),
                Severity::Info => sections.observations.push(f),
            }
        }
        sections
    }
}

/// "(1 high, 2 low)" style breakdown of non-informational findings.
pub(crate) fn severity_breakdown(findings: &[Finding]) -> String {
    let parts: Vec<String> = [Severity::High, Severity::Medium, Severity::Low]
        .into_iter()
        .filter_map(|sev| {
            let n = findings.iter().filter(|f| f.severity == sev).count();
            (n > 0).then(|| format!("{n} {sev}"))
        })
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("({})", parts.join(", "))
    }
}

/// One-sentence executive summary.
pub(crate) fn summary_line(findings: &[Finding]) -> String {
    match findings.iter().find(|f| f.severity == Severity::High) {
        Some(f) => format!("Primary blocker: {}", f.message),
        None => "No deterministic blockers detected.".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::profile::{HostProfile, RepoProfile};
    use crate::rules::policy::Policy;
    use crate::rules::{Confidence, Evidence, Finding, Severity};
    use crate::scoring::ScoringModel;
    use crate::CheckReport;

    pub fn finding(rule_id: &str, severity: Severity, message: &str) -> Finding {
        Finding {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            reason: format!("reason for {rule_id}"),
            host_summary: "Host Python: 3.13.0".into(),
            confidence: Confidence::High,
            evidence: Evidence::new().with("file", "pyproject.toml"),
            category: None,
        }
    }

    pub fn report(findings: Vec<Finding>) -> CheckReport {
        let policy = Policy::default();
        CheckReport {
            repo: RepoProfile {
                path: "/work/svc".into(),
                name: "svc".into(),
                ..Default::default()
            },
            host: HostProfile {
                os: "linux".into(),
                arch: "x86_64".into(),
                python_version: Some("3.13.0".into()),
                ..Default::default()
            },
            score: ScoringModel::default().score(&findings),
            verdict: policy.evaluate(&findings),
            findings,
            simulated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::finding;
    use super::*;

    #[test]
    fn lenient_format_names() {
        assert_eq!(OutputFormat::from_str_lenient("MD"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::from_str_lenient("text"), Some(OutputFormat::Console));
        assert_eq!(OutputFormat::from_str_lenient("html"), None);
    }

    #[test]
    fn breakdown_and_summary() {
        let findings = vec![
            finding("a", Severity::High, "Python mismatch"),
            finding("b", Severity::Low, "x"),
            finding("c", Severity::Low, "y"),
            finding("d", Severity::Info, "z"),
        ];
        assert_eq!(severity_breakdown(&findings), "(1 high, 2 low)");
        assert_eq!(summary_line(&findings), "Primary blocker: Python mismatch");
        assert_eq!(severity_breakdown(&findings[3..]), "");
        assert_eq!(summary_line(&findings[1..]), "No deterministic blockers detected.");
    }

    #[test]
    fn sections_split_by_severity() {
        let findings = vec![
            finding("a", Severity::High, "a"),
            finding("b", Severity::Medium, "b"),
            finding("c", Severity::Info, "c"),
        ];
        let s = Sections::of(&findings);
        assert_eq!(s.hard_failures.len(), 1);
        assert_eq!(s.runtime_risks.len(), 1);
        assert_eq!(s.observations.len(), 1);
    }
}
