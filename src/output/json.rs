use crate::error::Result;
use crate::profile::HostProfile;
use crate::rules::policy::PolicyVerdict;
use crate::rules::{Confidence, Finding};
use crate::CheckReport;

use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    estimated_success_probability: u8,
    confidence: Confidence,
    low_confidence_rules: &'a [String],
    repo: RepoSummary<'a>,
    host: &'a HostProfile,
    simulated: bool,
    findings: &'a [Finding],
    verdict: &'a PolicyVerdict,
}

#[derive(Serialize)]
struct RepoSummary<'a> {
    name: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    python_version: Option<&'a str>,
    uses_torch: bool,
    uses_tensorflow: bool,
    requires_cuda: bool,
    cuda_optional: bool,
    frameworks: &'a [String],
    required_ports: &'a [u16],
    subprojects: usize,
}

/// Render a check report as JSON.
pub fn render(report: &CheckReport) -> Result<String> {
    let repo = &report.repo;
    let json = JsonReport {
        estimated_success_probability: report.score.probability,
        confidence: report.score.confidence,
        low_confidence_rules: &report.score.low_confidence_rules,
        repo: RepoSummary {
            name: repo.display_name(),
            path: &repo.path,
            python_version: repo.python_version.as_deref(),
            uses_torch: repo.uses_torch,
            uses_tensorflow: repo.uses_tensorflow,
            requires_cuda: repo.requires_cuda,
            cuda_optional: repo.cuda_optional,
            frameworks: &repo.frameworks,
            required_ports: &repo.required_ports,
            subprojects: repo.subprojects.len(),
        },
        host: &report.host,
        simulated: report.simulated,
        findings: &report.findings,
        verdict: &report.verdict,
    };
    let json = serde_json::to_string_pretty(&json)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::test_support::{finding, report};
    use crate::rules::Severity;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[test]
    fn carries_score_repo_and_findings() {
        let r = report(vec![finding(
            "python_version_mismatch",
            Severity::High,
            "Python outside range",
        )]);
        let v: Value = serde_json::from_str(&render(&r).unwrap()).unwrap();
        assert_eq!(v["estimated_success_probability"], 55);
        assert_eq!(v["confidence"], "high");
        assert_eq!(v["repo"]["name"], "svc");
        assert_eq!(v["host"]["python_version"], "3.13.0");
        assert_eq!(v["findings"][0]["rule_id"], "python_version_mismatch");
        assert_eq!(v["findings"][0]["severity"], "high");
        assert_eq!(v["verdict"]["pass"], false);
        assert_eq!(v["simulated"], false);
    }
}
