use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{sort_findings, Finding, Severity};

/// Outcome of holding a check's findings against `[policy]`.
///
/// `total_findings` counts what the rules reported; `effective_findings`
/// counts what is left once ignored rules are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub pass: bool,
    pub total_findings: usize,
    pub effective_findings: usize,
    pub highest_severity: Option<Severity>,
    pub fail_threshold: Severity,
}

/// `[policy]` table of `.hostfit.toml`: when a check counts as failed in CI
/// and which rules a repository has opted out of or re-graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Lowest severity that fails the check. INFO observations never do.
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
    /// Rule ids this repository does not want reported.
    #[serde(default)]
    pub ignore_rules: HashSet<String>,
    /// Severity re-grades, e.g. `spec_drift = "low"` for a repo that pins
    /// its image on purpose.
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

fn default_fail_on() -> Severity {
    Severity::High
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            ignore_rules: HashSet::new(),
            overrides: HashMap::new(),
        }
    }
}

impl Policy {
    /// Severity a finding carries under this policy, `None` when ignored.
    fn graded(&self, finding: &Finding) -> Option<Severity> {
        if self.ignore_rules.contains(&finding.rule_id) {
            return None;
        }
        Some(
            self.overrides
                .get(&finding.rule_id)
                .copied()
                .unwrap_or(finding.severity),
        )
    }

    fn blocks(&self, severity: Severity) -> bool {
        severity != Severity::Info && severity >= self.fail_on
    }

    /// Pass/fail for the raw findings of one check.
    pub fn evaluate(&self, findings: &[Finding]) -> PolicyVerdict {
        let graded: Vec<Severity> = findings.iter().filter_map(|f| self.graded(f)).collect();

        PolicyVerdict {
            pass: !graded.iter().any(|&sev| self.blocks(sev)),
            total_findings: findings.len(),
            effective_findings: graded.len(),
            highest_severity: graded.iter().copied().max(),
            fail_threshold: self.fail_on,
        }
    }

    /// The findings a report shows and the scorer sees: ignored rules
    /// dropped, re-graded ones moved to their new severity band.
    pub fn apply(&self, findings: &[Finding]) -> Vec<Finding> {
        let mut shown: Vec<Finding> = findings
            .iter()
            .filter_map(|f| {
                self.graded(f).map(|severity| Finding {
                    severity,
                    ..f.clone()
                })
            })
            .collect();
        sort_findings(&mut shown);
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Confidence, Evidence};

    fn make_finding(rule_id: &str, severity: Severity) -> Finding {
        Finding {
            rule_id: rule_id.into(),
            severity,
            message: "test".into(),
            reason: String::new(),
            host_summary: String::new(),
            confidence: Confidence::High,
            evidence: Evidence::new(),
            category: None,
        }
    }

    #[test]
    fn default_policy_fails_on_high() {
        let policy = Policy::default();
        let findings = vec![make_finding("python_version_mismatch", Severity::High)];
        let verdict = policy.evaluate(&findings);
        assert!(!verdict.pass);
        assert_eq!(verdict.highest_severity, Some(Severity::High));
    }

    #[test]
    fn default_policy_passes_on_medium() {
        let policy = Policy::default();
        let findings = vec![make_finding("missing_system_libs", Severity::Medium)];
        let verdict = policy.evaluate(&findings);
        assert!(verdict.pass);
    }

    #[test]
    fn info_never_fails() {
        let policy = Policy {
            fail_on: Severity::Info,
            ..Default::default()
        };
        let verdict = policy.evaluate(&[make_finding("mixed_python_node", Severity::Info)]);
        assert!(verdict.pass);
    }

    #[test]
    fn ignore_rule_removes_finding() {
        let mut policy = Policy::default();
        policy.ignore_rules.insert("lock_file_missing".into());
        let findings = vec![make_finding("lock_file_missing", Severity::High)];
        let verdict = policy.evaluate(&findings);
        assert!(verdict.pass);
        assert_eq!(verdict.effective_findings, 0);
        assert!(policy.apply(&findings).is_empty());
    }

    #[test]
    fn override_downgrades_and_resorts() {
        let mut policy = Policy::default();
        policy.overrides.insert("spec_drift".into(), Severity::Low);
        let findings = vec![
            make_finding("spec_drift", Severity::High),
            make_finding("missing_system_libs", Severity::Medium),
        ];
        assert!(policy.evaluate(&findings).pass);

        let applied = policy.apply(&findings);
        assert_eq!(applied[0].rule_id, "missing_system_libs");
        assert_eq!(applied[1].severity, Severity::Low);
    }

    #[test]
    fn upgrade_can_fail_and_ignore_wins_over_override() {
        let mut policy = Policy::default();
        policy.overrides.insert("missing_system_libs".into(), Severity::High);
        let findings = vec![make_finding("missing_system_libs", Severity::Medium)];
        assert!(!policy.evaluate(&findings).pass);

        policy.ignore_rules.insert("missing_system_libs".into());
        let verdict = policy.evaluate(&findings);
        assert!(verdict.pass);
        assert_eq!(verdict.total_findings, 1);
        assert_eq!(verdict.highest_severity, None);
        assert!(policy.apply(&findings).is_empty());
    }
}
