use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// Where the drift boundary sits.
///
/// The container image is the prescriptive runtime. A CI matrix that tests
/// several interpreters is intentional and is never drift on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecDriftPolicy {
    /// The container interpreter must be one of the CI matrix versions.
    pub ci_matrix_is_declaration: bool,
    /// Without a container pin, report nothing. When false, CI versions
    /// outside the declared constraint count as drift.
    pub require_container_pin: bool,
}

impl Default for SpecDriftPolicy {
    fn default() -> Self {
        Self {
            ci_matrix_is_declaration: true,
            require_container_pin: true,
        }
    }
}

/// Python runtime definitions disagree across project files.
pub struct SpecDrift {
    policy: SpecDriftPolicy,
}

impl SpecDrift {
    pub fn new(policy: SpecDriftPolicy) -> Self {
        Self { policy }
    }
}

impl Rule for SpecDrift {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "spec_drift".into(),
            name: "Python spec drift".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "The container's Python pin disagrees with the project's own declaration"
                .into(),
            when: "The Dockerfile pins a Python version that requires-python does not admit, \
                   or that none of the CI matrix entries test."
                .into(),
            fix: "Pick one interpreter line and align the Dockerfile base image, \
                  requires-python and the CI matrix."
                .into(),
            cluster: "Spec drift".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, _host: &HostProfile) -> Result<Option<Finding>> {
        let declared = repo
            .manifest
            .requires_python
            .as_deref()
            .or(repo.python_version.as_deref());
        let container = repo.container.python_version.as_deref();
        let container_minor = container.and_then(version::minor_label);

        let ci: Vec<(&str, &str)> = repo.ci.python_versions().collect();
        let ci_minors: BTreeSet<String> = ci
            .iter()
            .filter_map(|(_, v)| version::minor_label(v))
            .collect();

        let mut conflicts = Vec::new();
        match (container, &container_minor) {
            (Some(pin), Some(minor)) => {
                if let Some(spec) = declared {
                    if !version::python_satisfies(pin, spec) {
                        conflicts.push(format!(
                            "Dockerfile Python {pin} is outside requires-python {spec}"
                        ));
                    }
                }
                if self.policy.ci_matrix_is_declaration
                    && !ci_minors.is_empty()
                    && !ci_minors.contains(minor)
                {
                    conflicts.push(format!(
                        "Dockerfile Python {pin} is not in the CI matrix ({})",
                        ci_minors.iter().cloned().collect::<Vec<_>>().join(", ")
                    ));
                }
            }
            _ if self.policy.require_container_pin => return Ok(None),
            _ => {
                if let Some(spec) = declared {
                    for (wf, v) in &ci {
                        if !version::python_satisfies(v, spec) {
                            conflicts.push(format!(
                                "CI ({wf}) tests Python {v}, outside requires-python {spec}"
                            ));
                        }
                    }
                }
            }
        }

        if conflicts.is_empty() {
            return Ok(None);
        }

        let mut versions = ci_minors.clone();
        let mut sources = Vec::new();
        if let Some(spec) = declared {
            if let Some(m) = version::minor_label(spec) {
                versions.insert(m);
            }
            sources.push(format!("pyproject: {spec}"));
        }
        if let (Some(pin), Some(minor)) = (container, &container_minor) {
            versions.insert(minor.clone());
            sources.push(format!("Dockerfile: {pin}"));
        }
        sources.extend(ci.iter().map(|(wf, v)| format!("CI ({wf}): {v}")));
        sources.truncate(6);

        let versions: Vec<String> = versions.into_iter().collect();

        Ok(Some(Finding {
            rule_id: "spec_drift".into(),
            severity: Severity::High,
            message: "Spec drift detected: the container Python disagrees with the project's \
                      declared runtime."
                .into(),
            reason: format!(
                "{}. Runtime expectations are inconsistent (pyproject vs Docker vs CI).",
                conflicts.join("; ")
            ),
            host_summary: String::new(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("drift_entropy", versions.len())
                .with("versions", versions)
                .with("sources", sources)
                .with("determinism", 0.6)
                .with("breakage_likelihood", "~70%")
                .with(
                    "likely_error",
                    "CI and local runtime definitions diverge; subtle version-dependent bugs",
                ),
            category: Some(Category::SpecViolation),
        }))
    }
}
