use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// Host interpreter falls outside the declared `requires-python` range.
pub struct PythonVersionMismatch;

impl Rule for PythonVersionMismatch {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "python_version_mismatch".into(),
            name: "Python version outside declared range".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "Host Python violates the repository's requires-python constraint".into(),
            when: "requires-python (pyproject, setup.py or Poetry) is declared and the host \
                   interpreter does not satisfy it."
                .into(),
            fix: "Install a matching interpreter (pyenv, uv python install) and create the \
                  virtualenv with it."
                .into(),
            cluster: "Python".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let (Some(spec), Some(host_py)) = (&repo.python_version, &host.python_version) else {
            return Ok(None);
        };
        if version::python_satisfies(host_py, spec) {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "python_version_mismatch".into(),
            severity: Severity::High,
            message: "Host Python version violates repository requirement.".into(),
            reason: format!(
                "Repo requires {spec}, host has {host_py}. This environment is outside the \
                 declared compatibility range. Installation may succeed but runtime behavior \
                 is undefined."
            ),
            host_summary: format!("{} {}, Python {host_py}", host.os, host.arch),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("requires_python", spec.as_str())
                .with("host_python", host_py.as_str()),
            category: Some(Category::SpecViolation),
        }))
    }
}
