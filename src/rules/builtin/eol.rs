use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// `requires-python` admits only end-of-life interpreters.
pub struct PythonEol;

impl Rule for PythonEol {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "python_eol".into(),
            name: "Python pinned to end-of-life release".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "requires-python resolves only to Python releases past end-of-life".into(),
            when: "Every interpreter version admitted by requires-python is past its \
                   end-of-life date (e.g. ==3.8.*, >=3.7,<3.9)."
                .into(),
            fix: "Raise requires-python to a supported release and re-test dependencies.".into(),
            cluster: "Python".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let Some(spec) = &repo.python_version else {
            return Ok(None);
        };
        let Some((major, minor)) = version::python_eol_pin(spec) else {
            return Ok(None);
        };

        let eol = format!("{major}.{minor}");
        let mut evidence = Evidence::new()
            .with("requires_python", spec.as_str())
            .with("eol_version", eol.as_str());
        if let Some(date) = version::python_eol_date(major, minor) {
            evidence.insert("eol_date", date);
        }

        Ok(Some(Finding {
            rule_id: "python_eol".into(),
            severity: Severity::High,
            message: format!("Python {eol} is EOL; requires-python pins a deprecated runtime."),
            reason: format!(
                "requires-python ({spec}) only admits Python {eol} or older. Python {eol} \
                 reached end-of-life. Security and compatibility risk."
            ),
            host_summary: format!(
                "Python {}",
                host.python_version.as_deref().unwrap_or("?")
            ),
            confidence: Confidence::High,
            evidence,
            category: Some(Category::SpecViolation),
        }))
    }
}

/// `engines.node` admits only end-of-life Node.js majors.
pub struct NodeEol;

impl Rule for NodeEol {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "node_eol".into(),
            name: "Node pinned to end-of-life release".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "engines.node resolves only to Node.js majors past end-of-life".into(),
            when: "Every Node.js major admitted by package.json engines.node is past its \
                   end-of-life date (e.g. 16.x, ^14 || ^16)."
                .into(),
            fix: "Move engines.node to an active LTS line and update native dependencies.".into(),
            cluster: "Node".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let Some(spec) = &repo.node_engine_spec else {
            return Ok(None);
        };
        let Some(major) = version::node_eol_pin(spec) else {
            return Ok(None);
        };

        let mut evidence = Evidence::new()
            .with("engines_node", spec.as_str())
            .with("eol_major", major);
        if let Some(date) = version::node_eol_date(major) {
            evidence.insert("eol_date", date);
        }

        Ok(Some(Finding {
            rule_id: "node_eol".into(),
            severity: Severity::High,
            message: format!("Node {major} is EOL; engines.node requires a deprecated runtime."),
            reason: format!(
                "package.json engines.node ({spec}) only admits Node {major}.x or older. \
                 Node {major} reached end-of-life. Security and compatibility risk."
            ),
            host_summary: host
                .node_version
                .clone()
                .unwrap_or_else(|| "unknown".into()),
            confidence: Confidence::High,
            evidence,
            category: Some(Category::SpecViolation),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn py_repo(spec: &str) -> RepoProfile {
        RepoProfile {
            python_version: Some(spec.into()),
            ..Default::default()
        }
    }

    fn node_repo(spec: &str) -> RepoProfile {
        RepoProfile {
            node_engine_spec: Some(spec.into()),
            ..Default::default()
        }
    }

    #[test]
    fn python_exclusive_eol_pin_fires() {
        let f = PythonEol
            .evaluate(&py_repo("==3.8.*"), &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.evidence.get("eol_version").unwrap(), "3.8");
        assert_eq!(f.evidence.get("eol_date").unwrap(), "2024-10-07");
    }

    #[test]
    fn python_open_range_is_not_eol() {
        for spec in [">=3.8", ">=3.7", "^3.9", ">=3.10,<3.13"] {
            assert!(
                PythonEol
                    .evaluate(&py_repo(spec), &HostProfile::default())
                    .unwrap()
                    .is_none(),
                "{spec} should not be EOL"
            );
        }
    }

    #[test]
    fn node_exclusive_eol_fires() {
        let f = NodeEol
            .evaluate(&node_repo("16.x"), &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.evidence.get("eol_major").unwrap(), 16);
    }

    #[test]
    fn node_open_range_is_not_eol() {
        assert!(NodeEol
            .evaluate(&node_repo(">=14"), &HostProfile::default())
            .unwrap()
            .is_none());
    }
}
