//! Informational rules. They add context to a report and never indicate a
//! hard failure on their own.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile, SubprojectKind};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

const LOW_RAM_GB: f64 = 16.0;

fn info_metadata(
    id: &str,
    name: &str,
    description: &str,
    when: &str,
    fix: &str,
) -> RuleMetadata {
    RuleMetadata {
        id: id.into(),
        name: name.into(),
        severity: Severity::Info,
        category: Category::RuntimeEnvironment,
        description: description.into(),
        when: when.into(),
        fix: fix.into(),
        cluster: "Other".into(),
    }
}

/// Host interpreter minor is not one the repository's CI exercises.
pub struct PythonMinorMismatch;

impl Rule for PythonMinorMismatch {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            category: Category::SpecViolation,
            ..info_metadata(
                "python_minor_mismatch",
                "Untested Python minor",
                "Host Python minor differs from the versions the repo is tested on",
                "The host interpreter satisfies requires-python (if declared) but its minor \
                 version is not in the CI test matrix.",
                "Use one of the tested interpreter versions, or add the host's version to CI.",
            )
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let Some(host_py) = host.python_version.as_deref() else {
            return Ok(None);
        };
        let Some(host_mm) = version::major_minor(host_py) else {
            return Ok(None);
        };
        if let Some(spec) = &repo.python_version {
            if !version::python_satisfies(host_py, spec) {
                return Ok(None);
            }
        }

        let tested: BTreeSet<(u64, u64)> = repo
            .ci
            .python_versions()
            .filter_map(|(_, v)| version::major_minor(v))
            .collect();
        if tested.is_empty() || tested.contains(&host_mm) {
            return Ok(None);
        }
        if !tested.iter().any(|(major, _)| *major == host_mm.0) {
            return Ok(None);
        }

        let labels: Vec<String> = tested.iter().map(|(ma, mi)| format!("{ma}.{mi}")).collect();
        Ok(Some(Finding {
            rule_id: "python_minor_mismatch".into(),
            severity: Severity::Info,
            message: "Repo targets different Python minor than host.".into(),
            reason: format!(
                "CI tests Python {}, host has {host_py}. Minor differences may cause subtle \
                 dependency issues.",
                labels.join(", ")
            ),
            host_summary: format!("Python {host_py}"),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("tested_python", labels)
                .with("host_python", host_py),
            category: Some(Category::SpecViolation),
        }))
    }
}

/// Several Python projects in one repository.
pub struct MultiplePythonSubprojects;

impl Rule for MultiplePythonSubprojects {
    fn metadata(&self) -> RuleMetadata {
        info_metadata(
            "multiple_python_subprojects",
            "Multiple Python subprojects",
            "Repository contains more than one Python project",
            "Two or more directories carry their own Python manifest.",
            "Create one virtualenv per subproject, or consolidate into a workspace.",
        )
    }

    fn evaluate(&self, repo: &RepoProfile, _host: &HostProfile) -> Result<Option<Finding>> {
        let paths: Vec<&str> = repo
            .subprojects_of(SubprojectKind::Python)
            .map(|s| s.path.as_str())
            .collect();
        if paths.len() < 2 {
            return Ok(None);
        }

        let shown = paths.iter().take(5).copied().collect::<Vec<_>>().join(", ");
        let more = if paths.len() > 5 { "..." } else { "" };
        Ok(Some(Finding {
            rule_id: "multiple_python_subprojects".into(),
            severity: Severity::Info,
            message: "Multiple Python subprojects detected.".into(),
            reason: format!(
                "Paths: {shown}{more}. Ensure consistent virtualenvs or use per-subproject envs."
            ),
            host_summary: String::new(),
            confidence: Confidence::Medium,
            evidence: Evidence::new()
                .with("pyprojects_found", paths.len())
                .with("paths", paths.into_iter().take(8).collect::<Vec<_>>()),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}

/// Python backend and Node frontend in one repository.
pub struct MixedPythonNode;

impl Rule for MixedPythonNode {
    fn metadata(&self) -> RuleMetadata {
        info_metadata(
            "mixed_python_node",
            "Mixed Python + Node monorepo",
            "Repository mixes Python and Node projects",
            "Subprojects of both Python and Node type are present.",
            "Check both the Node version and the Python virtualenv against the docs.",
        )
    }

    fn evaluate(&self, repo: &RepoProfile, _host: &HostProfile) -> Result<Option<Finding>> {
        let kinds: BTreeSet<String> = repo
            .subprojects
            .iter()
            .map(|s| s.kind.to_string())
            .collect();
        if !(kinds.contains("python") && kinds.contains("node")) {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "mixed_python_node".into(),
            severity: Severity::Info,
            message: "Mixed Python + Node monorepo.".into(),
            reason: "Backend and frontend in same repo. Verify Node version and Python venv are \
                     compatible with docs."
                .into(),
            host_summary: String::new(),
            confidence: Confidence::Medium,
            evidence: Evidence::new().with("types", kinds.into_iter().collect::<Vec<_>>()),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}

/// Container interpreter differs from the host's.
pub struct DockerPythonMismatch;

impl Rule for DockerPythonMismatch {
    fn metadata(&self) -> RuleMetadata {
        info_metadata(
            "docker_python_mismatch",
            "Dockerfile Python differs from host",
            "Local runs use a different interpreter than the container",
            "The Dockerfile pins a Python minor different from the host's.",
            "Run inside the container, or use the container's Python minor locally.",
        )
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.has_dockerfile {
            return Ok(None);
        }
        let (Some(docker_py), Some(host_py)) =
            (repo.container.python_version.as_deref(), host.python_version.as_deref())
        else {
            return Ok(None);
        };
        let (Some(docker_mm), Some(host_mm)) =
            (version::major_minor(docker_py), version::major_minor(host_py))
        else {
            return Ok(None);
        };
        if docker_mm == host_mm {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "docker_python_mismatch".into(),
            severity: Severity::Info,
            message: "Dockerfile uses different Python than host.".into(),
            reason: format!(
                "Dockerfile: Python {docker_py}, host: {host_py}. Local dev may differ from \
                 container."
            ),
            host_summary: String::new(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("docker_python", docker_py)
                .with("host_python", host_py),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}

/// Limited RAM for a multi-service layout.
pub struct LowRamMultiService;

impl Rule for LowRamMultiService {
    fn metadata(&self) -> RuleMetadata {
        info_metadata(
            "low_ram_multi_service",
            "Multi-service repo with limited RAM",
            "Several services or containers on a host with little memory",
            "Host RAM is below 16 GB and the repo has multiple subprojects or a Dockerfile.",
            "Increase swap, run fewer services at once, or use a remote dev environment.",
        )
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let Some(ram) = host.ram_gb else {
            return Ok(None);
        };
        if ram >= LOW_RAM_GB {
            return Ok(None);
        }
        if repo.subprojects.len() < 2 && !repo.has_dockerfile {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "low_ram_multi_service".into(),
            severity: Severity::Info,
            message: "Multi-service repo with limited RAM.".into(),
            reason: format!(
                "Host has {ram:.0} GB RAM. Multiple subprojects or Docker may need more. \
                 Consider increasing swap or using remote dev."
            ),
            host_summary: format!("{ram:.0} GB RAM"),
            confidence: Confidence::Medium,
            evidence: Evidence::new()
                .with("ram_gb", ram)
                .with("subproject_count", repo.subprojects.len())
                .with("has_dockerfile", repo.has_dockerfile),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Subproject, WorkflowEvidence};

    fn host_py(v: &str) -> HostProfile {
        HostProfile {
            python_version: Some(v.into()),
            ..Default::default()
        }
    }

    fn sub(path: &str, kind: SubprojectKind) -> Subproject {
        Subproject {
            path: path.into(),
            kind,
            python_version: None,
        }
    }

    #[test]
    fn untested_minor_is_reported() {
        let mut repo = RepoProfile {
            python_version: Some(">=3.10".into()),
            ..Default::default()
        };
        repo.ci.workflows.insert(
            "ci.yml".into(),
            WorkflowEvidence {
                python_versions: vec!["3.10".into(), "3.11".into()],
                ..Default::default()
            },
        );
        let f = PythonMinorMismatch
            .evaluate(&repo, &host_py("3.12.2"))
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::Info);
        assert!(PythonMinorMismatch
            .evaluate(&repo, &host_py("3.11.9"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn minor_rule_defers_to_range_violation() {
        let mut repo = RepoProfile {
            python_version: Some(">=3.10,<3.12".into()),
            ..Default::default()
        };
        repo.ci.workflows.insert(
            "ci.yml".into(),
            WorkflowEvidence {
                python_versions: vec!["3.10".into()],
                ..Default::default()
            },
        );
        assert!(PythonMinorMismatch
            .evaluate(&repo, &host_py("3.13.0"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn subproject_signals() {
        let repo = RepoProfile {
            subprojects: vec![
                sub("backend", SubprojectKind::Python),
                sub("worker", SubprojectKind::Python),
                sub("web", SubprojectKind::Node),
            ],
            ..Default::default()
        };
        let host = HostProfile::default();
        let multi = MultiplePythonSubprojects.evaluate(&repo, &host).unwrap().unwrap();
        assert_eq!(multi.confidence, Confidence::Medium);
        assert!(multi.reason.starts_with("Paths: backend, worker."));
        assert!(MixedPythonNode.evaluate(&repo, &host).unwrap().is_some());
    }

    #[test]
    fn docker_python_differs() {
        let mut repo = RepoProfile {
            has_dockerfile: true,
            ..Default::default()
        };
        repo.container.python_version = Some("3.11".into());
        assert!(DockerPythonMismatch
            .evaluate(&repo, &host_py("3.12.1"))
            .unwrap()
            .is_some());
        assert!(DockerPythonMismatch
            .evaluate(&repo, &host_py("3.11.4"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn low_ram_needs_multi_service_layout() {
        let host = HostProfile {
            ram_gb: Some(8.0),
            ..Default::default()
        };
        let single = RepoProfile::default();
        assert!(LowRamMultiService.evaluate(&single, &host).unwrap().is_none());

        let docker = RepoProfile {
            has_dockerfile: true,
            ..Default::default()
        };
        assert!(LowRamMultiService.evaluate(&docker, &host).unwrap().is_some());
    }
}
