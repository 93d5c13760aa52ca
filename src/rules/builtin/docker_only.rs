use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};

/// Container-first repository with no documented native path.
pub struct DockerOnlyDev;

impl Rule for DockerOnlyDev {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "docker_only_dev".into(),
            name: "Docker-only development".into(),
            severity: Severity::High,
            category: Category::RuntimeEnvironment,
            description: "Repo is built around a container; native runs are undocumented".into(),
            when: "A Dockerfile and a devcontainer are present and the repository root has no \
                   native entry point (Makefile, pyproject.toml, requirements.txt, setup.py, \
                   package.json, Cargo.toml)."
                .into(),
            fix: "Use the Dev Container / docker compose workflow, or add a native setup path \
                  to the repository."
                .into(),
            cluster: "Docker".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.has_dockerfile || !repo.has_devcontainer {
            return Ok(None);
        }
        if !repo.manifest.native_entrypoints.is_empty() {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "docker_only_dev".into(),
            severity: Severity::High,
            message: "Repo appears container-first. Running natively may fail.".into(),
            reason: "Dockerfile and devcontainer present, but no obvious native install path \
                     (e.g. Makefile, root pyproject.toml). Documentation may assume Docker/Dev \
                     Container."
                .into(),
            host_summary: host.platform(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("has_dockerfile", true)
                .with("has_devcontainer", true),
            category: Some(Category::RuntimeEnvironment),
        }))
    }
}
