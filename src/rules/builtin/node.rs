use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// Host Node.js outside `engines.node`.
pub struct NodeEngineMismatch;

impl Rule for NodeEngineMismatch {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "node_engine_mismatch".into(),
            name: "Node engine constraint violated".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "Host Node.js violates package.json engines.node".into(),
            when: "package.json declares engines.node and the host's node --version does not \
                   satisfy it."
                .into(),
            fix: "Switch Node versions (nvm use, fnm use, volta pin) to one inside \
                  engines.node."
                .into(),
            cluster: "Node".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let (Some(spec), Some(host_node)) = (&repo.node_engine_spec, &host.node_version) else {
            return Ok(None);
        };
        if version::node_satisfies(host_node, spec) {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "node_engine_mismatch".into(),
            severity: Severity::High,
            message: "Node engine constraint violated.".into(),
            reason: format!(
                "engines.node: {spec}, host: {host_node}. npm/yarn may refuse to install or \
                 runtime may fail."
            ),
            host_summary: format!("Node {host_node}"),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("engines_node", spec.as_str())
                .with("host_node", host_node.as_str())
                .with("determinism", 1.0)
                .with("breakage_likelihood", "~100%")
                .with(
                    "likely_error",
                    "npm ERR! code EBADENGINE / runtime version mismatch",
                ),
            category: Some(Category::SpecViolation),
        }))
    }
}

/// package.json with dependencies and no lock file beside it.
pub struct LockFileMissing;

impl Rule for LockFileMissing {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "lock_file_missing".into(),
            name: "Node lock file missing".into(),
            severity: Severity::High,
            category: Category::SpecViolation,
            description: "package.json has dependencies but no lock file".into(),
            when: "A package.json declares dependencies and none of package-lock.json, \
                   yarn.lock, pnpm-lock.yaml, npm-shrinkwrap.json or bun.lockb sits beside it."
                .into(),
            fix: "Run npm install (or yarn / pnpm install) once and commit the generated lock \
                  file."
                .into(),
            cluster: "Lock file".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.has_package_json || !repo.node_lock_file_missing {
            return Ok(None);
        }

        let manifests: Vec<&str> = repo
            .manifest
            .node_manifests
            .iter()
            .filter(|m| m.missing_lock())
            .map(|m| m.path.as_str())
            .collect();

        Ok(Some(Finding {
            rule_id: "lock_file_missing".into(),
            severity: Severity::High,
            message: "No lock file (package-lock.json or yarn.lock); npm ci will fail.".into(),
            reason: "package.json has dependencies but no package-lock.json or yarn.lock. npm ci \
                     requires a lock file. npm install will produce non-deterministic installs."
                .into(),
            host_summary: host.os.clone(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("has_deps", true)
                .with("lock_files", "none")
                .with("manifests", manifests)
                .with("expected_failure", "npm ci fails; npm install non-deterministic"),
            category: Some(Category::SpecViolation),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_mismatch_fires_below_range() {
        let repo = RepoProfile {
            node_engine_spec: Some(">=18".into()),
            ..Default::default()
        };
        let host = HostProfile {
            node_version: Some("v16.20.2".into()),
            ..Default::default()
        };
        let f = NodeEngineMismatch.evaluate(&repo, &host).unwrap().unwrap();
        assert_eq!(f.host_summary, "Node v16.20.2");
    }

    #[test]
    fn engine_satisfied_or_unknown_is_silent() {
        let repo = RepoProfile {
            node_engine_spec: Some("^20.0.0".into()),
            ..Default::default()
        };
        let host = HostProfile {
            node_version: Some("v20.12.2".into()),
            ..Default::default()
        };
        assert!(NodeEngineMismatch.evaluate(&repo, &host).unwrap().is_none());
        assert!(NodeEngineMismatch
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn lock_missing_fires_only_with_flag() {
        let missing = RepoProfile {
            has_package_json: true,
            node_lock_file_missing: true,
            ..Default::default()
        };
        let f = LockFileMissing
            .evaluate(&missing, &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::High);

        let locked = RepoProfile {
            has_package_json: true,
            ..Default::default()
        };
        assert!(LockFileMissing
            .evaluate(&locked, &HostProfile::default())
            .unwrap()
            .is_none());
    }
}
