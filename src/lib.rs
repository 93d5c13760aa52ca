//! hostfit: predicts whether a repository will run on a machine.
//!
//! Static and offline. The scanner reduces a repository to a `RepoProfile`,
//! host inspection (or a host description file) yields a `HostProfile`,
//! rules compare the two and the scorer turns the findings into an
//! estimated success probability.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use hostfit::{check, CheckOptions};
//!
//! let report = check(Path::new("./some-repo"), &CheckOptions::default()).unwrap();
//! println!("{}% ({} findings)", report.score.probability, report.findings.len());
//! ```

pub mod config;
pub mod contract;
pub mod error;
pub mod fleet;
pub mod host;
pub mod output;
pub mod profile;
pub mod rules;
pub mod scanner;
pub mod scoring;
pub mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use config::Config;
use error::Result;
use host::{LocalPortProbe, NullPortProbe, PortProbe};
use output::OutputFormat;
use profile::{HostProfile, RepoProfile};
use rules::policy::PolicyVerdict;
use rules::{Finding, RuleEngine, Severity};
use scoring::RiskScore;

pub use fleet::simulate;

/// Options for a check invocation.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Path to config file (defaults to `.hostfit.toml` in the repository).
    pub config_path: Option<PathBuf>,
    /// Describe the host from this JSON file instead of inspecting it.
    pub host_file: Option<PathBuf>,
    /// CLI override for the fail_on threshold.
    pub fail_on_override: Option<Severity>,
}

/// Complete check report.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub repo: RepoProfile,
    pub host: HostProfile,
    /// Findings after the policy's ignore list and overrides.
    pub findings: Vec<Finding>,
    pub score: RiskScore,
    pub verdict: PolicyVerdict,
    /// The host came from a description file.
    pub simulated: bool,
}

impl CheckReport {
    pub fn has_high(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::High)
    }
}

/// Load `.hostfit.toml` for a repository, honoring an explicit path.
pub fn load_config(repo: &Path, explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repo.join(config::CONFIG_FILE));
    Config::load(&path)
}

/// Check a repository against the local machine, or against the host in
/// `options.host_file` when set.
pub fn check(path: &Path, options: &CheckOptions) -> Result<CheckReport> {
    match &options.host_file {
        Some(file) => fleet::simulate(path, file, options),
        None => {
            let host = host::inspect_host();
            check_with_host(path, &host, Arc::new(LocalPortProbe), options)
        }
    }
}

/// Check a repository against a given host.
pub fn check_with_host(
    path: &Path,
    host: &HostProfile,
    ports: Arc<dyn PortProbe>,
    options: &CheckOptions,
) -> Result<CheckReport> {
    let mut config = load_config(path, options.config_path.as_deref())?;
    if let Some(fail_on) = options.fail_on_override {
        config.policy.fail_on = fail_on;
    }

    let repo = scanner::scan_repo(path, &config.scan)?;
    let engine =
        RuleEngine::with_port_probe(&config.rules, ports).extensions(config.scan.extensions);
    let raw = engine.evaluate(&repo, host);

    let findings = config.policy.apply(&raw);
    let verdict = config.policy.evaluate(&raw);
    let score = config.scoring.score(&findings);
    tracing::debug!(
        repo = %repo.display_name(),
        findings = findings.len(),
        probability = score.probability,
        "check finished"
    );

    Ok(CheckReport {
        repo,
        host: host.clone(),
        findings,
        score,
        verdict,
        simulated: false,
    })
}

/// Check against a host that is never probed for ports.
pub fn check_offline(path: &Path, host: &HostProfile, options: &CheckOptions) -> Result<CheckReport> {
    check_with_host(path, host, Arc::new(NullPortProbe), options)
}

/// Render a check report in the specified format.
pub fn render_report(report: &CheckReport, format: OutputFormat, verbose: bool) -> Result<String> {
    output::render(report, format, verbose)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn host(json: &str) -> HostProfile {
        HostProfile::from_json_str(json).unwrap()
    }

    #[test]
    fn python_range_violation_scores_55() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nname = \"svc\"\nrequires-python = \">=3.10,<3.12\"\n",
        );
        let report = check_offline(
            dir.path(),
            &host(r#"{"python_version": "3.13.0"}"#),
            &CheckOptions::default(),
        )
        .unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].rule_id, "python_version_mismatch");
        assert_eq!(report.findings[0].severity, Severity::High);
        assert_eq!(report.score.probability, 55);
        assert!(!report.verdict.pass);
    }

    #[test]
    fn python_inside_range_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nrequires-python = \">=3.10,<3.13\"\n",
        );
        let report = check_offline(
            dir.path(),
            &host(r#"{"python_version": "3.11.5"}"#),
            &CheckOptions::default(),
        )
        .unwrap();
        assert!(report.findings.is_empty());
        assert_eq!(report.score.probability, 100);
        assert!(report.verdict.pass);
    }

    #[test]
    fn dockerfile_pin_alone_is_only_informational() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Dockerfile", "FROM python:3.8-slim\n");
        let report = check_offline(
            dir.path(),
            &host(r#"{"python_version": "3.12.1"}"#),
            &CheckOptions::default(),
        )
        .unwrap();
        let found: Vec<(&str, Severity)> = report
            .findings
            .iter()
            .map(|f| (f.rule_id.as_str(), f.severity))
            .collect();
        assert_eq!(found, vec![("docker_python_mismatch", Severity::Info)]);
        assert_eq!(report.score.probability, 95);
        assert!(report.verdict.pass);
    }

    #[test]
    fn hardcoded_cuda_without_gpu() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "torch\n");
        write(dir.path(), "train.py", "import torch\nmodel.to('cuda')\n");
        let report = check_offline(dir.path(), &HostProfile::default(), &CheckOptions::default())
            .unwrap();
        let f = report
            .findings
            .iter()
            .find(|f| f.rule_id == "torch_cuda_mismatch")
            .unwrap();
        assert_eq!(f.severity, Severity::High);
        assert!(serde_json::to_string(&f.evidence).unwrap().contains("train.py"));
    }

    #[test]
    fn lock_file_decides_finding() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"name": "api", "dependencies": {"express": "^4"}}"#,
        );
        let opts = CheckOptions::default();
        let report = check_offline(dir.path(), &HostProfile::default(), &opts).unwrap();
        assert!(report.findings.iter().any(|f| f.rule_id == "lock_file_missing"));

        write(dir.path(), "package-lock.json", "{}");
        let report = check_offline(dir.path(), &HostProfile::default(), &opts).unwrap();
        assert!(!report.findings.iter().any(|f| f.rule_id == "lock_file_missing"));
    }

    #[test]
    fn repo_config_applies_policy() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "pyproject.toml",
            "[project]\nrequires-python = \">=3.10,<3.12\"\n",
        );
        write(
            dir.path(),
            ".hostfit.toml",
            "[policy]\nignore_rules = [\"python_version_mismatch\"]\n",
        );
        let report = check_offline(
            dir.path(),
            &host(r#"{"python_version": "3.13.0"}"#),
            &CheckOptions::default(),
        )
        .unwrap();
        assert!(report.findings.is_empty());
        assert!(report.verdict.pass);
        assert_eq!(report.score.probability, 100);
    }

    #[test]
    fn extension_rules_join_builtins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "requests\n");
        write(
            dir.path(),
            ".hostfit/rules.yaml",
            "- id: no_windows\n  when:\n    host.os: windows\n  severity: low\n  message: Not supported on Windows.\n",
        );
        let report = check_offline(
            dir.path(),
            &host(r#"{"os": "windows"}"#),
            &CheckOptions::default(),
        )
        .unwrap();
        let f = report.findings.iter().find(|f| f.rule_id == "no_windows").unwrap();
        assert_eq!(f.severity, Severity::Low);
    }

    #[test]
    fn not_a_directory_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, "").unwrap();
        let err = check_offline(&file, &HostProfile::default(), &CheckOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn renders_every_format() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"dependencies": {"a": "1"}}"#);
        let report = check_offline(dir.path(), &HostProfile::default(), &CheckOptions::default())
            .unwrap();
        for format in [
            OutputFormat::Console,
            OutputFormat::Json,
            OutputFormat::Markdown,
            OutputFormat::Sarif,
        ] {
            let out = render_report(&report, format, true).unwrap();
            assert!(out.contains("lock_file_missing"), "{format:?}");
        }
    }
}
