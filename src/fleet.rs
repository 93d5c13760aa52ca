//! Batch modes: audit every repository under a directory, fleet scans with
//! aggregated statistics, and simulation against a described host.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FitError, Result};
use crate::host::{NullPortProbe, PortProbe};
use crate::profile::HostProfile;
use crate::rules::{registry, Severity};
use crate::scanner::SKIP_DIRS;
use crate::{CheckOptions, CheckReport};

pub const DEFAULT_MAX_DEPTH: usize = 4;
pub const AUDIT_MAX_REPOS: usize = 50;
pub const FLEET_MAX_REPOS: usize = 500;

const TOP_RULES: usize = 15;
const TOP_CLUSTERS: usize = 10;

/// Files whose presence marks a directory as a repository root.
const REPO_MARKERS: &[&str] = &[
    ".git",
    "pyproject.toml",
    "requirements.txt",
    "package.json",
    "Cargo.toml",
];

/// Fleet policy file (YAML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetPolicy {
    #[serde(deserialize_with = "lenient_severity")]
    pub fail_on: Severity,
    pub max_repos: usize,
    pub max_depth: usize,
}

impl Default for FleetPolicy {
    fn default() -> Self {
        Self {
            fail_on: Severity::High,
            max_repos: FLEET_MAX_REPOS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Accepts `HIGH`, `high`, `error`, ...
fn lenient_severity<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Severity, D::Error> {
    let raw = String::deserialize(d)?;
    Severity::from_str_lenient(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{raw}'")))
}

impl FleetPolicy {
    /// Load a policy file. A missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.is_file() {
            return Err(FitError::Config(format!(
                "policy file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Per-repository line of an audit or fleet report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoSummary {
    pub name: String,
    pub path: String,
    pub rule_count: usize,
    pub rules: Vec<String>,
    pub has_high: bool,
    pub high_count: usize,
    /// MEDIUM and LOW findings.
    pub medium_count: usize,
    pub score: u8,
}

impl RepoSummary {
    fn from_report(dir: &Path, report: &CheckReport) -> Self {
        let high_count = report
            .findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();
        let medium_count = report
            .findings
            .iter()
            .filter(|f| matches!(f.severity, Severity::Medium | Severity::Low))
            .count();
        Self {
            name: report.repo.display_name().to_string(),
            path: dir.display().to_string(),
            rule_count: report.findings.len(),
            rules: report.findings.iter().map(|f| f.rule_id.clone()).collect(),
            has_high: high_count > 0,
            high_count,
            medium_count,
            score: report.score.probability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCount {
    pub rule_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCount {
    pub cluster: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub generated_at: String,
    pub total_repos_scanned: usize,
    /// Repositories with at least one finding at or above `policy.fail_on`.
    pub violations: usize,
    pub repos: Vec<RepoSummary>,
    pub most_common_rules: Vec<RuleCount>,
    pub risk_clusters: Vec<ClusterCount>,
    pub policy: FleetPolicy,
}

fn is_repo(dir: &Path) -> bool {
    REPO_MARKERS.iter().any(|m| dir.join(m).exists())
}

fn skipped(dir: &Path) -> bool {
    dir.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with('.') || SKIP_DIRS.contains(&n.as_ref()))
}

/// Repository roots under `base`, the base itself first when it is one.
/// Does not descend into a repository.
pub fn find_repos(base: &Path, max_depth: usize, max_repos: usize) -> Vec<PathBuf> {
    let base = std::fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
    let mut found = Vec::new();
    if max_repos == 0 || !base.is_dir() {
        return found;
    }
    if is_repo(&base) {
        found.push(base.clone());
    }

    let mut walker = walkdir::WalkDir::new(&base)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable directory");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if skipped(entry.path()) {
            walker.skip_current_dir();
            continue;
        }
        if is_repo(entry.path()) {
            found.push(entry.path().to_path_buf());
            if found.len() >= max_repos {
                break;
            }
            walker.skip_current_dir();
        }
    }
    found.truncate(max_repos);
    found
}

fn check_all(dirs: &[PathBuf], host: &HostProfile, probe: &Arc<dyn PortProbe>) -> Vec<(PathBuf, CheckReport)> {
    dirs.iter()
        .filter_map(|dir| {
            match crate::check_with_host(dir, host, Arc::clone(probe), &CheckOptions::default()) {
                Ok(report) => Some((dir.clone(), report)),
                Err(e) => {
                    tracing::warn!(repo = %dir.display(), error = %e, "skipping repository");
                    None
                }
            }
        })
        .collect()
}

/// Check every repository under `base` (up to 50) against `host`.
pub fn audit(base: &Path, host: &HostProfile, probe: Arc<dyn PortProbe>) -> Result<Vec<RepoSummary>> {
    if !base.is_dir() {
        return Err(FitError::NotADirectory(base.to_path_buf()));
    }
    let dirs = find_repos(base, DEFAULT_MAX_DEPTH, AUDIT_MAX_REPOS);
    Ok(check_all(&dirs, host, &probe)
        .iter()
        .map(|(dir, report)| RepoSummary::from_report(dir, report))
        .collect())
}

/// Scan every repository under `base` and aggregate the results.
pub fn fleet_scan(
    base: &Path,
    policy: &FleetPolicy,
    host: &HostProfile,
    probe: Arc<dyn PortProbe>,
) -> Result<FleetReport> {
    if !base.is_dir() {
        return Err(FitError::NotADirectory(base.to_path_buf()));
    }
    let dirs = find_repos(base, policy.max_depth, policy.max_repos);
    let checked = check_all(&dirs, host, &probe);

    let mut by_rule: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_cluster: BTreeMap<String, usize> = BTreeMap::new();
    let mut violations = 0;
    for (_, report) in &checked {
        for f in &report.findings {
            *by_rule.entry(f.rule_id.clone()).or_default() += 1;
            *by_cluster
                .entry(registry::cluster_of(&f.rule_id).to_string())
                .or_default() += 1;
        }
        if report
            .findings
            .iter()
            .any(|f| f.severity != Severity::Info && f.severity >= policy.fail_on)
        {
            violations += 1;
        }
    }

    let repos: Vec<RepoSummary> = checked
        .iter()
        .map(|(dir, report)| RepoSummary::from_report(dir, report))
        .collect();
    tracing::debug!(repos = repos.len(), violations, "fleet scan finished");

    Ok(FleetReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_repos_scanned: repos.len(),
        violations,
        repos,
        most_common_rules: top_counts(by_rule, TOP_RULES)
            .into_iter()
            .map(|(rule_id, count)| RuleCount { rule_id, count })
            .collect(),
        risk_clusters: top_counts(by_cluster, TOP_CLUSTERS)
            .into_iter()
            .map(|(cluster, count)| ClusterCount { cluster, count })
            .collect(),
        policy: policy.clone(),
    })
}

/// Highest counts first, ties by key.
fn top_counts(counts: BTreeMap<String, usize>, n: usize) -> Vec<(String, usize)> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// Check `repo` against the host described in `host_file`. Ports are never
/// reported busy: the described machine is not the one running the check.
pub fn simulate(repo: &Path, host_file: &Path, options: &CheckOptions) -> Result<CheckReport> {
    let host = HostProfile::load(host_file)?;
    let mut report = crate::check_with_host(repo, &host, Arc::new(NullPortProbe), options)?;
    report.simulated = true;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_repos_without_descending() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("alpha/pyproject.toml"), "[project]\nname = \"alpha\"\n");
        touch(&base.join("alpha/sub/package.json"), "{}");
        touch(&base.join("group/beta/Cargo.toml"), "[package]\nname = \"beta\"\n");
        touch(&base.join("node_modules/dep/package.json"), "{}");
        touch(&base.join(".hidden/requirements.txt"), "x\n");
        touch(&base.join("docs/readme.md"), "");

        let names: Vec<String> = find_repos(base, 4, 50)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn base_repo_comes_first_and_cap_applies() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        touch(&base.join("package.json"), "{}");
        touch(&base.join("a/requirements.txt"), "x\n");
        let found = find_repos(base, 4, 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], fs::canonicalize(base).unwrap());
    }

    #[test]
    fn depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/b/c/requirements.txt"), "x\n");
        assert!(find_repos(dir.path(), 2, 50).is_empty());
        assert_eq!(find_repos(dir.path(), 3, 50).len(), 1);
    }

    #[test]
    fn policy_yaml_is_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, "fail_on: MEDIUM\nmax_depth: 2\n").unwrap();
        let policy = FleetPolicy::load(Some(&path)).unwrap();
        assert_eq!(policy.fail_on, Severity::Medium);
        assert_eq!(policy.max_depth, 2);
        assert_eq!(policy.max_repos, 500);
        assert_eq!(FleetPolicy::load(None).unwrap(), FleetPolicy::default());

        fs::write(&path, "fail_on: catastrophic\n").unwrap();
        assert!(FleetPolicy::load(Some(&path)).is_err());
    }

    #[test]
    fn top_counts_break_ties_by_key() {
        let counts: BTreeMap<String, usize> = [("b", 2), ("a", 2), ("c", 5), ("d", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(
            top_counts(counts, 3),
            vec![("c".to_string(), 5), ("a".to_string(), 2), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn fleet_aggregates_rules_and_clusters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one", "two"] {
            touch(
                &dir.path().join(name).join("package.json"),
                r#"{"dependencies": {"express": "^4"}}"#,
            );
        }
        touch(&dir.path().join("three/requirements.txt"), "requests\n");

        let report = fleet_scan(
            dir.path(),
            &FleetPolicy::default(),
            &HostProfile::default(),
            Arc::new(NullPortProbe),
        )
        .unwrap();
        assert_eq!(report.total_repos_scanned, 3);
        assert_eq!(report.violations, 2);
        assert_eq!(
            report.most_common_rules[0],
            RuleCount {
                rule_id: "lock_file_missing".into(),
                count: 2
            }
        );
        assert_eq!(report.risk_clusters[0].cluster, "Lock file");
        assert!(chrono::DateTime::parse_from_rfc3339(&report.generated_at).is_ok());
    }

    #[test]
    fn simulate_reads_host_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            &dir.path().join("repo/pyproject.toml"),
            "[project]\nrequires-python = \">=3.10,<3.12\"\n",
        );
        let host_file = dir.path().join("host.json");
        fs::write(&host_file, r#"{"os": "linux", "python_version": "3.13.0"}"#).unwrap();

        let report = simulate(&dir.path().join("repo"), &host_file, &CheckOptions::default()).unwrap();
        assert!(report.simulated);
        assert_eq!(report.findings[0].rule_id, "python_version_mismatch");
        assert_eq!(report.score.probability, 55);
    }
}
