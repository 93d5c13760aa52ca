pub mod builtin;
pub mod extension;
pub mod finding;
pub mod policy;
pub mod registry;

use std::path::Path;
use std::sync::Arc;

use crate::config::RulesConfig;
use crate::error::Result;
use crate::host::{LocalPortProbe, PortProbe};
use crate::profile::{HostProfile, RepoProfile};

pub use finding::{Category, Confidence, Evidence, Finding, RuleMetadata, Severity};

/// A rule compares one repository against one host.
///
/// `Ok(None)` means the rule does not apply or cannot judge. `Err` marks a
/// defect in the rule itself; the engine logs it and treats it as `None`.
pub trait Rule: Send + Sync {
    /// Static description (id, severity, category, fix).
    fn metadata(&self) -> RuleMetadata;

    /// Evaluate the rule. Never mutates or re-reads anything beyond the profiles.
    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>>;
}

/// Runs every registered rule against a profile pair.
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
    load_extensions: bool,
}

impl RuleEngine {
    /// Engine with all built-in rules, default tuning and the live port probe.
    pub fn new() -> Self {
        Self::from_config(&RulesConfig::default())
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::with_port_probe(config, Arc::new(LocalPortProbe::default()))
    }

    /// Built-in rules with an injected port probe (simulation, tests).
    pub fn with_port_probe(config: &RulesConfig, probe: Arc<dyn PortProbe>) -> Self {
        Self {
            rules: builtin::all_rules(config, probe),
            load_extensions: true,
        }
    }

    /// Engine over an explicit rule list. Extension loading is off.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self {
            rules,
            load_extensions: false,
        }
    }

    /// Toggle loading of declarative rules from the repository under inspection.
    pub fn extensions(mut self, enabled: bool) -> Self {
        self.load_extensions = enabled;
        self
    }

    /// Evaluate all rules, then any repository-local extension rules.
    ///
    /// Output is ordered HIGH, MEDIUM, LOW, INFO; ties keep registration
    /// order (built-ins in declaration order, then extensions in file order).
    pub fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .rules
            .iter()
            .filter_map(|rule| run_isolated(rule.as_ref(), repo, host))
            .collect();

        if self.load_extensions && !repo.path.is_empty() {
            match extension::load(Path::new(&repo.path)) {
                Ok(extra) => findings.extend(
                    extra
                        .iter()
                        .filter_map(|rule| run_isolated(rule, repo, host)),
                ),
                Err(e) => {
                    tracing::warn!(repo = %repo.path, error = %e, "failed to load extension rules");
                }
            }
        }

        sort_findings(&mut findings);
        findings
    }

    /// List metadata for all registered rules.
    pub fn list_rules(&self) -> Vec<RuleMetadata> {
        self.rules.iter().map(|r| r.metadata()).collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn run_isolated(rule: &dyn Rule, repo: &RepoProfile, host: &HostProfile) -> Option<Finding> {
    match rule.evaluate(repo, host) {
        Ok(finding) => finding,
        Err(e) => {
            tracing::warn!(rule = %rule.metadata().id, error = %e, "rule failed; skipping");
            None
        }
    }
}

/// Stable sort by severity rank. Equal severities keep their relative order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by_key(|f| f.severity.rank());
}
