use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::builtin::SpecDriftPolicy;
use crate::rules::policy::Policy;
use crate::scoring::ScoringModel;

/// Default config file name, looked up in the scanned repository root.
pub const CONFIG_FILE: &str = ".hostfit.toml";

/// Top-level configuration from `.hostfit.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub scoring: ScoringModel,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub scan: ScanSettings,
}

/// Per-rule tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub spec_drift: SpecDriftPolicy,
}

/// Scanner bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Maximum manifest/config files parsed per repository.
    pub max_configs: usize,
    /// Maximum Python source files inspected for GPU usage.
    pub max_source_files: usize,
    /// Load declarative rules from the scanned repository.
    pub extensions: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_configs: 20,
            max_source_files: 100,
            extensions: true,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(file = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# hostfit configuration

[policy]
# Minimum severity that fails `hostfit scan --ci` (low, medium, high).
# INFO findings never fail.
fail_on = "high"

# Rule IDs to ignore entirely.
# ignore_rules = ["low_ram_multi_service"]

# Per-rule severity overrides.
# [policy.overrides]
# spec_drift = "medium"

[scoring]
# Penalty cap and probability floor used while a probabilistic HIGH
# finding (determinism below 1.0) is present.
max_penalty = 90
probabilistic_floor = 10

# [scoring.severity_weights]
# high = 45
# medium = 20
# low = 7
# info = 5

# Replaces the default table when present.
# [scoring.rule_weights]
# node_engine_mismatch = 50
# lock_file_missing = 40
# spec_drift = 25

# [scoring.rule_determinism]
# spec_drift = 0.6

[rules.spec_drift]
# Treat the CI test matrix as a declaration the container must fall inside.
ci_matrix_is_declaration = true
# Without a container Python pin there is nothing prescriptive to drift from.
require_container_pin = true

[scan]
max_configs = 20
max_source_files = 100
# Load .hostfit/rules.yaml or hostfit-rules.yaml from the scanned repository.
extensions = true
"#
    }
}
