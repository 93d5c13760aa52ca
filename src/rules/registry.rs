use once_cell::sync::Lazy;

use super::{RuleEngine, RuleMetadata};

/// Cluster label for rules outside the built-in set (extension rules).
pub const DEFAULT_CLUSTER: &str = "Other";

static REGISTRY: Lazy<Vec<RuleMetadata>> = Lazy::new(|| RuleEngine::new().list_rules());

/// Metadata for every built-in rule, in declaration order.
pub fn all() -> &'static [RuleMetadata] {
    &REGISTRY
}

pub fn explain(rule_id: &str) -> Option<&'static RuleMetadata> {
    REGISTRY.iter().find(|m| m.id == rule_id)
}

/// Fleet risk-cluster label for a rule id.
pub fn cluster_of(rule_id: &str) -> &'static str {
    explain(rule_id)
        .map(|m| m.cluster.as_str())
        .unwrap_or(DEFAULT_CLUSTER)
}

/// Known rule ids closest to a mistyped one, nearest first.
pub fn suggest(rule_id: &str) -> Vec<&'static str> {
    let needle = rule_id.to_lowercase();
    let mut scored: Vec<(usize, &'static str)> = REGISTRY
        .iter()
        .map(|m| (levenshtein::levenshtein(&needle, &m.id), m.id.as_str()))
        .filter(|(d, id)| *d <= 4 || id.contains(needle.as_str()))
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, id)| id).collect()
}
