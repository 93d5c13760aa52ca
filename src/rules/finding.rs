use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A compatibility problem produced by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule identifier (e.g., "python_version_mismatch").
    pub rule_id: String,
    pub severity: Severity,
    /// One-line statement of the problem.
    pub message: String,
    /// Why the repository and host disagree.
    pub reason: String,
    /// Host side of the mismatch, e.g. "Host Python: 3.13.0".
    pub host_summary: String,
    /// How certain the rule is that this will actually break the run.
    #[serde(default = "default_confidence")]
    pub confidence: Confidence,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

fn default_confidence() -> Confidence {
    Confidence::High
}

/// Ordered `HIGH > MEDIUM > LOW > INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" | "warn" | "warning" => Some(Self::Medium),
            "high" | "error" => Some(Self::High),
            _ => None,
        }
    }

    /// Sort rank: HIGH=0 ... INFO=3.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
            Self::Info => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SpecViolation,
    HardwareIncompatibility,
    ToolchainMissing,
    RuntimeEnvironment,
    ArchitectureMismatch,
}

impl Category {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "spec_violation" => Some(Self::SpecViolation),
            "hardware_incompatibility" => Some(Self::HardwareIncompatibility),
            "toolchain_missing" => Some(Self::ToolchainMissing),
            "runtime_environment" => Some(Self::RuntimeEnvironment),
            "architecture_mismatch" => Some(Self::ArchitectureMismatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpecViolation => write!(f, "Spec Violation"),
            Self::HardwareIncompatibility => write!(f, "Hardware Incompatibility"),
            Self::ToolchainMissing => write!(f, "Toolchain Missing"),
            Self::RuntimeEnvironment => write!(f, "Runtime Environment"),
            Self::ArchitectureMismatch => write!(f, "Architecture Mismatch"),
        }
    }
}

/// Structured key/value evidence. Keys are kept sorted so serialized reports
/// are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Evidence(BTreeMap<String, Value>);

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Static description of a rule, used by `explain`, `list-rules` and the
/// fleet risk clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
    /// When the rule triggers, in prose.
    pub when: String,
    /// Suggested fix.
    pub fix: String,
    /// Fleet risk-cluster label (`ML/CUDA`, `Python`, `Node`, ...).
    pub cluster: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_high_first() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::High.rank(), 0);
        assert_eq!(Severity::Info.rank(), 3);
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(Severity::from_str_lenient(" HIGH "), Some(Severity::High));
        assert_eq!(Severity::from_str_lenient("warning"), Some(Severity::Medium));
        assert_eq!(Severity::from_str_lenient("critical"), None);
        assert_eq!(
            Category::from_str_lenient("runtime-environment"),
            Some(Category::RuntimeEnvironment)
        );
    }

    #[test]
    fn evidence_serializes_as_flat_sorted_map() {
        let ev = Evidence::new().with("zeta", 1).with("alpha", "a");
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"alpha":"a","zeta":1}"#);
    }
}
