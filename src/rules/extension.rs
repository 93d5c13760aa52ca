//! Declarative rules shipped inside the repository under inspection.
//!
//! ```yaml
//! rules:
//!   - id: needs_gpu_box
//!     severity: high
//!     when:
//!       repo.uses_torch: true
//!       host.cuda_available: false
//!     message: "Training scripts assume a CUDA workstation."
//! ```
//!
//! Conditions are flat equality checks on dotted paths into the serialized
//! profiles. Keys outside `repo.` / `host.` are ignored; missing fields
//! resolve to null. Entries without an `id` or a `when` mapping are skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::registry::DEFAULT_CLUSTER;
use super::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};

/// Candidate rule files, relative to the repository root. First match wins.
pub const RULE_FILES: &[&str] = &[".hostfit/rules.yaml", "hostfit-rules.yaml"];

const MAX_MESSAGE_CHARS: usize = 200;
const DEFAULT_MESSAGE: &str = "Custom rule fired.";

/// One rule from a declarative rule file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarativeRule {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub reason: String,
    pub category: Option<Category>,
    pub confidence: Confidence,
    /// `(dotted path, expected value)`, in file order.
    pub when: Vec<(String, Value)>,
}

/// Locate the repository's rule file, if any.
pub fn find_rule_file(repo_path: &Path) -> Option<PathBuf> {
    RULE_FILES
        .iter()
        .map(|rel| repo_path.join(rel))
        .find(|p| p.is_file())
}

/// Load declarative rules for a repository. No file means no rules.
pub fn load(repo_path: &Path) -> Result<Vec<DeclarativeRule>> {
    let Some(path) = find_rule_file(repo_path) else {
        return Ok(Vec::new());
    };
    tracing::debug!(file = %path.display(), "loading extension rules");
    let content = std::fs::read_to_string(&path)?;
    parse(&content)
}

/// Parse a rule document: either a list of entries or `{ rules: [...] }`.
pub fn parse(content: &str) -> Result<Vec<DeclarativeRule>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)?;
    let entries: &[serde_yaml::Value] = match &doc {
        serde_yaml::Value::Sequence(seq) => seq.as_slice(),
        serde_yaml::Value::Mapping(map) => match map.get("rules") {
            Some(serde_yaml::Value::Sequence(seq)) => seq.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    Ok(entries.iter().filter_map(parse_entry).collect())
}

fn parse_entry(entry: &serde_yaml::Value) -> Option<DeclarativeRule> {
    let map = entry.as_mapping()?;
    let id = scalar_string(map.get("id")?)?;
    let when_map = map.get("when")?.as_mapping()?;

    let mut when = Vec::with_capacity(when_map.len());
    for (key, expected) in when_map {
        let key = scalar_string(key)?;
        let expected = serde_json::to_value(expected).ok()?;
        when.push((key, expected));
    }

    let text = |key: &str| map.get(key).and_then(scalar_string);

    let severity = text("severity")
        .and_then(|s| Severity::from_str_lenient(&s))
        .unwrap_or(Severity::Medium);
    let message = text("explanation")
        .or_else(|| text("message"))
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

    Some(DeclarativeRule {
        id,
        severity,
        message: message.chars().take(MAX_MESSAGE_CHARS).collect(),
        reason: text("reason").unwrap_or_default(),
        category: text("category").and_then(|c| Category::from_str_lenient(&c)),
        confidence: text("confidence")
            .and_then(|c| Confidence::from_str_lenient(&c))
            .unwrap_or(Confidence::High),
        when,
    })
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Walk a dotted path through a JSON value. Missing segments yield null.
fn resolve<'a>(root: &'a Value, path: &str) -> &'a Value {
    let mut current = root;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return &Value::Null,
        }
    }
    current
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) if actual.is_number() && expected.is_number() => a == b,
        _ => actual == expected,
    }
}

impl DeclarativeRule {
    fn matches(&self, repo: &Value, host: &Value) -> bool {
        self.when.iter().all(|(key, expected)| {
            let actual = if let Some(path) = key.strip_prefix("repo.") {
                resolve(repo, path)
            } else if let Some(path) = key.strip_prefix("host.") {
                resolve(host, path)
            } else {
                return true;
            };
            values_equal(actual, expected)
        })
    }

    fn describe_conditions(&self) -> String {
        self.when
            .iter()
            .map(|(k, v)| format!("{k} == {v}"))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl Rule for DeclarativeRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: self.id.clone(),
            name: self.id.clone(),
            severity: self.severity,
            category: self.category.unwrap_or(Category::RuntimeEnvironment),
            description: self.message.clone(),
            when: self.describe_conditions(),
            fix: String::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let repo_value = serde_json::to_value(repo)?;
        let host_value = serde_json::to_value(host)?;
        if !self.matches(&repo_value, &host_value) {
            return Ok(None);
        }

        let evidence = self
            .when
            .iter()
            .fold(Evidence::new(), |ev, (k, v)| ev.with(k, v.clone()));

        Ok(Some(Finding {
            rule_id: self.id.clone(),
            severity: self.severity,
            message: self.message.clone(),
            reason: self.reason.clone(),
            host_summary: host.platform(),
            confidence: self.confidence,
            evidence,
            category: self.category,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_list_and_wrapped_documents() {
        let list = "- id: a\n  when: {repo.uses_torch: true}\n";
        let wrapped = "rules:\n  - id: a\n    when: {repo.uses_torch: true}\n";
        assert_eq!(parse(list).unwrap(), parse(wrapped).unwrap());
        assert_eq!(parse(list).unwrap().len(), 1);
    }

    #[test]
    fn skips_malformed_entries() {
        let doc = r#"
- id: no_when
- when: {repo.uses_torch: true}
- id: bad_when
  when: [1, 2]
- just a string
- id: good
  when: {host.os: macos}
"#;
        let rules = parse(doc).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "good");
    }

    #[test]
    fn severity_and_message_defaults() {
        let doc = r#"
- id: a
  severity: catastrophic
  when: {}
- id: b
  severity: low
  explanation: "from explanation"
  message: "from message"
  when: {}
- id: c
  severity: HIGH
  when: {}
"#;
        let rules = parse(doc).unwrap();
        assert_eq!(rules[0].severity, Severity::Medium);
        assert_eq!(rules[0].message, "Custom rule fired.");
        assert_eq!(rules[1].severity, Severity::Low);
        assert_eq!(rules[1].message, "from explanation");
        assert_eq!(rules[2].severity, Severity::High);
    }

    #[test]
    fn message_is_truncated() {
        let long = "x".repeat(500);
        let doc = format!("- id: a\n  message: \"{long}\"\n  when: {{}}\n");
        assert_eq!(parse(&doc).unwrap()[0].message.len(), 200);
    }

    #[test]
    fn matches_dotted_paths_with_numeric_equality() {
        let doc = r#"
- id: low_ram_gpu
  when:
    repo.uses_torch: true
    host.ram_gb: 8
    host.cuda_version: null
    unrelated.key: whatever
    repo.manifest.requires_python: ">=3.10"
"#;
        let rule = parse(doc).unwrap().remove(0);
        let repo = RepoProfile {
            uses_torch: true,
            manifest: crate::profile::ManifestEvidence {
                requires_python: Some(">=3.10".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let host = HostProfile {
            ram_gb: Some(8.0),
            ..Default::default()
        };
        let finding = rule.evaluate(&repo, &host).unwrap().unwrap();
        assert_eq!(finding.rule_id, "low_ram_gpu");
        assert_eq!(finding.host_summary, "linux x86_64");

        let bigger = HostProfile {
            ram_gb: Some(32.0),
            ..Default::default()
        };
        assert!(rule.evaluate(&repo, &bigger).unwrap().is_none());
    }

    #[test]
    fn missing_field_never_equals_a_value() {
        let rule = parse("- id: a\n  when: {repo.no_such_field: true}\n")
            .unwrap()
            .remove(0);
        assert!(rule
            .evaluate(&RepoProfile::default(), &HostProfile::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn load_prefers_dot_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".hostfit")).unwrap();
        std::fs::write(
            dir.path().join(".hostfit/rules.yaml"),
            "- id: first\n  when: {}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("hostfit-rules.yaml"),
            "- id: second\n  when: {}\n",
        )
        .unwrap();
        let rules = load(dir.path()).unwrap();
        assert_eq!(rules[0].id, "first");
    }

    #[test]
    fn no_rule_file_means_no_rules() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse("rules: [unclosed").is_err());
    }
}
