use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::rules::{registry, Finding, Severity};
use crate::CheckReport;

use serde_json::{json, Value};

/// Render a report as SARIF 2.1.0.
///
/// Findings have no source location of their own; results point at the
/// evidence `file` when a rule recorded one. Each result carries a
/// fingerprint that is stable across runs so code-scanning dashboards can
/// track it.
pub fn render(report: &CheckReport) -> Result<String> {
    let findings = &report.findings;

    let mut first_by_rule: BTreeMap<&str, &Finding> = BTreeMap::new();
    for f in findings {
        first_by_rule.entry(f.rule_id.as_str()).or_insert(f);
    }
    let rules: Vec<Value> = first_by_rule
        .into_iter()
        .map(|(rule_id, finding)| match registry::explain(rule_id) {
            Some(meta) => json!({
                "id": meta.id,
                "name": meta.name,
                "shortDescription": { "text": meta.name },
                "fullDescription": { "text": meta.description },
                "help": { "text": meta.fix },
                "defaultConfiguration": {
                    "level": severity_to_sarif_level(meta.severity),
                },
                "properties": { "tags": [meta.category.to_string(), meta.cluster] },
            }),
            None => json!({
                "id": rule_id,
                "shortDescription": { "text": finding.message },
                "defaultConfiguration": {
                    "level": severity_to_sarif_level(finding.severity),
                },
            }),
        })
        .collect();

    let results: Vec<Value> = findings
        .iter()
        .map(|f| {
            let mut result = json!({
                "ruleId": f.rule_id,
                "level": severity_to_sarif_level(f.severity),
                "message": { "text": format!("{} {}", f.message, f.reason).trim().to_string() },
                "partialFingerprints": {
                    "hostfit/v1": fingerprint(f, &report.repo.path),
                },
                "properties": {
                    "confidence": f.confidence.to_string(),
                    "hostSummary": f.host_summary,
                },
            });

            if let Some(file) = f.evidence.get("file").and_then(Value::as_str) {
                result["locations"] = json!([{
                    "physicalLocation": {
                        "artifactLocation": { "uri": file },
                    },
                }]);
            }

            result
        })
        .collect();

    let sarif = json!({
        "$schema": "https://docs.oasis-open.org/sarif/sarif/v2.1.0/errata01/os/schemas/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "hostfit",
                    "version": env!("CARGO_PKG_VERSION"),
                    "semanticVersion": env!("CARGO_PKG_VERSION"),
                    "rules": rules,
                },
            },
            "results": results,
            "automationDetails": {
                "id": format!("hostfit/{}", report.repo.display_name()),
                "guid": uuid::Uuid::new_v4().to_string(),
            },
            "properties": {
                "estimatedSuccessProbability": report.score.probability,
                "host": report.host.summary(),
            },
        }],
    });

    let output = serde_json::to_string_pretty(&sarif)?;
    Ok(output)
}

/// SHA-256 over rule id, repository path and message.
fn fingerprint(finding: &Finding, repo_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(finding.rule_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(repo_path.as_bytes());
    hasher.update(b"\0");
    hasher.update(finding.message.as_bytes());
    hex::encode(hasher.finalize())
}

fn severity_to_sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}
