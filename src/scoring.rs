//! Reduces findings to a bounded success probability and a confidence label.
//!
//! Each finding costs `weight × confidence multiplier × determinism` points.
//! When every HIGH finding is deterministic the probability may reach 0.
//! A probabilistic HIGH finding (determinism < 1) caps the penalty and keeps
//! the probability off the floor, unless the remaining findings alone
//! already push it lower.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::{Confidence, Finding, Severity};

/// Penalty per severity when no per-rule weight applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub info: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            high: 45.0,
            medium: 20.0,
            low: 7.0,
            info: 5.0,
        }
    }
}

impl SeverityWeights {
    pub fn get(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceMultipliers {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceMultipliers {
    fn default() -> Self {
        Self {
            high: 1.0,
            medium: 0.75,
            low: 0.5,
        }
    }
}

impl ConfidenceMultipliers {
    pub fn get(&self, confidence: Confidence) -> f64 {
        match confidence {
            Confidence::High => self.high,
            Confidence::Medium => self.medium,
            Confidence::Low => self.low,
        }
    }
}

/// Weight tables used by the scorer. Loaded from `[scoring]` in
/// `.hostfit.toml`; every field defaults to the calibrated constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringModel {
    pub severity_weights: SeverityWeights,
    /// Per-rule weight, replacing the severity weight.
    pub rule_weights: BTreeMap<String, f64>,
    /// Per-rule determinism in `[0, 1]`; missing rules are fully deterministic.
    pub rule_determinism: BTreeMap<String, f64>,
    pub confidence_multipliers: ConfidenceMultipliers,
    /// Penalty cap applied when a probabilistic HIGH finding is present.
    pub max_penalty: f64,
    /// Lowest probability reported while a probabilistic HIGH finding is present.
    pub probabilistic_floor: f64,
}

impl Default for ScoringModel {
    fn default() -> Self {
        let rule_weights = [
            ("node_engine_mismatch", 50.0),
            ("lock_file_missing", 40.0),
            ("spec_drift", 25.0),
        ]
        .into_iter()
        .map(|(id, w)| (id.to_string(), w))
        .collect();

        let rule_determinism = [("spec_drift".to_string(), 0.6)].into_iter().collect();

        Self {
            severity_weights: SeverityWeights::default(),
            rule_weights,
            rule_determinism,
            confidence_multipliers: ConfidenceMultipliers::default(),
            max_penalty: 90.0,
            probabilistic_floor: 10.0,
        }
    }
}

/// Result of scoring one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Estimated run success probability, `0..=100`.
    pub probability: u8,
    pub confidence: Confidence,
    /// Rules whose findings are individually low-confidence.
    pub low_confidence_rules: Vec<String>,
}

impl ScoringModel {
    pub fn weight(&self, finding: &Finding) -> f64 {
        self.rule_weights
            .get(&finding.rule_id)
            .copied()
            .unwrap_or_else(|| self.severity_weights.get(finding.severity))
            .max(0.0)
    }

    pub fn determinism(&self, rule_id: &str) -> f64 {
        self.rule_determinism
            .get(rule_id)
            .copied()
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }

    pub fn penalty(&self, finding: &Finding) -> f64 {
        self.weight(finding)
            * self.confidence_multipliers.get(finding.confidence).max(0.0)
            * self.determinism(&finding.rule_id)
    }

    fn is_probabilistic_high(&self, finding: &Finding) -> bool {
        finding.severity == Severity::High && self.determinism(&finding.rule_id) < 1.0
    }

    /// Success probability in `[0, 100]`. Adding a finding never raises it.
    pub fn probability(&self, findings: &[Finding]) -> u8 {
        if findings.is_empty() {
            return 100;
        }

        let total: f64 = findings.iter().map(|f| self.penalty(f)).sum();
        if !findings.iter().any(|f| self.is_probabilistic_high(f)) {
            return clamp_percent((100.0 - total).round_ties_even());
        }

        // Penalty from everything except the probabilistic HIGH findings.
        // The cap and floor only ever soften what those findings add.
        let deterministic: f64 = findings
            .iter()
            .filter(|f| !self.is_probabilistic_high(f))
            .map(|f| self.penalty(f))
            .sum();

        let effective = total.min(self.max_penalty.max(deterministic));
        let mut raw = (100.0 - effective).round_ties_even();
        if deterministic < 100.0 - self.probabilistic_floor {
            raw = raw.max(self.probabilistic_floor);
        }
        clamp_percent(raw)
    }

    /// Aggregate confidence label plus the ids of low-confidence findings.
    pub fn confidence(&self, findings: &[Finding]) -> (Confidence, Vec<String>) {
        if findings.is_empty() {
            return (Confidence::High, Vec::new());
        }

        let has_high = findings.iter().any(|f| f.severity == Severity::High);
        let high_conf = findings
            .iter()
            .filter(|f| f.confidence == Confidence::High)
            .count();

        let aggregate = if has_high || high_conf as f64 >= findings.len() as f64 * 0.8 {
            Confidence::High
        } else if findings.len() >= 3 || high_conf >= 1 {
            Confidence::Medium
        } else {
            Confidence::Low
        };

        let low = findings
            .iter()
            .filter(|f| f.confidence == Confidence::Low)
            .map(|f| f.rule_id.clone())
            .collect();

        (aggregate, low)
    }

    pub fn score(&self, findings: &[Finding]) -> RiskScore {
        let (confidence, low_confidence_rules) = self.confidence(findings);
        RiskScore {
            probability: self.probability(findings),
            confidence,
            low_confidence_rules,
        }
    }
}

fn clamp_percent(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0) as u8
}

/// Score with the default model.
pub fn score(findings: &[Finding]) -> RiskScore {
    ScoringModel::default().score(findings)
}
