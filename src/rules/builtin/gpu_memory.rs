use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};

/// Frameworks that usually load multi-gigabyte checkpoints.
const LARGE_MODEL_FRAMEWORKS: &[&str] = &["Diffusers", "Transformers", "PEFT"];

/// Recommended RAM for large-model frameworks.
const RAM_THRESHOLD_GB: f64 = 16.0;
/// Below this the shortfall is severe.
const RAM_SEVERE_GB: f64 = 8.0;

/// Large-model frameworks on a host with little memory.
pub struct GpuMemoryRisk;

impl Rule for GpuMemoryRisk {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "gpu_memory_risk".into(),
            name: "Insufficient memory for large models".into(),
            severity: Severity::Medium,
            category: Category::HardwareIncompatibility,
            description: "Large-model frameworks on a host with limited RAM".into(),
            when: "The repo uses torch with Diffusers, Transformers or PEFT and the host has \
                   less than 16 GB RAM (MEDIUM below 8 GB, LOW otherwise)."
                .into(),
            fix: "Use a smaller checkpoint, enable quantization or offloading, or run on a \
                  machine with at least 16 GB RAM."
                .into(),
            cluster: "ML/RAM".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.uses_torch {
            return Ok(None);
        }
        let detected: Vec<&str> = LARGE_MODEL_FRAMEWORKS
            .iter()
            .copied()
            .filter(|f| repo.has_framework(f))
            .collect();
        if detected.is_empty() {
            return Ok(None);
        }
        let Some(ram) = host.ram_gb else {
            return Ok(None);
        };
        if ram >= RAM_THRESHOLD_GB {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "gpu_memory_risk".into(),
            severity: if ram < RAM_SEVERE_GB {
                Severity::Medium
            } else {
                Severity::Low
            },
            message: format!("Repo uses large-model frameworks; host has {ram:.0} GB RAM."),
            reason: format!(
                "Detected {}; recommend >= {RAM_THRESHOLD_GB:.0} GB",
                detected.join(", ")
            ),
            host_summary: format!("{}, {ram:.0} GB RAM", host.platform()),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("frameworks", detected)
                .with("ram_gb", ram)
                .with("threshold_gb", RAM_THRESHOLD_GB),
            category: Some(Category::HardwareIncompatibility),
        }))
    }
}
