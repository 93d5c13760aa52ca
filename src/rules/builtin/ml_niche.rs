use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// PEFT/LoRA adapters running on the MLX (Metal) backend.
pub struct LoraMlxScaling;

impl Rule for LoraMlxScaling {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "lora_mlx_scaling".into(),
            name: "LoRA scaling differs on MLX".into(),
            severity: Severity::Medium,
            category: Category::HardwareIncompatibility,
            description: "LoRA adapter scaling behaves differently on the MLX backend".into(),
            when: "The repo uses PEFT or LoRA and the host is a macOS Metal (MLX) machine \
                   without CUDA."
                .into(),
            fix: "Validate adapter outputs against a CUDA run, or pin the MLX LoRA \
                  implementation and its scaling parameters explicitly."
                .into(),
            cluster: "Other".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let lora = repo.has_framework("PEFT") || repo.frameworks.iter().any(|f| f.contains("LoRA"));
        if !lora || host.os != "macos" || !host.has_metal || host.cuda_available {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "lora_mlx_scaling".into(),
            severity: Severity::Medium,
            message: "LoRA scaling behavior differs on MLX backend.".into(),
            reason: "MLX DiT/PEFT path does not use PEFT hooks identically to CUDA path; scaling \
                     may differ."
                .into(),
            host_summary: "macOS arm64 (Metal/MLX), no NVIDIA GPU".into(),
            confidence: Confidence::High,
            evidence: Evidence::new().with("frameworks", repo.frameworks.clone()),
            category: Some(Category::HardwareIncompatibility),
        }))
    }
}

/// Whether a torch constraint only admits releases before 2.2.
fn torch_pinned_below_2_2(constraint: &str) -> bool {
    let admits_newer = (2..=40u64)
        .map(|minor| format!("2.{minor}.0"))
        .chain(std::iter::once("3.0.0".to_string()))
        .any(|v| version::python_satisfies(&v, constraint));
    !admits_newer
}

/// torchao 0.5+ alongside a torch pin older than 2.2.
pub struct TorchaoIncompatible;

impl Rule for TorchaoIncompatible {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "torchao_incompatible".into(),
            name: "torchao / torch version mismatch".into(),
            severity: Severity::Low,
            category: Category::SpecViolation,
            description: "torchao release needs a newer torch than the repo pins".into(),
            when: "torchao is a dependency (0.5 or newer, or unpinned) and torch is pinned \
                   below 2.2."
                .into(),
            fix: "Raise the torch pin to 2.2+ or pin torchao below 0.5.".into(),
            cluster: "Other".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, _host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.has_framework("torchao") || !repo.uses_torch {
            return Ok(None);
        }
        let versions = &repo.manifest.package_versions;
        let Some(torch) = versions.get("torch") else {
            return Ok(None);
        };
        if !torch_pinned_below_2_2(torch) {
            return Ok(None);
        }

        let torchao = versions.get("torchao");
        let torchao_new = match torchao.and_then(|c| version::major_minor(c)) {
            Some(mm) => mm >= (0, 5),
            None => true,
        };
        if !torchao_new {
            return Ok(None);
        }

        let mut evidence = Evidence::new().with("torch", torch.as_str());
        if let Some(c) = torchao {
            evidence.insert("torchao", c.as_str());
        }

        Ok(Some(Finding {
            rule_id: "torchao_incompatible".into(),
            severity: Severity::Low,
            message: "torchao installed but torch version may be incompatible.".into(),
            reason: format!("torchao 0.5.x requires torch 2.2+; repo pins torch {torch}."),
            host_summary: String::new(),
            confidence: Confidence::High,
            evidence,
            category: Some(Category::SpecViolation),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metal_mac() -> HostProfile {
        HostProfile {
            os: "macos".into(),
            arch: "arm64".into(),
            has_metal: true,
            ..Default::default()
        }
    }

    #[test]
    fn lora_on_metal_fires() {
        let repo = RepoProfile {
            frameworks: vec!["PEFT".into()],
            ..Default::default()
        };
        assert!(LoraMlxScaling.evaluate(&repo, &metal_mac()).unwrap().is_some());
        assert!(LoraMlxScaling
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }

    fn torchao_repo(torch: &str, torchao: Option<&str>) -> RepoProfile {
        let mut repo = RepoProfile {
            uses_torch: true,
            frameworks: vec!["torchao".into()],
            ..Default::default()
        };
        repo.manifest
            .package_versions
            .insert("torch".into(), torch.into());
        if let Some(v) = torchao {
            repo.manifest
                .package_versions
                .insert("torchao".into(), v.into());
        }
        repo
    }

    #[test]
    fn old_torch_with_new_torchao_fires() {
        let repo = torchao_repo("==2.1.*", Some(">=0.5"));
        let f = TorchaoIncompatible
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::Low);
        assert!(TorchaoIncompatible
            .evaluate(&torchao_repo("<2.2", None), &HostProfile::default())
            .unwrap()
            .is_some());
    }

    #[test]
    fn compatible_pins_are_silent() {
        for (torch, ao) in [(">=2.2,<2.4", Some("0.5.0")), ("==2.1.2", Some("==0.4.0"))] {
            assert!(TorchaoIncompatible
                .evaluate(&torchao_repo(torch, ao), &HostProfile::default())
                .unwrap()
                .is_none());
        }
    }
}
