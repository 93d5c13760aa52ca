use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};

const MAX_USAGES: usize = 8;

/// Repository needs CUDA, host has no NVIDIA GPU.
///
/// HIGH when the CUDA path is unconditional: CUDA-only packages, a CUDA base
/// image, or usage sites without an `is_available()` guard. MEDIUM when the
/// code appears to fall back to CPU.
pub struct TorchCudaMismatch;

impl Rule for TorchCudaMismatch {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "torch_cuda_mismatch".into(),
            name: "CUDA required, no GPU".into(),
            severity: Severity::High,
            category: Category::HardwareIncompatibility,
            description: "Repository executes CUDA code paths; host has no CUDA-capable GPU".into(),
            when: "Repo uses CUDA (device='cuda', torch.cuda, CUDA-only packages or an \
                   nvidia/cuda base image) and the host reports no NVIDIA GPU. MEDIUM when a \
                   torch.cuda.is_available() guard suggests a CPU fallback."
                .into(),
            fix: "Run on a machine with an NVIDIA GPU, or guard device selection with \
                  torch.cuda.is_available() and fall back to CPU/MPS."
                .into(),
            cluster: "ML/CUDA".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !repo.requires_cuda || host.cuda_available {
            return Ok(None);
        }

        let hardcoded = !repo.cuda_files.is_empty() && !repo.cuda_optional;
        let mandatory =
            !repo.cuda_mandatory_packages.is_empty() || repo.dockerfile_has_cuda || hardcoded;

        let mut usage: Vec<String> = if !repo.cuda_usages.is_empty() {
            repo.cuda_usages
                .iter()
                .take(MAX_USAGES)
                .map(ToString::to_string)
                .collect()
        } else {
            repo.cuda_files
                .iter()
                .take(5)
                .map(|f| format!("{f}: torch.cuda or device='cuda'"))
                .collect()
        };
        if repo.dockerfile_has_cuda {
            usage.push("Dockerfile: FROM nvidia/cuda or cuda installed".into());
        }
        if !repo.cuda_mandatory_packages.is_empty() {
            let pkgs: Vec<&str> = repo
                .cuda_mandatory_packages
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            usage.push(format!("deps: {}", pkgs.join(", ")));
        }

        let mut reason = format!(
            "Detected {}CUDA usage. Host reports no CUDA-capable GPU.",
            if mandatory { "hard-coded " } else { "" }
        );
        if mandatory {
            if !repo.cuda_optional && !repo.cuda_usages.is_empty() {
                reason.push_str(" No torch.cuda.is_available() guard detected.");
            }
            reason.push_str(" This will raise RuntimeError: CUDA unavailable.");
        } else {
            reason.push_str(" Code may have CPU fallback (conditional cuda check).");
        }

        let mut host_summary = format!("{} {}, no NVIDIA GPU", host.os, host.arch);
        if host.is_apple_silicon() {
            host_summary.push_str(" (Apple Silicon)");
        }

        Ok(Some(Finding {
            rule_id: "torch_cuda_mismatch".into(),
            severity: if mandatory {
                Severity::High
            } else {
                Severity::Medium
            },
            message: if mandatory {
                "Hard-coded CUDA execution path detected.".into()
            } else {
                "Repository uses CUDA; host has no GPU.".into()
            },
            reason,
            host_summary,
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("repo_cuda_usage", usage)
                .with("host_cuda", false)
                .with("cuda_mandatory", mandatory)
                .with("has_is_available_guard", repo.cuda_optional)
                .with("determinism", 1.0)
                .with("breakage_likelihood", "~100%")
                .with(
                    "likely_error",
                    "RuntimeError: CUDA error: no CUDA-capable device is detected",
                ),
            category: Some(Category::HardwareIncompatibility),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CudaUsage;

    fn cuda_repo() -> RepoProfile {
        RepoProfile {
            uses_torch: true,
            requires_cuda: true,
            cuda_optional: false,
            cuda_files: vec!["trainer.py".into()],
            cuda_usages: vec![CudaUsage {
                file: "trainer.py".into(),
                line: 12,
                kind: "device='cuda'".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn fires_high_for_unguarded_usage() {
        let f = TorchCudaMismatch
            .evaluate(&cuda_repo(), &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::High);
        let usage = f.evidence.get("repo_cuda_usage").unwrap().to_string();
        assert!(usage.contains("trainer.py:12"));
    }

    #[test]
    fn medium_with_cpu_fallback_guard() {
        let repo = RepoProfile {
            cuda_optional: true,
            ..cuda_repo()
        };
        let f = TorchCudaMismatch
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::Medium);
    }

    #[test]
    fn cuda_only_package_stays_high_despite_guard() {
        let repo = RepoProfile {
            cuda_optional: true,
            cuda_mandatory_packages: vec!["bitsandbytes".into()],
            ..cuda_repo()
        };
        let f = TorchCudaMismatch
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::High);
    }

    #[test]
    fn silent_when_host_has_cuda() {
        let host = HostProfile {
            cuda_available: true,
            ..Default::default()
        };
        assert!(TorchCudaMismatch
            .evaluate(&cuda_repo(), &host)
            .unwrap()
            .is_none());
    }

    #[test]
    fn silent_without_cuda_requirement() {
        let repo = RepoProfile {
            uses_torch: true,
            ..Default::default()
        };
        assert!(TorchCudaMismatch
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }
}
