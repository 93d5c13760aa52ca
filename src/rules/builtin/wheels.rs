use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};
use crate::version;

/// Packages that often lack prebuilt arm64 wheels for new interpreters.
const ARM64_LAGGING: &[&str] = &[
    "bitsandbytes",
    "torchvision",
    "opencv-python",
    "opencv-contrib-python",
    "opencv",
    "xformers",
    "pytorch3d",
];

/// Packages with x86-only (or CUDA-only) wheels.
const X86_ONLY: &[&str] = &[
    "cuda-python",
    "nvidia-cuda-runtime-cu",
    "nvidia-cudnn-cu",
    "nvidia-cublas-cu",
    "nvidia-cufft-cu",
    "nvidia-curand-cu",
    "nvidia-cusolver-cu",
    "nvidia-cusparse-cu",
    "nvidia-nccl-cu",
    "nvidia-nvtx-cu",
    "nvidia-nvjitlink-cu",
    "horovod",
    "faiss-gpu",
    "faiss-cpu",
    "faiss",
];

/// First TensorFlow release with native arm64 macOS wheels.
const TF_ARM64_MINOR: u64 = 11;

/// arm64 macOS, Python 3.12+, and dependencies whose wheels lag behind.
pub struct AbiWheelMismatch;

impl Rule for AbiWheelMismatch {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "abi_wheel_mismatch".into(),
            name: "Binary wheel mismatch (arm64 + new Python)".into(),
            severity: Severity::High,
            category: Category::ArchitectureMismatch,
            description: "Dependencies likely lack arm64 wheels for the host interpreter".into(),
            when: "Host is macOS arm64 with Python 3.12 or newer and the repo depends on \
                   packages that historically lag arm64 wheels (bitsandbytes, torchvision, \
                   opencv, xformers, pytorch3d)."
                .into(),
            fix: "Use Python 3.11 for this project, or install the LLVM toolchain so source \
                  builds can succeed."
                .into(),
            cluster: "ML/ARM".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !host.is_apple_silicon() {
            return Ok(None);
        }
        let Some(host_py) = host.python_version.as_deref() else {
            return Ok(None);
        };
        match version::major_minor(host_py) {
            Some(mm) if mm >= (3, 12) => {}
            _ => return Ok(None),
        }

        let found = repo.manifest.packages_matching(ARM64_LAGGING);
        let Some(first) = found.first() else {
            return Ok(None);
        };

        Ok(Some(Finding {
            rule_id: "abi_wheel_mismatch".into(),
            severity: Severity::High,
            message: "Likely binary wheel mismatch (arm64 + Python 3.12+).".into(),
            reason: format!(
                "macOS arm64, Python {host_py}, dependency: {first}. {first} often lacks wheels \
                 for arm64 on Python 3.12+. Source build may fail without the LLVM toolchain."
            ),
            host_summary: format!("macOS arm64, Python {host_py}"),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("host_os_arch", "macOS arm64")
                .with("host_python", host_py)
                .with(
                    "problematic_packages",
                    found.iter().take(5).copied().collect::<Vec<_>>(),
                )
                .with("expected_failure", "pip install error or runtime import error"),
            category: Some(Category::ArchitectureMismatch),
        }))
    }
}

/// TensorFlow constraint that only admits releases before native arm64 wheels.
fn tensorflow_predates_arm64(constraint: &str) -> bool {
    let newer = (TF_ARM64_MINOR..=40)
        .map(|minor| format!("2.{minor}.0"))
        .chain(std::iter::once("3.0.0".to_string()));
    let admits_newer = newer
        .into_iter()
        .any(|v| version::python_satisfies(&v, constraint));
    !admits_newer
}

/// x86-only wheels or amd64 container images on Apple Silicon.
pub struct AppleSiliconWheels;

impl Rule for AppleSiliconWheels {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "apple_silicon_wheels".into(),
            name: "Apple Silicon wheels unavailable".into(),
            severity: Severity::High,
            category: Category::ArchitectureMismatch,
            description: "Dependencies or container image target x86 only".into(),
            when: "Host is macOS arm64 and the repo depends on x86-only packages (NVIDIA CUDA \
                   wheels, horovod, faiss), pins TensorFlow below 2.11, or builds its \
                   Dockerfile with --platform=linux/amd64. HIGH for CUDA/faiss packages or \
                   amd64 images, MEDIUM otherwise."
                .into(),
            fix: "Swap x86-only packages for arm64 builds (faiss via conda, tensorflow-macos), \
                  or drop the amd64 platform pin."
                .into(),
            cluster: "ML/ARM".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if !host.is_apple_silicon() {
            return Ok(None);
        }

        let mut reasons = Vec::new();
        let mut evidence = Evidence::new().with("host", "macOS arm64");

        let found = repo.manifest.packages_matching(X86_ONLY);
        if !found.is_empty() {
            let shown: Vec<&str> = found.iter().take(5).copied().collect();
            reasons.push(format!("Packages: {}", shown.join(", ")));
            evidence.insert("problematic_packages", shown);
        }

        let tf_old = repo.uses_tensorflow
            && repo
                .manifest
                .tensorflow_version
                .as_deref()
                .is_some_and(tensorflow_predates_arm64);
        if tf_old {
            reasons.push("tensorflow < 2.11 (no native arm64 wheels)".to_string());
            evidence.insert("tensorflow_old", true);
        }

        if repo.docker_platform_amd64 {
            reasons.push("Dockerfile uses --platform=linux/amd64".to_string());
            evidence.insert("docker_platform", "amd64");
        }

        if reasons.is_empty() {
            return Ok(None);
        }

        let severe = repo.docker_platform_amd64
            || found.iter().any(|p| p.contains("cuda") || p.contains("faiss"));

        Ok(Some(Finding {
            rule_id: "apple_silicon_wheels".into(),
            severity: if severe {
                Severity::High
            } else {
                Severity::Medium
            },
            message: "Apple Silicon wheel likely unavailable or Docker targets amd64.".into(),
            reason: format!(
                "{}. Installation may require emulation or fail.",
                reasons.join("; ")
            ),
            host_summary: "macOS arm64 (Apple Silicon)".into(),
            confidence: Confidence::High,
            evidence,
            category: Some(Category::ArchitectureMismatch),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(py: &str) -> HostProfile {
        HostProfile {
            os: "macos".into(),
            arch: "arm64".into(),
            python_version: Some(py.into()),
            ..Default::default()
        }
    }

    fn with_packages(packages: &[&str]) -> RepoProfile {
        let mut repo = RepoProfile::default();
        repo.manifest.python_packages = packages.iter().map(|p| p.to_string()).collect();
        repo
    }

    #[test]
    fn abi_fires_on_312_with_lagging_package() {
        let f = AbiWheelMismatch
            .evaluate(&with_packages(&["torch", "torchvision"]), &mac("3.12.1"))
            .unwrap()
            .unwrap();
        assert!(f.reason.contains("torchvision"));
    }

    #[test]
    fn abi_silent_on_311_or_linux() {
        let repo = with_packages(&["torchvision"]);
        assert!(AbiWheelMismatch.evaluate(&repo, &mac("3.11.5")).unwrap().is_none());
        let linux = HostProfile {
            python_version: Some("3.12.0".into()),
            ..Default::default()
        };
        assert!(AbiWheelMismatch.evaluate(&repo, &linux).unwrap().is_none());
    }

    #[test]
    fn apple_silicon_fires_high_on_cuda_wheels() {
        let f = AppleSiliconWheels
            .evaluate(
                &with_packages(&["nvidia-cuda-runtime-cu11", "torch"]),
                &mac("3.11.5"),
            )
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::High);
    }

    #[test]
    fn apple_silicon_medium_for_old_tensorflow() {
        let mut repo = with_packages(&["tensorflow"]);
        repo.uses_tensorflow = true;
        repo.manifest.tensorflow_version = Some("<2.11".into());
        let f = AppleSiliconWheels
            .evaluate(&repo, &mac("3.10.0"))
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::Medium);

        repo.manifest.tensorflow_version = Some(">=2.13".into());
        assert!(AppleSiliconWheels
            .evaluate(&repo, &mac("3.10.0"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn apple_silicon_silent_on_linux() {
        let repo = with_packages(&["nvidia-cuda-runtime-cu11"]);
        assert!(AppleSiliconWheels
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }
}
