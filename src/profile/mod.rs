//! Profiles: the only input contract of the rule engine.
//!
//! The scanner produces a `RepoProfile`, host inspection (or a host
//! description file) produces a `HostProfile`. Rules consume both and never
//! touch the filesystem themselves.

pub mod evidence;
pub mod host;

use serde::{Deserialize, Serialize};

pub use evidence::{CiEvidence, ContainerEvidence, ManifestEvidence, NodeManifest, WorkflowEvidence};
pub use host::HostProfile;

/// Declared and inferred runtime requirements of one repository.
///
/// Every signal has a defined default (`false`, `None`, empty), so rules can
/// read any field without checking for presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoProfile {
    pub path: String,
    pub name: String,

    /// Version-range specifier, e.g. `>=3.10,<3.12`.
    pub python_version: Option<String>,
    /// `engines.node` from package.json, e.g. `>=18`.
    pub node_engine_spec: Option<String>,

    pub has_pyproject: bool,
    pub has_requirements_txt: bool,
    pub has_setup_py: bool,
    pub has_package_json: bool,
    pub has_cargo_toml: bool,
    pub has_dockerfile: bool,
    pub has_devcontainer: bool,

    pub uses_torch: bool,
    pub uses_tensorflow: bool,
    pub requires_cuda: bool,
    /// A CPU fallback guard (`torch.cuda.is_available()`) was found.
    pub cuda_optional: bool,
    /// Packages with no CPU fallback (bitsandbytes, flash-attn, ...).
    pub cuda_mandatory_packages: Vec<String>,
    /// Named ML framework tags (`PEFT`, `Diffusers`, `Transformers`, ...).
    pub frameworks: Vec<String>,
    pub cuda_files: Vec<String>,
    pub cuda_usages: Vec<CudaUsage>,

    pub node_native_modules: Vec<String>,
    pub rust_system_libs: Vec<String>,
    /// Python build backends that compile native code (maturin, pybind11, ...).
    pub native_build_backends: Vec<String>,

    pub requires_libgl: bool,
    pub requires_ffmpeg: bool,

    pub dockerfile_has_cuda: bool,
    pub docker_platform_amd64: bool,
    pub required_ports: Vec<u16>,
    pub github_workflows: Vec<String>,
    pub os_specific: bool,
    pub node_lock_file_missing: bool,

    pub subprojects: Vec<Subproject>,

    pub manifest: ManifestEvidence,
    pub container: ContainerEvidence,
    pub ci: CiEvidence,
}

impl RepoProfile {
    /// Empty profile for a repository at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Display name, falling back to the path.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.path
        } else {
            &self.name
        }
    }

    pub fn has_framework(&self, name: &str) -> bool {
        self.frameworks.iter().any(|f| f == name)
    }

    pub fn subprojects_of(&self, kind: SubprojectKind) -> impl Iterator<Item = &Subproject> {
        self.subprojects.iter().filter(move |s| s.kind == kind)
    }
}

/// A project discovered inside the repository (monorepo support).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproject {
    /// Path relative to the repository root, `.` for the root itself.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: SubprojectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubprojectKind {
    Python,
    Node,
    Rust,
    Docker,
}

impl std::fmt::Display for SubprojectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Node => write!(f, "node"),
            Self::Rust => write!(f, "rust"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// A concrete GPU usage site found in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CudaUsage {
    pub file: String,
    /// 1-indexed; 0 when unknown.
    pub line: usize,
    pub kind: String,
}

impl std::fmt::Display for CudaUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "Found {} in {}:{}", self.kind, self.file, self.line)
        } else {
            write!(f, "{}: {}", self.file, self.kind)
        }
    }
}
