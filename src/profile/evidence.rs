use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Evidence extracted from dependency manifests (pyproject, requirements,
/// setup.py, package.json).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestEvidence {
    /// `requires-python` as declared by the project itself (pyproject or
    /// setup.py). Never filled from a container image.
    pub requires_python: Option<String>,
    /// Normalized Python package names, in declaration order, deduplicated.
    pub python_packages: Vec<String>,
    /// Version constraints for packages that compatibility rules inspect
    /// (`torch`, `torchao`).
    pub package_versions: BTreeMap<String, String>,
    /// TensorFlow version constraint, if pinned.
    pub tensorflow_version: Option<String>,
    pub node_manifests: Vec<NodeManifest>,
    /// Root-level files that document a native install/run path.
    pub native_entrypoints: Vec<String>,
}

impl ManifestEvidence {
    /// Whether any declared Python package name contains one of `needles`.
    pub fn packages_matching<'a>(&'a self, needles: &[&str]) -> Vec<&'a str> {
        self.python_packages
            .iter()
            .filter(|p| needles.iter().any(|n| p.contains(n)))
            .map(String::as_str)
            .collect()
    }
}

/// One `package.json` and the lock artifacts found beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeManifest {
    /// Path relative to the repository root.
    pub path: String,
    pub has_dependencies: bool,
    pub lock_files: Vec<String>,
}

impl NodeManifest {
    pub fn missing_lock(&self) -> bool {
        self.has_dependencies && self.lock_files.is_empty()
    }
}

/// Evidence from the container image the project ships or runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvidence {
    /// Python version pinned by the image (e.g. `3.11` from `python:3.11-slim`).
    pub python_version: Option<String>,
    pub base_image: Option<String>,
}

/// Evidence from CI workflow definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiEvidence {
    pub workflows: BTreeMap<String, WorkflowEvidence>,
}

impl CiEvidence {
    /// All Python versions named in any workflow matrix, with the workflow
    /// they came from.
    pub fn python_versions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.workflows.iter().flat_map(|(name, wf)| {
            wf.python_versions
                .iter()
                .map(move |v| (name.as_str(), v.as_str()))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEvidence {
    pub runs_on: Vec<String>,
    pub python_versions: Vec<String>,
    pub has_cuda: bool,
}
