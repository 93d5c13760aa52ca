//! Environment contracts: versioned runtime expectations of a repository,
//! checked later against any host.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::profile::{HostProfile, RepoProfile};
use crate::version;

pub const CONTRACT_VERSION: &str = "1";

/// RAM suggested for large-model frameworks.
const LARGE_MODEL_RAM_GB: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentContract {
    pub contract_version: String,
    pub generated_by: String,
    pub repo: String,
    #[serde(default)]
    pub requires: Requirements,
    #[serde(default)]
    pub optional: OptionalCapabilities,
}

/// Hard requirements. A host lacking any of them cannot run the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cuda: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub compiler: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub node: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub rust: bool,
}

/// Capabilities that help but are not required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionalCapabilities {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cuda: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<u32>,
}

/// A requirement the host does not meet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractViolation {
    pub requirement: String,
    pub reason: String,
}

impl ContractViolation {
    fn new(requirement: &str, reason: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            reason: reason.into(),
        }
    }
}

impl EnvironmentContract {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FitError::Config(format!(
                "contract file not found: {}",
                path.display()
            )));
        }
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Derive the contract a repository implies.
pub fn generate_contract(repo: &RepoProfile) -> EnvironmentContract {
    let mut requires = Requirements {
        python: repo.python_version.clone(),
        compiler: !repo.node_native_modules.is_empty()
            || repo.has_cargo_toml
            || !repo.rust_system_libs.is_empty(),
        node: repo.has_package_json,
        rust: repo.has_cargo_toml,
        ..Default::default()
    };
    let mut optional = OptionalCapabilities::default();

    if repo.uses_torch || repo.uses_tensorflow {
        if repo.requires_cuda && !repo.cuda_optional {
            requires.cuda = true;
        } else {
            optional.cuda = true;
        }
    }
    if repo.uses_torch && (repo.has_framework("Diffusers") || repo.has_framework("Transformers")) {
        optional.ram_gb = Some(LARGE_MODEL_RAM_GB);
    }

    EnvironmentContract {
        contract_version: CONTRACT_VERSION.into(),
        generated_by: format!("hostfit {}", env!("CARGO_PKG_VERSION")),
        repo: repo.display_name().to_string(),
        requires,
        optional,
    }
}

/// Check `host` against the contract's hard requirements.
pub fn validate_contract(contract: &EnvironmentContract, host: &HostProfile) -> Vec<ContractViolation> {
    let req = &contract.requires;
    let mut violations = Vec::new();

    if let Some(spec) = &req.python {
        match host.python_version.as_deref() {
            Some(v) if !version::python_satisfies(v, spec) => violations.push(
                ContractViolation::new("python", format!("Host Python {v} does not satisfy {spec}")),
            ),
            Some(_) => {}
            None => violations.push(ContractViolation::new(
                "python",
                format!("Python {spec} required but not found"),
            )),
        }
    }
    if req.cuda && !host.cuda_available {
        violations.push(ContractViolation::new("cuda", "CUDA required but not available"));
    }
    if req.compiler && !host.has_compiler {
        violations.push(ContractViolation::new(
            "compiler",
            "Compiler required for native builds",
        ));
    }
    if req.node && host.node_version.is_none() {
        violations.push(ContractViolation::new("node", "Node required but not found"));
    }
    if req.rust && host.rust_version.is_none() {
        violations.push(ContractViolation::new("rust", "Rust required but not found"));
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ml_repo() -> RepoProfile {
        RepoProfile {
            name: "diffuse".into(),
            python_version: Some(">=3.10,<3.12".into()),
            uses_torch: true,
            requires_cuda: true,
            frameworks: vec!["Diffusers".into()],
            ..Default::default()
        }
    }

    #[test]
    fn generates_requirements_from_profile() {
        let c = generate_contract(&ml_repo());
        assert_eq!(c.repo, "diffuse");
        assert_eq!(
            c.requires,
            Requirements {
                python: Some(">=3.10,<3.12".into()),
                cuda: true,
                ..Default::default()
            }
        );
        assert_eq!(c.optional.ram_gb, Some(16));
        assert!(!c.optional.cuda);
    }

    #[test]
    fn guarded_cuda_is_optional() {
        let repo = RepoProfile {
            cuda_optional: true,
            ..ml_repo()
        };
        let c = generate_contract(&repo);
        assert!(!c.requires.cuda);
        assert!(c.optional.cuda);
    }

    #[test]
    fn json_omits_unset_requirements() {
        let c = generate_contract(&RepoProfile {
            name: "plain".into(),
            ..Default::default()
        });
        let json: serde_json::Value = serde_json::from_str(&c.to_json().unwrap()).unwrap();
        assert_eq!(json["requires"], serde_json::json!({}));
        assert_eq!(json["contract_version"], "1");
        let back = EnvironmentContract::from_json_str(&c.to_json().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn validation_lists_each_unmet_requirement() {
        let contract = generate_contract(&RepoProfile {
            has_cargo_toml: true,
            ..ml_repo()
        });
        let host = HostProfile {
            python_version: Some("3.13.0".into()),
            has_compiler: false,
            ..Default::default()
        };
        let reqs: Vec<String> = validate_contract(&contract, &host)
            .into_iter()
            .map(|v| v.requirement)
            .collect();
        assert_eq!(reqs, vec!["python", "cuda", "compiler", "rust"]);
    }

    #[test]
    fn satisfied_host_has_no_violations() {
        let contract = generate_contract(&ml_repo());
        let host = HostProfile {
            python_version: Some("3.11.5".into()),
            cuda_available: true,
            ..Default::default()
        };
        assert!(validate_contract(&contract, &host).is_empty());
    }
}
