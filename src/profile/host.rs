use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Capabilities of the executing (or simulated) machine.
///
/// `os` is one of `macos`, `linux`, `windows`; `arch` is `arm64` or `x86_64`.
/// Optional fields are `None` when the probe could not answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default)]
    pub cuda_available: bool,
    #[serde(default)]
    pub cuda_version: Option<String>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub node_version: Option<String>,
    #[serde(default)]
    pub rust_version: Option<String>,
    #[serde(default = "default_has_compiler")]
    pub has_compiler: bool,
    #[serde(default)]
    pub has_metal: bool,
    #[serde(default)]
    pub has_libgl: bool,
    #[serde(default)]
    pub has_ffmpeg: bool,
    #[serde(default)]
    pub ram_gb: Option<f64>,
}

fn default_os() -> String {
    "linux".into()
}

fn default_arch() -> String {
    "x86_64".into()
}

fn default_has_compiler() -> bool {
    true
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            os: default_os(),
            arch: default_arch(),
            cuda_available: false,
            cuda_version: None,
            python_version: None,
            node_version: None,
            rust_version: None,
            has_compiler: default_has_compiler(),
            has_metal: false,
            has_libgl: false,
            has_ffmpeg: false,
            ram_gb: None,
        }
    }
}

impl HostProfile {
    pub fn is_apple_silicon(&self) -> bool {
        self.os == "macos" && self.arch == "arm64"
    }

    /// `linux x86_64`, `macos arm64`, ...
    pub fn platform(&self) -> String {
        format!("{} {}", self.os, self.arch)
    }

    /// One-line description used in report headers.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.platform()];
        if self.cuda_available {
            parts.push(format!(
                "CUDA {}",
                self.cuda_version.as_deref().unwrap_or("available")
            ));
        } else {
            parts.push("no NVIDIA GPU".into());
        }
        if self.has_metal && self.os == "macos" {
            parts.push("Metal (MLX) available".into());
        }
        if let Some(ram) = self.ram_gb {
            parts.push(format!("{ram:.0} GB RAM"));
        }
        parts.join(", ")
    }

    /// Parse a host description. Accepts a bare host object or a JSON report
    /// that carries the host under a `host` key.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let host = match value.get("host") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => value,
        };
        if !host.is_object() {
            return Err(FitError::HostDescription(
                "expected a JSON object describing the host".into(),
            ));
        }
        Ok(serde_json::from_value(host)?)
    }

    /// Load a host description file (simulation mode).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FitError::HostDescription(format!(
                "host file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
