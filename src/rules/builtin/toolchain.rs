use crate::error::Result;
use crate::profile::{HostProfile, RepoProfile};
use crate::rules::{Category, Confidence, Evidence, Finding, Rule, RuleMetadata, Severity};

/// Python build backends that compile Rust.
const RUST_BACKENDS: &[&str] = &["maturin", "setuptools-rust"];

/// Native extension present, compiler or Rust toolchain missing.
pub struct NativeToolchainMissing;

impl Rule for NativeToolchainMissing {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "native_toolchain_missing".into(),
            name: "Native build toolchain missing".into(),
            severity: Severity::High,
            category: Category::ToolchainMissing,
            description: "Native extensions must be compiled but the toolchain is absent".into(),
            when: "The repo builds native code (Cargo.toml, maturin/setuptools-rust, pybind11, \
                   node-gyp modules) and the host lacks rustc (HIGH) or a C compiler (MEDIUM)."
                .into(),
            fix: "Install rustup for Rust builds, or a C toolchain (build-essential, Xcode \
                  Command Line Tools, MSVC Build Tools)."
                .into(),
            cluster: "Native build".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let backends = &repo.native_build_backends;
        let has_native = !repo.node_native_modules.is_empty()
            || !repo.rust_system_libs.is_empty()
            || repo.has_cargo_toml
            || !backends.is_empty();
        if !has_native {
            return Ok(None);
        }

        let needs_rust =
            repo.has_cargo_toml || backends.iter().any(|b| RUST_BACKENDS.contains(&b.as_str()));
        if needs_rust && host.rust_version.is_some() {
            return Ok(None);
        }
        if !needs_rust && host.has_compiler {
            return Ok(None);
        }

        let mut reasons = Vec::new();
        if !repo.node_native_modules.is_empty() {
            let shown: Vec<&str> = repo
                .node_native_modules
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            reasons.push(format!("Node native: {}", shown.join(", ")));
        }
        if repo.has_cargo_toml || !repo.rust_system_libs.is_empty() {
            reasons.push("Cargo.toml / Rust".to_string());
        }
        if !backends.is_empty() {
            reasons.push(format!("Build backends: {}", backends.join(", ")));
        }
        if repo.has_setup_py {
            reasons.push("setup.py with C extensions".to_string());
        }

        Ok(Some(Finding {
            rule_id: "native_toolchain_missing".into(),
            severity: if needs_rust {
                Severity::High
            } else {
                Severity::Medium
            },
            message: "Native extension detected but required toolchain missing.".into(),
            reason: format!("{}. Build will fail during installation.", reasons.join("; ")),
            host_summary: host.platform(),
            confidence: Confidence::High,
            evidence: Evidence::new()
                .with("has_cargo", repo.has_cargo_toml)
                .with("native_build_backends", backends.clone())
                .with("host_has_compiler", host.has_compiler)
                .with("host_rust", host.rust_version.is_some()),
            category: Some(Category::ToolchainMissing),
        }))
    }
}

/// node-gyp style modules on a Windows host.
pub struct NodeNativeWindows;

impl Rule for NodeNativeWindows {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "node_native_windows".into(),
            name: "Node native modules on Windows".into(),
            severity: Severity::Medium,
            category: Category::ToolchainMissing,
            description: "Node native bindings frequently fail to build on Windows".into(),
            when: "Host is Windows and package.json depends on node-gyp, nan, \
                   node-addon-api or similar native binding packages."
                .into(),
            fix: "Install Visual Studio Build Tools with the C++ workload and Python, or use \
                  WSL2."
                .into(),
            cluster: "Node/Windows".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        if host.os != "windows" || repo.node_native_modules.is_empty() {
            return Ok(None);
        }
        let shown: Vec<&str> = repo
            .node_native_modules
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();

        Ok(Some(Finding {
            rule_id: "node_native_windows".into(),
            severity: Severity::Medium,
            message: "Node native modules often fail to build on Windows.".into(),
            reason: format!("Packages: {}", shown.join(", ")),
            host_summary: "Windows".into(),
            confidence: Confidence::High,
            evidence: Evidence::new().with("node_native_modules", shown),
            category: Some(Category::ToolchainMissing),
        }))
    }
}

/// libGL or ffmpeg required, not found on the host.
pub struct MissingSystemLibs;

impl Rule for MissingSystemLibs {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: "missing_system_libs".into(),
            name: "System libraries missing".into(),
            severity: Severity::Medium,
            category: Category::ToolchainMissing,
            description: "Python packages need shared system libraries the host lacks".into(),
            when: "The repo depends on opencv/PyOpenGL (libGL) or ffmpeg bindings and the \
                   host does not provide the library."
                .into(),
            fix: "Install the system packages (e.g. libgl1, ffmpeg) or use headless wheels \
                  such as opencv-python-headless."
                .into(),
            cluster: "System libs".into(),
        }
    }

    fn evaluate(&self, repo: &RepoProfile, host: &HostProfile) -> Result<Option<Finding>> {
        let mut missing = Vec::new();
        if repo.requires_libgl && !host.has_libgl {
            missing.push("libGL (opencv, PyOpenGL)");
        }
        if repo.requires_ffmpeg && !host.has_ffmpeg {
            missing.push("ffmpeg");
        }
        if missing.is_empty() {
            return Ok(None);
        }

        Ok(Some(Finding {
            rule_id: "missing_system_libs".into(),
            severity: Severity::Medium,
            message: "Repo requires system libraries that are not detected.".into(),
            reason: missing.join("; "),
            host_summary: host.platform(),
            confidence: Confidence::High,
            evidence: Evidence::new().with("missing", missing),
            category: Some(Category::ToolchainMissing),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_extension_without_compiler_is_medium() {
        let repo = RepoProfile {
            node_native_modules: vec!["node-gyp".into()],
            ..Default::default()
        };
        let host = HostProfile {
            has_compiler: false,
            ..Default::default()
        };
        let f = NativeToolchainMissing.evaluate(&repo, &host).unwrap().unwrap();
        assert_eq!(f.severity, Severity::Medium);
    }

    #[test]
    fn compiler_present_is_enough_for_c() {
        let repo = RepoProfile {
            node_native_modules: vec!["node-gyp".into()],
            ..Default::default()
        };
        assert!(NativeToolchainMissing
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn maturin_without_rustc_is_high() {
        let repo = RepoProfile {
            native_build_backends: vec!["maturin".into()],
            ..Default::default()
        };
        let f = NativeToolchainMissing
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .unwrap();
        assert_eq!(f.severity, Severity::High);

        let host = HostProfile {
            rust_version: Some("1.79.0".into()),
            ..Default::default()
        };
        assert!(NativeToolchainMissing.evaluate(&repo, &host).unwrap().is_none());
    }

    #[test]
    fn windows_native_modules() {
        let repo = RepoProfile {
            node_native_modules: vec!["node-gyp".into(), "nan".into()],
            ..Default::default()
        };
        let windows = HostProfile {
            os: "windows".into(),
            ..Default::default()
        };
        assert!(NodeNativeWindows.evaluate(&repo, &windows).unwrap().is_some());
        assert!(NodeNativeWindows
            .evaluate(&repo, &HostProfile::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn system_libs_lists_what_is_missing() {
        let repo = RepoProfile {
            requires_libgl: true,
            requires_ffmpeg: true,
            ..Default::default()
        };
        let host = HostProfile {
            has_ffmpeg: true,
            ..Default::default()
        };
        let f = MissingSystemLibs.evaluate(&repo, &host).unwrap().unwrap();
        assert_eq!(f.reason, "libGL (opencv, PyOpenGL)");
    }
}
