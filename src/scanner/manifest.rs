//! Dependency manifest parsers: pyproject.toml, requirements*.txt, setup.py,
//! package.json and Cargo.toml.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FitError, Result};

/// Packages that need an NVIDIA GPU at import time (no CPU fallback).
const CUDA_ONLY_PACKAGES: &[&str] = &["bitsandbytes", "flash-attn", "flash_attn", "xformers"];

/// Build backends that compile native extensions.
const NATIVE_BUILD_BACKENDS: &[&str] = &["maturin", "setuptools-rust", "pybind11"];

/// Package substring -> framework tag.
const ML_FRAMEWORKS: &[(&str, &str)] = &[
    ("peft", "PEFT"),
    ("transformers", "Transformers"),
    ("diffusers", "Diffusers"),
    ("accelerate", "Accelerate"),
    ("torchao", "torchao"),
    ("mlx", "MLX"),
];

/// Crates that link a system library.
const SYSTEM_CRATES: &[&str] = &["openssl", "libssh2", "sqlite3", "sodiumoxide", "libgit2"];

/// Packages whose constraints the compatibility rules read.
const TRACKED_VERSIONS: &[&str] = &["torch", "torchao"];

static PACKAGE_NAME_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[\]<>=!~\s;@^(]").unwrap());

static EXTRAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*[^\]]*\]\s*").unwrap());

static CONSTRAINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"((?:[<>=~!^]{1,3}\s*[\d][\d.*]*\s*,?\s*)+)").unwrap());

static SETUP_PY_REQUIRES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"python_requires\s*=\s*["']([^"']+)["']"#).unwrap());

static NODE_NATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)node-gyp|\bnan\b|node-addon-api|@napi-rs/|prebuild|\bbindings\b|ffi-napi|ref-napi")
        .unwrap()
});

/// What one Python manifest declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PythonManifest {
    pub name: Option<String>,
    pub requires_python: Option<String>,
    pub packages: Vec<String>,
    pub package_versions: BTreeMap<String, String>,
    pub tensorflow_version: Option<String>,
    pub uses_torch: bool,
    pub uses_tensorflow: bool,
    pub requires_libgl: bool,
    pub requires_ffmpeg: bool,
    pub frameworks: Vec<String>,
    pub cuda_mandatory_packages: Vec<String>,
    pub native_build_backends: Vec<String>,
}

impl PythonManifest {
    /// Record one PEP 508 style requirement (`torch[cuda]>=2.2,<2.4 ; python_version > "3.9"`).
    fn add_requirement(&mut self, spec: &str) {
        let spec = spec.split('#').next().unwrap_or_default().trim();
        let Some(pkg) = package_name(spec) else {
            return;
        };
        let lower = spec.to_ascii_lowercase();

        if pkg.contains("torch") || pkg == "pytorch" {
            self.uses_torch = true;
            if lower.contains("+cu") {
                push_unique(&mut self.cuda_mandatory_packages, "torch+cu");
            }
        }
        if pkg.contains("tensorflow") || pkg == "tf-keras" {
            self.uses_tensorflow = true;
            if pkg == "tensorflow" {
                if let Some(c) = version_constraint(spec) {
                    self.tensorflow_version = Some(c);
                }
            }
        }
        if CUDA_ONLY_PACKAGES.iter().any(|c| pkg.contains(c)) {
            push_unique(&mut self.cuda_mandatory_packages, &pkg);
        }
        for (needle, tag) in ML_FRAMEWORKS {
            if pkg.contains(needle) {
                push_unique(&mut self.frameworks, tag);
            }
        }
        if pkg.starts_with("opencv") || pkg == "pyopengl" {
            self.requires_libgl = true;
        }
        if pkg.contains("ffmpeg") || pkg == "av" || pkg == "pyav" {
            self.requires_ffmpeg = true;
        }
        for backend in NATIVE_BUILD_BACKENDS {
            if pkg.contains(backend) {
                push_unique(&mut self.native_build_backends, backend);
            }
        }
        if TRACKED_VERSIONS.contains(&pkg.as_str()) {
            if let Some(c) = version_constraint(spec) {
                self.package_versions.entry(pkg.clone()).or_insert(c);
            }
        }
        push_unique(&mut self.packages, &pkg);
    }

    fn add_build_requirement(&mut self, spec: &str) {
        let lower = spec.to_ascii_lowercase();
        for backend in NATIVE_BUILD_BACKENDS {
            if lower.contains(backend) {
                push_unique(&mut self.native_build_backends, backend);
            }
        }
    }
}

/// A `package.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePackage {
    pub name: Option<String>,
    pub engines_node: Option<String>,
    pub has_dependencies: bool,
    pub native_modules: Vec<String>,
}

/// A `Cargo.toml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CargoManifest {
    pub name: Option<String>,
    pub system_libs: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

/// Normalized distribution name: lowercase, `_` folded to `-`.
fn package_name(spec: &str) -> Option<String> {
    let raw = PACKAGE_NAME_SPLIT.split(spec.trim()).next()?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_ascii_lowercase().replace('_', "-"))
}

/// Version constraint in a requirement, with extras and markers removed.
fn version_constraint(spec: &str) -> Option<String> {
    let spec = spec.split(';').next().unwrap_or_default();
    let spec = EXTRAS.replace_all(spec, "");
    let m = CONSTRAINT.captures(&spec)?.get(1)?;
    let c = m.as_str().trim().trim_end_matches(',').trim();
    (!c.is_empty()).then(|| c.to_string())
}

fn parse_error(file: &str, message: impl ToString) -> FitError {
    FitError::Parse {
        file: file.to_string(),
        message: message.to_string(),
    }
}

pub fn parse_requirements(content: &str) -> PythonManifest {
    let mut manifest = PythonManifest::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        manifest.add_requirement(line);
    }
    manifest
}

pub fn parse_pyproject(content: &str) -> Result<PythonManifest> {
    let doc: toml::Value = toml::from_str(content)?;
    let mut manifest = PythonManifest::default();

    if let Some(project) = doc.get("project") {
        manifest.name = project
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from);
        manifest.requires_python = project
            .get("requires-python")
            .and_then(|v| v.as_str())
            .map(String::from);

        let required = project
            .get("dependencies")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten();
        let optional = project
            .get("optional-dependencies")
            .and_then(|v| v.as_table())
            .into_iter()
            .flat_map(|t| t.values())
            .filter_map(|v| v.as_array())
            .flatten();
        for dep in required.chain(optional).filter_map(|v| v.as_str()) {
            manifest.add_requirement(dep);
        }
    }

    if let Some(build) = doc.get("build-system") {
        let requires = build
            .get("requires")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str());
        for req in requires {
            manifest.add_build_requirement(req);
        }
        if let Some(backend) = build.get("build-backend").and_then(|v| v.as_str()) {
            manifest.add_build_requirement(backend);
        }
    }

    if let Some(poetry) = doc.get("tool").and_then(|t| t.get("poetry")) {
        if manifest.name.is_none() {
            manifest.name = poetry.get("name").and_then(|v| v.as_str()).map(String::from);
        }
        if let Some(deps) = poetry.get("dependencies").and_then(|v| v.as_table()) {
            for (name, value) in deps {
                let constraint = match value {
                    toml::Value::String(s) => Some(s.clone()),
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    _ => None,
                };
                if name == "python" {
                    if manifest.requires_python.is_none() {
                        manifest.requires_python = constraint;
                    }
                    continue;
                }
                let spec = match constraint.as_deref() {
                    Some(c) if c != "*" => format!("{name}{c}"),
                    _ => name.clone(),
                };
                manifest.add_requirement(&spec);
            }
        }
    }

    Ok(manifest)
}

pub fn parse_setup_py(content: &str) -> PythonManifest {
    PythonManifest {
        requires_python: SETUP_PY_REQUIRES
            .captures(content)
            .map(|c| c[1].trim().to_string()),
        ..Default::default()
    }
}

pub fn parse_package_json(content: &str) -> Result<NodePackage> {
    let doc: serde_json::Value = serde_json::from_str(content)?;
    if !doc.is_object() {
        return Err(parse_error("package.json", "expected a JSON object"));
    }

    let engines_node = doc
        .get("engines")
        .and_then(|e| e.get("node"))
        .and_then(|n| n.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(String::from);

    let deps: Vec<&String> = ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|key| doc.get(key).and_then(|d| d.as_object()))
        .flat_map(|map| map.keys())
        .collect();

    let mut native_modules = Vec::new();
    for dep in &deps {
        if NODE_NATIVE.is_match(dep) {
            push_unique(&mut native_modules, dep);
        }
    }

    Ok(NodePackage {
        name: doc
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        engines_node,
        has_dependencies: !deps.is_empty(),
        native_modules,
    })
}

pub fn parse_cargo_toml(content: &str) -> Result<CargoManifest> {
    let doc: toml::Value = toml::from_str(content)?;
    let name = doc
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(String::from);

    let mut system_libs = Vec::new();
    for section in ["dependencies", "build-dependencies"] {
        let Some(table) = doc.get(section).and_then(|d| d.as_table()) else {
            continue;
        };
        for dep in table.keys() {
            if SYSTEM_CRATES.contains(&dep.as_str()) || dep.to_ascii_lowercase().contains("sys") {
                push_unique(&mut system_libs, dep);
            }
        }
    }

    Ok(CargoManifest { name, system_libs })
}

/// Template or placeholder project names that say nothing about the repo.
pub fn is_generic_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with("my-")
        || lower.starts_with("my_")
        || lower.contains("t3-")
        || lower.contains("template")
        || matches!(lower.as_str(), "app" | "web" | "frontend" | "project")
}
