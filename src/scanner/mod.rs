//! Repository scanner: discovers project configs, parses them and merges
//! the result into one `RepoProfile`.

pub mod ci;
pub mod container;
pub mod manifest;
pub mod source;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::config::ScanSettings;
use crate::error::{FitError, Result};
use crate::profile::{NodeManifest, RepoProfile, Subproject, SubprojectKind};

use manifest::PythonManifest;

/// Directories never descended into.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    "node_modules",
    ".tox",
    "build",
    "dist",
    "eggs",
];

/// Lock artifacts accepted beside a `package.json`.
pub const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "npm-shrinkwrap.json",
    "bun.lockb",
];

/// Root-level files that document a native install or run path.
pub const NATIVE_ENTRYPOINTS: &[&str] = &[
    "Makefile",
    "pyproject.toml",
    "requirements.txt",
    "setup.py",
    "package.json",
    "Cargo.toml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConfigKind {
    Pyproject,
    Requirements,
    SetupPy,
    PackageJson,
    Cargo,
    Dockerfile,
    Compose,
    Env,
}

static CONFIG_PATTERNS: Lazy<Vec<(glob::Pattern, ConfigKind)>> = Lazy::new(|| {
    [
        ("pyproject.toml", ConfigKind::Pyproject),
        ("requirements*.txt", ConfigKind::Requirements),
        ("setup.py", ConfigKind::SetupPy),
        ("package.json", ConfigKind::PackageJson),
        ("Cargo.toml", ConfigKind::Cargo),
        ("Dockerfile", ConfigKind::Dockerfile),
        ("docker-compose*.yml", ConfigKind::Compose),
        ("docker-compose*.yaml", ConfigKind::Compose),
        (".env", ConfigKind::Env),
    ]
    .into_iter()
    .map(|(p, kind)| (glob::Pattern::new(p).unwrap(), kind))
    .collect()
});

fn classify(file_name: &str) -> Option<ConfigKind> {
    CONFIG_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.matches(file_name))
        .map(|(_, kind)| *kind)
}

/// All files under `root`, sorted by name, skipping [`SKIP_DIRS`] and
/// `extra_skip`.
pub(crate) fn walk_files(root: &Path, extra_skip: &'static [&'static str]) -> Vec<PathBuf> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|t| t.is_dir()) {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref()) && !extra_skip.contains(&name.as_ref())
        })
        .build();

    walker
        .flatten()
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .collect()
}

/// `/`-separated path of `path` relative to `root`, `.` for the root itself.
pub(crate) fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".into()
    } else {
        parts.join("/")
    }
}

/// Config files to parse, root-level first within each kind, capped at
/// `max_configs`.
fn discover_configs(root: &Path, max_configs: usize) -> Vec<(ConfigKind, PathBuf)> {
    let mut found: Vec<(ConfigKind, usize, PathBuf)> = walk_files(root, &[])
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let kind = classify(&name)?;
            let depth = path.strip_prefix(root).ok()?.components().count();
            Some((kind, depth, path))
        })
        .collect();
    found.sort();
    found
        .into_iter()
        .take(max_configs)
        .map(|(kind, _, path)| (kind, path))
        .collect()
}

fn read(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "skipping unreadable config");
            None
        }
    }
}

fn push_unique(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

struct ProfileBuilder<'a> {
    root: &'a Path,
    profile: RepoProfile,
    seen_dirs: HashSet<String>,
}

impl<'a> ProfileBuilder<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            profile: RepoProfile::new(root.display().to_string()),
            seen_dirs: HashSet::new(),
        }
    }

    fn dir_of(&self, file: &Path) -> String {
        relative(self.root, file.parent().unwrap_or(self.root))
    }

    fn is_root_file(&self, file: &Path) -> bool {
        file.parent() == Some(self.root)
    }

    /// One subproject per directory, typed by the first manifest found there.
    fn add_subproject(&mut self, dir: String, kind: SubprojectKind, python_version: Option<String>) {
        if self.seen_dirs.insert(dir.clone()) {
            self.profile.subprojects.push(Subproject {
                path: dir,
                kind,
                python_version,
            });
        }
    }

    fn set_name(&mut self, name: Option<&str>) {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if self.profile.name.is_empty() {
                self.profile.name = name.to_string();
            }
        }
    }

    fn declare_python(&mut self, spec: Option<&str>) {
        let Some(spec) = spec else {
            return;
        };
        if self.profile.manifest.requires_python.is_none() {
            self.profile.manifest.requires_python = Some(spec.to_string());
        }
        if self.profile.python_version.is_none() {
            self.profile.python_version = Some(spec.to_string());
        }
    }

    fn merge_python(&mut self, m: &PythonManifest) {
        let p = &mut self.profile;
        p.uses_torch |= m.uses_torch;
        p.uses_tensorflow |= m.uses_tensorflow;
        p.requires_libgl |= m.requires_libgl;
        p.requires_ffmpeg |= m.requires_ffmpeg;
        push_unique(&mut p.frameworks, m.frameworks.iter().cloned());
        push_unique(
            &mut p.cuda_mandatory_packages,
            m.cuda_mandatory_packages.iter().cloned(),
        );
        push_unique(
            &mut p.native_build_backends,
            m.native_build_backends.iter().cloned(),
        );
        push_unique(&mut p.manifest.python_packages, m.packages.iter().cloned());
        for (pkg, constraint) in &m.package_versions {
            p.manifest
                .package_versions
                .entry(pkg.clone())
                .or_insert_with(|| constraint.clone());
        }
        if p.manifest.tensorflow_version.is_none() {
            p.manifest.tensorflow_version = m.tensorflow_version.clone();
        }
    }

    fn add(&mut self, kind: ConfigKind, file: &Path) {
        let Some(content) = read(file) else {
            return;
        };
        let dir = self.dir_of(file);

        match kind {
            ConfigKind::Pyproject => match manifest::parse_pyproject(&content) {
                Ok(m) => {
                    self.profile.has_pyproject = true;
                    self.set_name(m.name.as_deref());
                    self.declare_python(m.requires_python.as_deref());
                    self.merge_python(&m);
                    self.add_subproject(dir, SubprojectKind::Python, m.requires_python.clone());
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to parse pyproject.toml");
                }
            },
            ConfigKind::Requirements => {
                let m = manifest::parse_requirements(&content);
                self.profile.has_requirements_txt = true;
                self.merge_python(&m);
                self.add_subproject(dir, SubprojectKind::Python, None);
            }
            ConfigKind::SetupPy => {
                let m = manifest::parse_setup_py(&content);
                self.profile.has_setup_py = true;
                self.declare_python(m.requires_python.as_deref());
                self.add_subproject(dir, SubprojectKind::Python, m.requires_python);
            }
            ConfigKind::PackageJson => match manifest::parse_package_json(&content) {
                Ok(pkg) => {
                    self.profile.has_package_json = true;
                    if pkg.name.as_deref().is_some_and(|n| !manifest::is_generic_name(n)) {
                        self.set_name(pkg.name.as_deref());
                    }
                    push_unique(&mut self.profile.node_native_modules, pkg.native_modules);
                    if self.profile.node_engine_spec.is_none() {
                        self.profile.node_engine_spec = pkg.engines_node;
                    }
                    let parent = file.parent().unwrap_or(self.root);
                    let node = NodeManifest {
                        path: relative(self.root, file),
                        has_dependencies: pkg.has_dependencies,
                        lock_files: LOCK_FILES
                            .iter()
                            .filter(|l| parent.join(l).is_file())
                            .map(|l| l.to_string())
                            .collect(),
                    };
                    self.profile.node_lock_file_missing |= node.missing_lock();
                    self.profile.manifest.node_manifests.push(node);
                    self.add_subproject(dir, SubprojectKind::Node, None);
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to parse package.json");
                }
            },
            ConfigKind::Cargo => match manifest::parse_cargo_toml(&content) {
                Ok(cargo) => {
                    self.profile.has_cargo_toml = true;
                    self.set_name(cargo.name.as_deref());
                    push_unique(&mut self.profile.rust_system_libs, cargo.system_libs);
                    self.add_subproject(dir, SubprojectKind::Rust, None);
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to parse Cargo.toml");
                }
            },
            ConfigKind::Dockerfile => {
                let d = container::parse_dockerfile(&content);
                let p = &mut self.profile;
                p.has_dockerfile = true;
                p.dockerfile_has_cuda |= d.has_cuda;
                p.docker_platform_amd64 |= d.platform_amd64;
                // The image pin is a runtime choice, not a declared constraint.
                if p.container.python_version.is_none() {
                    p.container.python_version = d.python_version;
                    p.container.base_image = d.base_image;
                }
                self.add_subproject(dir, SubprojectKind::Docker, None);
            }
            ConfigKind::Compose if self.is_root_file(file) => {
                match container::parse_compose_ports(&content) {
                    Ok(ports) => ports
                        .into_iter()
                        .for_each(|p| container::push_port(&mut self.profile.required_ports, p)),
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "failed to parse docker-compose");
                    }
                }
            }
            ConfigKind::Env if self.is_root_file(file) => {
                for port in container::parse_env_ports(&content) {
                    container::push_port(&mut self.profile.required_ports, port);
                }
            }
            ConfigKind::Compose | ConfigKind::Env => {}
        }
    }

    fn add_workflows(&mut self) {
        let dir = self.root.join(".github").join("workflows");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p
                        .extension()
                        .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        files.sort();

        for file in files {
            let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if self.profile.ci.workflows.contains_key(&stem) {
                continue;
            }
            let evidence = match read(&file).map(|c| ci::parse_workflow(&c)) {
                Some(Ok(wf)) => wf,
                Some(Err(e)) => {
                    tracing::warn!(file = %file.display(), error = %e, "failed to parse workflow");
                    Default::default()
                }
                None => Default::default(),
            };
            if evidence
                .runs_on
                .iter()
                .any(|r| r.to_ascii_lowercase().contains("windows"))
            {
                self.profile.os_specific = true;
            }
            self.profile.github_workflows.push(stem.clone());
            self.profile.ci.workflows.insert(stem, evidence);
        }
    }

    fn add_source_scan(&mut self, max_files: usize) {
        let scan = source::scan_python_tree(self.root, max_files);
        let p = &mut self.profile;
        p.uses_torch |= scan.uses_torch;
        p.uses_tensorflow |= scan.uses_tensorflow;
        if scan.requires_cuda {
            p.requires_cuda = true;
            p.cuda_optional = scan.cuda_optional;
            p.cuda_files = scan.cuda_files;
            p.cuda_usages = scan.cuda_usages;
        }
        if !p.cuda_mandatory_packages.is_empty() {
            p.requires_cuda = true;
            p.cuda_optional = false;
        }
    }

    fn finish(mut self) -> RepoProfile {
        let root = self.root;
        self.profile.has_devcontainer = root.join(".devcontainer").join("devcontainer.json").is_file()
            || root.join(".devcontainer.json").is_file();
        self.profile.manifest.native_entrypoints = NATIVE_ENTRYPOINTS
            .iter()
            .filter(|f| root.join(f).is_file())
            .map(|f| f.to_string())
            .collect();
        if self.profile.name.is_empty() {
            self.profile.name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty() && n != ".")
                .unwrap_or_else(|| "repository".into());
        }
        self.profile
    }
}

/// Scan the repository at `path`.
///
/// The only failure is a path that is not a directory; unreadable or
/// malformed files are logged and skipped.
pub fn scan_repo(path: &Path, settings: &ScanSettings) -> Result<RepoProfile> {
    if !path.is_dir() {
        return Err(FitError::NotADirectory(path.to_path_buf()));
    }
    let root = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let configs = discover_configs(&root, settings.max_configs);
    tracing::debug!(repo = %root.display(), configs = configs.len(), "discovered configs");

    let mut builder = ProfileBuilder::new(&root);
    for (kind, file) in &configs {
        builder.add(*kind, file);
    }
    builder.add_workflows();
    builder.add_source_scan(settings.max_source_files);
    Ok(builder.finish())
}
