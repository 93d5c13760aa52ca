//! GPU usage scan over Python sources.
//!
//! Looks for torch / tensorflow imports, `torch.cuda` use, `device="cuda"`
//! keywords and `.to("cuda")` calls, plus the CPU-fallback guard
//! (`if torch.cuda.is_available():`). Uses the tree-sitter Python grammar
//! with the `python` feature, a line-based regex scan otherwise.

use std::ffi::OsStr;
use std::path::Path;

#[cfg(not(feature = "python"))]
use once_cell::sync::Lazy;
#[cfg(not(feature = "python"))]
use regex::Regex;

use crate::error::Result;
use crate::profile::CudaUsage;

/// Usage sites kept per file.
const MAX_USAGES_PER_FILE: usize = 10;

/// Directories skipped by the source scan on top of the config skip list.
const SOURCE_SKIP_DIRS: &[&str] = &["tests"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScan {
    pub uses_torch: bool,
    pub uses_tensorflow: bool,
    pub requires_cuda: bool,
    pub cuda_optional: bool,
    pub cuda_files: Vec<String>,
    pub cuda_usages: Vec<CudaUsage>,
}

impl SourceScan {
    fn record(&mut self, file: &str, line: usize, kind: impl Into<String>) {
        self.requires_cuda = true;
        if self.cuda_usages.len() < MAX_USAGES_PER_FILE {
            self.cuda_usages.push(CudaUsage {
                file: file.to_string(),
                line,
                kind: kind.into(),
            });
        }
    }

    fn note_import(&mut self, module: &str) {
        if module == "torch" || module.starts_with("torch") {
            self.uses_torch = true;
        }
        if module == "tensorflow" || module.starts_with("tensorflow") {
            self.uses_tensorflow = true;
        }
    }

    fn finish(mut self, file: &str) -> Self {
        if self.requires_cuda {
            self.cuda_files.push(file.to_string());
        }
        self
    }

    fn merge(&mut self, other: SourceScan) {
        self.uses_torch |= other.uses_torch;
        self.uses_tensorflow |= other.uses_tensorflow;
        self.requires_cuda |= other.requires_cuda;
        self.cuda_optional |= other.cuda_optional;
        for f in other.cuda_files {
            if !self.cuda_files.contains(&f) {
                self.cuda_files.push(f);
            }
        }
        self.cuda_usages.extend(other.cuda_usages);
    }
}

/// Scan up to `max_files` Python files under `root`.
pub fn scan_python_tree(root: &Path, max_files: usize) -> SourceScan {
    let mut total = SourceScan::default();
    let mut scanned = 0usize;

    for path in super::walk_files(root, SOURCE_SKIP_DIRS) {
        if scanned >= max_files {
            break;
        }
        if path.extension() != Some(OsStr::new("py")) {
            continue;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(file = %path.display(), error = %e, "skipping unreadable source");
                continue;
            }
        };
        let rel = super::relative(root, &path);
        match scan_python_file(&rel, &content) {
            Ok(scan) => total.merge(scan),
            Err(e) => tracing::debug!(file = %rel, error = %e, "skipping unparseable source"),
        }
        scanned += 1;
    }
    total
}

// ── tree-sitter scan ────────────────────────────────────────────

#[cfg(feature = "python")]
pub fn scan_python_file(rel: &str, content: &str) -> Result<SourceScan> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| crate::error::FitError::Parse {
            file: rel.to_string(),
            message: format!("Failed to load Python grammar: {e}"),
        })?;
    let tree = parser
        .parse(content, None)
        .ok_or_else(|| crate::error::FitError::Parse {
            file: rel.to_string(),
            message: "tree-sitter failed to parse Python".into(),
        })?;

    let mut scan = SourceScan::default();
    walk_node(tree.root_node(), content.as_bytes(), rel, &mut scan);
    Ok(scan.finish(rel))
}

#[cfg(feature = "python")]
fn walk_node(node: tree_sitter::Node, source: &[u8], rel: &str, scan: &mut SourceScan) {
    let line = node.start_position().row + 1;

    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let module = match name.kind() {
                    "aliased_import" => name
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source))
                        .unwrap_or_default(),
                    _ => node_text(name, source),
                };
                scan.note_import(module);
                if module.contains("torch.cuda") {
                    scan.record(rel, line, "import torch.cuda");
                }
            }
            return;
        }
        "import_from_statement" => {
            let module = node
                .child_by_field_name("module_name")
                .map(|m| node_text(m, source))
                .unwrap_or_default();
            scan.note_import(module);
            let mut cursor = node.walk();
            let imports_cuda = node
                .children_by_field_name("name", &mut cursor)
                .any(|n| node_text(n, source).split_whitespace().next() == Some("cuda"));
            if module.contains("torch.cuda") || (module == "torch" && imports_cuda) {
                scan.record(rel, line, "import torch.cuda");
            }
            return;
        }
        "attribute" => {
            if compact(node_text(node, source)) == "torch.cuda" {
                scan.record(rel, line, "torch.cuda");
            }
        }
        "call" => inspect_call(node, source, rel, line, scan),
        "if_statement" | "elif_clause" => {
            if let Some(cond) = node.child_by_field_name("condition") {
                scan.cuda_optional |= is_availability_check(cond, source);
            }
        }
        // `"cuda" if torch.cuda.is_available() else "cpu"`
        "conditional_expression" => {
            if let Some(cond) = node.named_child(1) {
                scan.cuda_optional |= is_availability_check(cond, source);
            }
        }
        _ => {}
    }

    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            walk_node(child, source, rel, scan);
        }
    }
}

#[cfg(feature = "python")]
fn inspect_call(
    node: tree_sitter::Node,
    source: &[u8],
    rel: &str,
    line: usize,
    scan: &mut SourceScan,
) {
    let Some(args) = node.child_by_field_name("arguments") else {
        return;
    };

    for i in 0..args.named_child_count() {
        let Some(arg) = args.named_child(i) else {
            continue;
        };
        if arg.kind() != "keyword_argument" {
            continue;
        }
        let name = arg
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
            .unwrap_or_default();
        if name != "device" && name != "device_map" {
            continue;
        }
        if let Some(value) = arg
            .child_by_field_name("value")
            .and_then(|v| string_literal(v, source))
        {
            if value.to_ascii_lowercase().contains("cuda") {
                scan.record(rel, line, format!("{name}=\"{value}\""));
                break;
            }
        }
    }

    let Some(func) = node.child_by_field_name("function") else {
        return;
    };
    let calls_to = func.kind() == "attribute"
        && func
            .child_by_field_name("attribute")
            .is_some_and(|a| node_text(a, source) == "to");
    if calls_to && args.named_child_count() == 1 {
        let target = args
            .named_child(0)
            .and_then(|a| string_literal(a, source));
        if target.is_some_and(|t| t.eq_ignore_ascii_case("cuda")) {
            scan.record(rel, line, ".to(\"cuda\")");
        }
    }
}

/// `torch.cuda.is_available()` and friends.
#[cfg(feature = "python")]
fn is_availability_check(cond: tree_sitter::Node, source: &[u8]) -> bool {
    if cond.kind() != "call" {
        return false;
    }
    cond.child_by_field_name("function")
        .filter(|f| f.kind() == "attribute")
        .map(|f| compact(node_text(f, source)))
        .is_some_and(|name| name.to_ascii_lowercase().contains("cuda") && name.contains("is_available"))
}

/// Contents of a plain string literal, without prefix or quotes.
#[cfg(feature = "python")]
fn string_literal(node: tree_sitter::Node, source: &[u8]) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }
    let text = node_text(node, source).trim_start_matches(|c: char| c.is_ascii_alphabetic());
    Some(text.trim_matches(|c| c == '"' || c == '\'').to_string())
}

#[cfg(feature = "python")]
fn node_text<'a>(node: tree_sitter::Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

#[cfg(feature = "python")]
fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

// ── Regex fallback (when the python feature is disabled) ────────

#[cfg(not(feature = "python"))]
static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)").unwrap());

#[cfg(not(feature = "python"))]
static FROM_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+(.+)").unwrap());

#[cfg(not(feature = "python"))]
static TORCH_CUDA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btorch\.cuda\b").unwrap());

#[cfg(not(feature = "python"))]
static DEVICE_KW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(device|device_map)\s*=\s*["']([^"']*[cC][uU][dD][aA][^"']*)["']"#).unwrap()
});

#[cfg(not(feature = "python"))]
static TO_CUDA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\.to\(\s*["'](?i:cuda)["']\s*\)"#).unwrap());

#[cfg(not(feature = "python"))]
static GUARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bif\s+[\w.]*(?i:cuda)[\w.]*\.is_available\s*\(").unwrap());

#[cfg(not(feature = "python"))]
pub fn scan_python_file(rel: &str, content: &str) -> Result<SourceScan> {
    let mut scan = SourceScan::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }

        if let Some(caps) = IMPORT_RE.captures(text) {
            for item in caps[1].split(',') {
                let module = item.split_whitespace().next().unwrap_or_default();
                scan.note_import(module);
                if module.contains("torch.cuda") {
                    scan.record(rel, line, "import torch.cuda");
                }
            }
            continue;
        }
        if let Some(caps) = FROM_IMPORT_RE.captures(text) {
            let module = &caps[1];
            scan.note_import(module);
            let imports_cuda = caps[2]
                .split(',')
                .any(|n| n.split_whitespace().next() == Some("cuda"));
            if module.contains("torch.cuda") || (module == "torch" && imports_cuda) {
                scan.record(rel, line, "import torch.cuda");
            }
            continue;
        }

        for _ in TORCH_CUDA_RE.find_iter(text) {
            scan.record(rel, line, "torch.cuda");
        }
        if let Some(caps) = DEVICE_KW_RE.captures(text) {
            scan.record(rel, line, format!("{}=\"{}\"", &caps[1], &caps[2]));
        }
        if TO_CUDA_RE.is_match(text) {
            scan.record(rel, line, ".to(\"cuda\")");
        }
        if GUARD_RE.is_match(text) {
            scan.cuda_optional = true;
        }
    }

    Ok(scan.finish(rel))
}
