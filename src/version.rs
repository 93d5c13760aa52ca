//! Runtime version constraints.
//!
//! Python constraints follow PEP 440 comparators (`>=`, `<=`, `>`, `<`, `==`,
//! `!=`, `~=`, `.*` wildcards) plus Poetry's `^` and `~`. Node `engines` ranges
//! are evaluated with `semver` after normalizing npm's whitespace syntax.
//!
//! Anything that cannot be parsed is treated as satisfied: a constraint we do
//! not understand must never produce a finding.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::{Version, VersionReq};

static MAJOR_MINOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").unwrap());

static RELEASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap());

static PY_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(===|~=|==|!=|<=|>=|<|>|\^|~)?\s*(\d+(?:\.\d+){0,2})(\.\*)?").unwrap()
});

static NODE_CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(>=|<=|>|<|=|~|\^)?\s*v?(\d+|[xX*])(?:\.(\d+|[xX*]))?(?:\.(\d+|[xX*]))?")
        .unwrap()
});

static NODE_HYPHEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*v?([\d.]+)\s+-\s+v?([\d.]+)\s*$").unwrap());

/// Last Python minor considered when enumerating what a constraint admits.
const PYTHON_MAX_MINOR: u64 = 30;
/// Last Node major considered when enumerating what a constraint admits.
const NODE_MAX_MAJOR: u64 = 40;

/// Python releases past end-of-life, with the date support ended.
/// Anything older than the first entry is also end-of-life.
pub const PYTHON_EOL: &[((u64, u64), &str)] = &[
    ((2, 7), "2020-01-01"),
    ((3, 5), "2020-09-30"),
    ((3, 6), "2021-12-23"),
    ((3, 7), "2023-06-27"),
    ((3, 8), "2024-10-07"),
    ((3, 9), "2025-10-31"),
];

/// Node.js majors past end-of-life. Anything below the first entry is also
/// end-of-life.
pub const NODE_EOL: &[(u64, &str)] = &[
    (10, "2021-04-30"),
    (11, "2019-06-01"),
    (12, "2022-04-30"),
    (13, "2020-06-01"),
    (14, "2023-04-30"),
    (15, "2021-06-01"),
    (16, "2023-09-11"),
    (17, "2022-06-01"),
    (18, "2025-04-30"),
    (19, "2023-06-01"),
    (20, "2026-04-30"),
    (21, "2024-06-01"),
    (23, "2025-06-01"),
];

/// Extract `(major, minor)` from anything that contains `X.Y`.
/// `'3.11.2'` → `(3, 11)`, `'>=3.10'` → `(3, 10)`, `'v20.12.2'` → `(20, 12)`.
pub fn major_minor(s: &str) -> Option<(u64, u64)> {
    let caps = MAJOR_MINOR_RE.captures(s)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// `"3.11"` style label for a version string.
pub fn minor_label(s: &str) -> Option<String> {
    major_minor(s).map(|(ma, mi)| format!("{ma}.{mi}"))
}

/// Leading numeric release of an installed version, padded to three parts.
fn release(s: &str) -> Option<[u64; 3]> {
    let caps = RELEASE_RE.captures(s)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some([part(1)?, part(2)?, part(3)?])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PyOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
    Ne,
    Compatible,
    Caret,
    Tilde,
    Bare,
}

#[derive(Debug, Clone)]
struct PyClause {
    op: PyOp,
    parts: Vec<u64>,
    wildcard: bool,
}

impl PyClause {
    fn padded(&self) -> [u64; 3] {
        let mut out = [0; 3];
        for (i, p) in self.parts.iter().take(3).enumerate() {
            out[i] = *p;
        }
        out
    }

    fn prefix_matches(&self, v: &[u64; 3], len: usize) -> bool {
        self.parts.iter().take(len).zip(v.iter()).all(|(a, b)| a == b)
    }

    /// Upper bound (exclusive) for Poetry's caret.
    fn caret_upper(&self) -> [u64; 3] {
        let mut upper = self.padded();
        let n = self.parts.len().min(3);
        let idx = self.parts[..n]
            .iter()
            .position(|&p| p != 0)
            .unwrap_or(n.saturating_sub(1));
        upper[idx] += 1;
        for slot in upper.iter_mut().skip(idx + 1) {
            *slot = 0;
        }
        upper
    }

    /// Upper bound (exclusive) for Poetry's tilde.
    fn tilde_upper(&self) -> [u64; 3] {
        let mut upper = self.padded();
        let idx = if self.parts.len() >= 2 { 1 } else { 0 };
        upper[idx] += 1;
        for slot in upper.iter_mut().skip(idx + 1) {
            *slot = 0;
        }
        upper
    }

    fn admits(&self, v: &[u64; 3]) -> bool {
        let other = self.padded();
        match self.op {
            PyOp::Ge => *v >= other,
            PyOp::Le => *v <= other,
            PyOp::Gt => *v > other,
            PyOp::Lt => *v < other,
            PyOp::Eq if self.wildcard => self.prefix_matches(v, self.parts.len()),
            PyOp::Eq => *v == other,
            PyOp::Ne if self.wildcard => !self.prefix_matches(v, self.parts.len()),
            PyOp::Ne => *v != other,
            PyOp::Compatible => {
                // `~=3.10` needs at least two components to be meaningful.
                if self.parts.len() < 2 {
                    return true;
                }
                *v >= other && self.prefix_matches(v, self.parts.len() - 1)
            }
            PyOp::Caret => *v >= other && *v < self.caret_upper(),
            PyOp::Tilde => *v >= other && *v < self.tilde_upper(),
            PyOp::Bare if self.wildcard || self.parts.len() < 3 => {
                self.prefix_matches(v, self.parts.len())
            }
            PyOp::Bare => *v == other,
        }
    }
}

/// Parse one `||`-free alternative into clauses. Empty when nothing parses.
fn python_clauses(alternative: &str) -> Vec<PyClause> {
    PY_CLAUSE_RE
        .captures_iter(alternative)
        .filter_map(|caps| {
            let op = match caps.get(1).map(|m| m.as_str()) {
                Some(">=") => PyOp::Ge,
                Some("<=") => PyOp::Le,
                Some(">") => PyOp::Gt,
                Some("<") => PyOp::Lt,
                Some("==") | Some("===") => PyOp::Eq,
                Some("!=") => PyOp::Ne,
                Some("~=") => PyOp::Compatible,
                Some("^") => PyOp::Caret,
                Some("~") => PyOp::Tilde,
                _ => PyOp::Bare,
            };
            let parts = caps[2]
                .split('.')
                .map(str::parse)
                .collect::<std::result::Result<Vec<u64>, _>>()
                .ok()?;
            Some(PyClause {
                op,
                parts,
                wildcard: caps.get(3).is_some(),
            })
        })
        .collect()
}

fn python_alternatives(spec: &str) -> Vec<Vec<PyClause>> {
    spec.split("||")
        .map(python_clauses)
        .filter(|clauses| !clauses.is_empty())
        .collect()
}

fn python_admits(alternatives: &[Vec<PyClause>], v: &[u64; 3]) -> bool {
    alternatives
        .iter()
        .any(|clauses| clauses.iter().all(|c| c.admits(v)))
}

/// Whether an installed Python `version` satisfies a `requires-python` spec.
///
/// Unparseable versions or specs are treated as satisfied.
pub fn python_satisfies(version: &str, spec: &str) -> bool {
    let Some(v) = release(version) else {
        return true;
    };
    let alternatives = python_alternatives(spec);
    if alternatives.is_empty() {
        return true;
    }
    python_admits(&alternatives, &v)
}

pub fn python_is_eol(major: u64, minor: u64) -> bool {
    match PYTHON_EOL.last() {
        Some((newest, _)) => (major, minor) <= *newest,
        None => false,
    }
}

pub fn python_eol_date(major: u64, minor: u64) -> Option<&'static str> {
    PYTHON_EOL
        .iter()
        .find(|(mm, _)| *mm == (major, minor))
        .map(|(_, date)| *date)
}

/// If every Python minor a constraint admits is end-of-life, return the
/// newest admitted one. Constraints that admit nothing, or that cannot be
/// parsed, never pin.
pub fn python_eol_pin(spec: &str) -> Option<(u64, u64)> {
    let alternatives = python_alternatives(spec);
    if alternatives.is_empty() {
        return None;
    }

    let literals: Vec<[u64; 3]> = alternatives
        .iter()
        .flatten()
        .map(PyClause::padded)
        .collect();

    let mut admitted = BTreeSet::new();
    for major in 2..=3u64 {
        for minor in 0..=PYTHON_MAX_MINOR {
            let mut candidates = vec![[major, minor, 0], [major, minor, 99]];
            candidates.extend(
                literals
                    .iter()
                    .filter(|l| l[0] == major && l[1] == minor)
                    .copied(),
            );
            if candidates.iter().any(|c| python_admits(&alternatives, c)) {
                admitted.insert((major, minor));
            }
        }
    }

    let newest = *admitted.iter().next_back()?;
    admitted
        .iter()
        .all(|&(ma, mi)| python_is_eol(ma, mi))
        .then_some(newest)
}

/// Parse an installed Node version (`v20.12.2`, `20.12`, `20`).
pub fn node_version(s: &str) -> Option<Version> {
    let [major, minor, patch] = release(s)?;
    Some(Version::new(major, minor, patch))
}

fn node_component(raw: Option<regex::Match<'_>>) -> Option<&str> {
    raw.map(|m| m.as_str())
        .filter(|s| !matches!(*s, "x" | "X" | "*"))
}

/// Translate one npm range alternative into a `semver` requirement.
fn node_alternative(alternative: &str) -> Option<VersionReq> {
    if let Some(caps) = NODE_HYPHEN_RE.captures(alternative) {
        return VersionReq::parse(&format!(">={}, <={}", &caps[1], &caps[2])).ok();
    }

    let mut comparators = Vec::new();
    for caps in NODE_CLAUSE_RE.captures_iter(alternative) {
        let op = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let major = node_component(caps.get(2));
        let minor = node_component(caps.get(3));
        let patch = node_component(caps.get(4));

        let comparator = match (major, minor, patch) {
            (None, _, _) => "*".to_string(),
            (Some(ma), None, _) if op.is_empty() => format!("{ma}.*"),
            (Some(ma), Some(mi), None) if op.is_empty() => format!("{ma}.{mi}.*"),
            (Some(ma), None, _) => format!("{op}{ma}"),
            (Some(ma), Some(mi), None) => format!("{op}{ma}.{mi}"),
            (Some(ma), Some(mi), Some(pa)) => format!("{op}{ma}.{mi}.{pa}"),
        };
        comparators.push(comparator);
    }

    if comparators.is_empty() {
        return None;
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

fn node_requirements(spec: &str) -> Vec<VersionReq> {
    spec.split("||").filter_map(node_alternative).collect()
}

/// Whether an installed Node `version` satisfies an `engines.node` range.
///
/// Unparseable versions or ranges are treated as satisfied.
pub fn node_satisfies(version: &str, spec: &str) -> bool {
    let Some(v) = node_version(version) else {
        return true;
    };
    let reqs = node_requirements(spec);
    if reqs.is_empty() {
        return true;
    }
    reqs.iter().any(|r| r.matches(&v))
}

pub fn node_is_eol(major: u64) -> bool {
    let oldest = NODE_EOL.first().map(|(m, _)| *m).unwrap_or(0);
    major < oldest || NODE_EOL.iter().any(|(m, _)| *m == major)
}

pub fn node_eol_date(major: u64) -> Option<&'static str> {
    NODE_EOL
        .iter()
        .find(|(m, _)| *m == major)
        .map(|(_, date)| *date)
}

/// If every Node major an `engines.node` range admits is end-of-life, return
/// the newest admitted one.
pub fn node_eol_pin(spec: &str) -> Option<u64> {
    let reqs = node_requirements(spec);
    if reqs.is_empty() {
        return None;
    }

    let literals: Vec<Version> = NODE_CLAUSE_RE
        .captures_iter(spec)
        .filter_map(|caps| {
            let major = node_component(caps.get(2))?.parse().ok()?;
            let minor = node_component(caps.get(3)).and_then(|s| s.parse().ok()).unwrap_or(0);
            let patch = node_component(caps.get(4)).and_then(|s| s.parse().ok()).unwrap_or(0);
            Some(Version::new(major, minor, patch))
        })
        .collect();

    let mut admitted = BTreeSet::new();
    for major in 0..=NODE_MAX_MAJOR {
        let mut candidates = vec![Version::new(major, 0, 0), Version::new(major, 999, 0)];
        candidates.extend(literals.iter().filter(|l| l.major == major).cloned());
        if candidates.iter().any(|c| reqs.iter().any(|r| r.matches(c))) {
            admitted.insert(major);
        }
    }

    let newest = *admitted.iter().next_back()?;
    admitted
        .iter()
        .all(|&m| node_is_eol(m))
        .then_some(newest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_range_violation() {
        assert!(!python_satisfies("3.13.0", ">=3.10,<3.12"));
        assert!(python_satisfies("3.11.5", ">=3.10,<3.13"));
        assert!(!python_satisfies("3.9.18", ">=3.10"));
    }

    #[test]
    fn python_wildcard_and_exact() {
        assert!(python_satisfies("3.11.4", "==3.11.*"));
        assert!(!python_satisfies("3.12.0", "==3.11.*"));
        assert!(python_satisfies("3.11.0", "==3.11"));
        assert!(!python_satisfies("3.11.2", "!=3.11.*"));
    }

    #[test]
    fn python_compatible_release() {
        assert!(python_satisfies("3.12.1", "~=3.10"));
        assert!(!python_satisfies("4.0.0", "~=3.10"));
        assert!(python_satisfies("3.10.9", "~=3.10.2"));
        assert!(!python_satisfies("3.11.0", "~=3.10.2"));
    }

    #[test]
    fn poetry_caret_and_tilde() {
        assert!(python_satisfies("3.12.0", "^3.10"));
        assert!(!python_satisfies("3.9.0", "^3.10"));
        assert!(python_satisfies("3.10.7", "~3.10"));
        assert!(!python_satisfies("3.11.0", "~3.10"));
        assert!(python_satisfies("3.8.2", ">=3.8 <3.11"));
    }

    #[test]
    fn unparseable_is_satisfied() {
        assert!(python_satisfies("3.11.0", "latest"));
        assert!(python_satisfies("unknown", ">=3.10"));
        assert!(python_satisfies("3.11.0", "*"));
    }

    #[test]
    fn python_eol_only_when_exclusive() {
        assert_eq!(python_eol_pin("==3.7"), Some((3, 7)));
        assert_eq!(python_eol_pin("==3.8.*"), Some((3, 8)));
        assert_eq!(python_eol_pin(">=3.7,<3.9"), Some((3, 8)));
        assert_eq!(python_eol_pin("~=3.8.1"), Some((3, 8)));
        assert_eq!(python_eol_pin(">=3.8"), None);
        assert_eq!(python_eol_pin(">=3.10,<3.13"), None);
        assert_eq!(python_eol_pin("whatever"), None);
    }

    #[test]
    fn node_ranges() {
        assert!(node_satisfies("v20.12.2", ">=18"));
        assert!(!node_satisfies("v16.20.0", ">=18"));
        assert!(node_satisfies("18.19.0", "18.x"));
        assert!(!node_satisfies("20.1.0", "18.x"));
        assert!(node_satisfies("18.3.0", "^18.0.0"));
        assert!(node_satisfies("20.0.0", ">= 18 < 21"));
        assert!(!node_satisfies("22.0.0", ">=18 <21"));
        assert!(node_satisfies("16.0.0", "^14 || ^16"));
        assert!(node_satisfies("20.0.0", "lts/*"));
    }

    #[test]
    fn node_eol_only_when_exclusive() {
        assert_eq!(node_eol_pin("16.x"), Some(16));
        assert_eq!(node_eol_pin("^14 || ^16"), Some(16));
        assert_eq!(node_eol_pin(">=14"), None);
        assert_eq!(node_eol_pin(">=22"), None);
    }

    #[test]
    fn major_minor_extraction() {
        assert_eq!(major_minor(">=3.10"), Some((3, 10)));
        assert_eq!(major_minor("v20.12.2"), Some((20, 12)));
        assert_eq!(minor_label("3.11-slim"), Some("3.11".into()));
        assert_eq!(major_minor("18"), None);
    }
}
