//! Dockerfile, docker-compose and `.env` parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::Result;

static FROM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*FROM\s+(?:--platform=\S+\s+)?(\S+)").unwrap()
});

static PYTHON_PIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)python[:=\s]*(\d+\.\d+(?:\.\d+)?)").unwrap());

static ENV_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^(?:export\s+)?(?:PORT|\w+_PORT)\s*=\s*["']?(\d+)"#).unwrap()
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dockerfile {
    pub has_cuda: bool,
    pub platform_amd64: bool,
    /// Interpreter pinned by the image, e.g. `3.11` for `python:3.11-slim`.
    pub python_version: Option<String>,
    /// Image of the last `FROM`, the stage that runs.
    pub base_image: Option<String>,
}

pub fn parse_dockerfile(content: &str) -> Dockerfile {
    let lower = content.to_ascii_lowercase();
    let mut parsed = Dockerfile {
        has_cuda: lower.contains("cuda") || lower.contains("nvidia"),
        ..Default::default()
    };

    for line in content.lines() {
        let line_lower = line.to_ascii_lowercase();
        if let Some(caps) = FROM_LINE.captures(line) {
            parsed.base_image = Some(caps[1].to_string());
        }
        if line_lower.contains("python:") || line_lower.contains("python=") {
            if let Some(caps) = PYTHON_PIN.captures(line) {
                parsed.python_version = Some(caps[1].to_string());
            }
        }
        if line_lower.contains("platform=")
            && (line_lower.contains("amd64") || line_lower.contains("x86_64"))
        {
            parsed.platform_amd64 = true;
        }
    }
    parsed
}

/// Host-side ports published by docker-compose services.
pub fn parse_compose_ports(content: &str) -> Result<Vec<u16>> {
    let doc: Value = serde_yaml::from_str(content)?;
    let mut ports = Vec::new();
    collect_ports(&doc, &mut ports);
    Ok(ports)
}

fn collect_ports(node: &Value, out: &mut Vec<u16>) {
    match node {
        Value::Mapping(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    (Some("ports"), Value::Sequence(entries)) => {
                        for entry in entries {
                            if let Some(port) = published_port(entry) {
                                push_port(out, port);
                            }
                        }
                    }
                    _ => collect_ports(value, out),
                }
            }
        }
        Value::Sequence(items) => items.iter().for_each(|i| collect_ports(i, out)),
        _ => {}
    }
}

/// `"8080:80"`, `"127.0.0.1:5432:5432"`, `"3000"`, `3000` or the long
/// syntax `{ published: 8080, target: 80 }`.
fn published_port(entry: &Value) -> Option<u16> {
    match entry {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => {
            let s = s.split('/').next().unwrap_or_default();
            let parts: Vec<&str> = s.split(':').collect();
            let host = match parts.len() {
                1 | 2 => parts[0],
                _ => parts[parts.len() - 2],
            };
            host.split('-').next()?.trim().parse().ok()
        }
        Value::Mapping(map) => map
            .get("published")
            .and_then(|p| match p {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
            .and_then(|p| u16::try_from(p).ok()),
        _ => None,
    }
    .filter(|p| *p > 0)
}

/// `PORT=` and `*_PORT=` assignments.
pub fn parse_env_ports(content: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(port) = ENV_PORT
            .captures(line)
            .and_then(|c| c[1].parse::<u16>().ok())
            .filter(|p| *p > 0)
        {
            push_port(&mut ports, port);
        }
    }
    ports
}

pub(crate) fn push_port(ports: &mut Vec<u16>, port: u16) {
    if !ports.contains(&port) {
        ports.push(port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dockerfile_python_and_platform() {
        let d = parse_dockerfile(
            "FROM --platform=linux/amd64 python:3.11-slim AS build\n\
             RUN pip install -r requirements.txt\n\
             FROM python:3.11-slim\n",
        );
        assert_eq!(d.python_version.as_deref(), Some("3.11"));
        assert_eq!(d.base_image.as_deref(), Some("python:3.11-slim"));
        assert!(d.platform_amd64);
        assert!(!d.has_cuda);
    }

    #[test]
    fn dockerfile_cuda_base() {
        let d = parse_dockerfile("FROM nvidia/cuda:12.2.0-runtime-ubuntu22.04\n");
        assert!(d.has_cuda);
        assert_eq!(d.python_version, None);
    }

    #[test]
    fn compose_host_ports() {
        let ports = parse_compose_ports(
            r#"
services:
  db:
    image: postgres
    ports:
      - "127.0.0.1:5432:5432"
  web:
    ports:
      - "8080:80"
      - 3000
      - "9000-9001:9000-9001"
      - target: 443
        published: 8443
    expose:
      - "7000"
"#,
        )
        .unwrap();
        assert_eq!(ports, vec![5432, 8080, 3000, 9000, 8443]);
    }

    #[test]
    fn env_port_assignments() {
        let ports = parse_env_ports("# local\nPORT=3000\nexport DB_PORT=\"5432\"\nHOST=x\nport=3000\n");
        assert_eq!(ports, vec![3000, 5432]);
    }
}
