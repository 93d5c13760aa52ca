//! Live host inspection and port probing.
//!
//! Every probe is time-bounded and degrades to `None`/`false`; inspection
//! never fails as a whole.

use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::profile::HostProfile;

const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(150);
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Answers whether something on the host already accepts connections on a
/// port. Implementations must not bind and must return promptly.
pub trait PortProbe: Send + Sync {
    fn in_use(&self, port: u16) -> bool;
}

/// Loopback TCP connect with a short timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPortProbe;

impl PortProbe for LocalPortProbe {
    fn in_use(&self, port: u16) -> bool {
        if port == 0 {
            return false;
        }
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, PORT_PROBE_TIMEOUT).is_ok()
    }
}

/// Probe that never reports a port as taken. Used when the host is
/// described by a file rather than inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPortProbe;

impl PortProbe for NullPortProbe {
    fn in_use(&self, _port: u16) -> bool {
        false
    }
}

/// Inspect the machine this process runs on.
pub fn inspect_host() -> HostProfile {
    let os = normalize_os(std::env::consts::OS);
    let arch = normalize_arch(std::env::consts::ARCH);

    let cuda_version = run_probe(
        "nvidia-smi",
        &["--query-gpu=driver_version", "--format=csv,noheader"],
        GPU_PROBE_TIMEOUT,
    )
    .and_then(|out| out.lines().next().map(|l| l.trim().to_string()))
    .filter(|v| !v.is_empty());

    let python_version = run_probe("python3", &["--version"], VERSION_PROBE_TIMEOUT)
        .or_else(|| run_probe("python", &["--version"], VERSION_PROBE_TIMEOUT))
        .and_then(|out| version_token(&out, 1));
    let node_version = run_probe("node", &["--version"], VERSION_PROBE_TIMEOUT)
        .and_then(|out| version_token(&out, 0));
    let rust_version = run_probe("rustc", &["--version"], VERSION_PROBE_TIMEOUT)
        .and_then(|out| version_token(&out, 1));

    let host = HostProfile {
        cuda_available: cuda_version.is_some(),
        cuda_version,
        python_version,
        node_version,
        rust_version,
        has_compiler: ["gcc", "clang", "cc"].iter().any(|c| on_path(c)),
        has_metal: os == "macos",
        has_libgl: has_libgl(&os),
        has_ffmpeg: on_path("ffmpeg"),
        ram_gb: ram_gb(&os),
        os,
        arch,
    };
    tracing::debug!(host = %host.summary(), "inspected host");
    host
}

pub(crate) fn normalize_os(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "macos" | "darwin" => "macos",
        "windows" => "windows",
        _ => "linux",
    }
    .into()
}

pub(crate) fn normalize_arch(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "aarch64" | "arm64" | "arm" => "arm64",
        _ => "x86_64",
    }
    .into()
}

/// Pick the whitespace-separated token at `index` (falling back to the
/// first), e.g. `Python 3.11.5` -> `3.11.5`, `rustc 1.75.0 (...)` -> `1.75.0`.
fn version_token(output: &str, index: usize) -> Option<String> {
    let parts: Vec<&str> = output.split_whitespace().collect();
    parts
        .get(index)
        .or_else(|| parts.first())
        .map(|s| s.to_string())
}

/// Run a command, returning trimmed stdout on success. The child is killed
/// once `timeout` elapses.
///
/// Both pipes are drained on their own threads while the deadline is polled,
/// so a child writing more than the pipe buffer still runs to completion.
fn run_probe(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                tracing::debug!(program, "probe timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                tracing::debug!(program, error = %e, "probe failed");
                let _ = child.kill();
                return None;
            }
        }
    };
    if !status.success() {
        return None;
    }

    // `python --version` wrote to stderr before 3.4.
    let mut out = stdout.join().ok()?;
    if out.trim().is_empty() {
        out = stderr.join().ok()?;
    }
    let out = out.trim().to_string();
    (!out.is_empty()).then_some(out)
}

/// Read a child pipe to the end on a helper thread. Unreadable output
/// yields an empty string.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn on_path(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

fn has_libgl(os: &str) -> bool {
    match os {
        "macos" => true,
        "linux" => run_probe("ldconfig", &["-p"], Duration::from_secs(2))
            .is_some_and(|out| out.contains("libGL")),
        _ => false,
    }
}

fn ram_gb(os: &str) -> Option<f64> {
    match os {
        "linux" => {
            let content = std::fs::read_to_string(Path::new("/proc/meminfo")).ok()?;
            parse_meminfo(&content)
        }
        "macos" => run_probe("sysctl", &["-n", "hw.memsize"], Duration::from_secs(2))
            .and_then(|out| out.trim().parse::<u64>().ok())
            .map(|bytes| bytes as f64 / 1024f64.powi(3)),
        _ => None,
    }
}

fn parse_meminfo(content: &str) -> Option<f64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb as f64 / 1024f64.powi(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn normalizes_platform_names() {
        assert_eq!(normalize_os("darwin"), "macos");
        assert_eq!(normalize_os("freebsd"), "linux");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("x86_64"), "x86_64");
    }

    #[test]
    fn extracts_version_tokens() {
        assert_eq!(version_token("Python 3.11.5", 1).as_deref(), Some("3.11.5"));
        assert_eq!(version_token("v20.10.0", 0).as_deref(), Some("v20.10.0"));
        assert_eq!(
            version_token("rustc 1.75.0 (82e1608df 2023-12-21)", 1).as_deref(),
            Some("1.75.0")
        );
        assert_eq!(version_token("", 0), None);
    }

    #[test]
    fn meminfo_total_in_gb() {
        let content = "MemTotal:       16323836 kB\nMemFree:         1000 kB\n";
        let gb = parse_meminfo(content).unwrap();
        assert!((gb - 15.57).abs() < 0.01);
        assert_eq!(parse_meminfo("nothing here"), None);
    }

    #[cfg(unix)]
    #[test]
    fn large_output_is_not_lost() {
        let out = run_probe(
            "sh",
            &["-c", "head -c 100000 /dev/zero | tr '\\0' a"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(out.len(), 100_000);
        assert!(out.chars().all(|c| c == 'a'));
    }

    #[cfg(unix)]
    #[test]
    fn slow_probe_is_killed() {
        let started = Instant::now();
        assert!(run_probe("sh", &["-c", "sleep 5"], Duration::from_millis(200)).is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_degrades_to_none() {
        assert!(run_probe("hostfit-no-such-binary", &[], Duration::from_millis(200)).is_none());
    }

    #[test]
    fn local_probe_sees_listener() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(LocalPortProbe.in_use(port));
        drop(listener);
        assert!(!NullPortProbe.in_use(port));
    }
}
