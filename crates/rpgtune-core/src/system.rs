//! Host introspection: memory, CPUs, PostgreSQL version and config location.
//!
//! File reads go through [`FileSystem`] so detection can be tested against
//! [`MockFs`] on any platform.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

pub const MEMINFO_PATH: &str = "/proc/meminfo";
pub const CGROUP_MEMORY_MAX_PATH: &str = "/sys/fs/cgroup/memory.max";

/// Error type for host detection.
#[derive(Debug)]
pub enum SystemError {
    Io(io::Error),
    /// Content was read but not understood.
    Parse(String),
    /// No candidate config file exists.
    ConfNotFound(Vec<PathBuf>),
}

impl std::fmt::Display for SystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemError::Io(e) => write!(f, "I/O error: {}", e),
            SystemError::Parse(msg) => write!(f, "parse error: {}", msg),
            SystemError::ConfNotFound(tried) => {
                write!(f, "could not find postgresql.conf; tried:")?;
                for path in tried {
                    write!(f, "\n  {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SystemError {}

impl From<io::Error> for SystemError {
    fn from(e: io::Error) -> Self {
        SystemError::Io(e)
    }
}

/// Read-only filesystem access.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
}

/// Delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory filesystem for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(path.as_ref().to_path_buf(), content.into());
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: not found", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Total memory in bytes from `/proc/meminfo` content.
pub fn parse_meminfo_total(content: &str) -> Result<u64, SystemError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| SystemError::Parse("MemTotal not found in meminfo".to_string()))?;

    let kb: u64 = line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SystemError::Parse(format!("bad MemTotal line: {}", line)))?;
    Ok(kb * 1024)
}

/// cgroup v2 `memory.max`: a byte count, or `max` for no limit.
pub fn parse_cgroup_memory_max(content: &str) -> Option<u64> {
    let trimmed = content.trim();
    if trimmed == "max" {
        return None;
    }
    trimmed.parse().ok()
}

/// Physical memory, capped by the cgroup limit when one is set and smaller.
pub fn detect_total_memory(fs: &dyn FileSystem) -> Result<u64, SystemError> {
    let meminfo = fs.read_to_string(Path::new(MEMINFO_PATH))?;
    let total = parse_meminfo_total(&meminfo)?;

    let limit = fs
        .read_to_string(Path::new(CGROUP_MEMORY_MAX_PATH))
        .ok()
        .and_then(|c| parse_cgroup_memory_max(&c));
    match limit {
        Some(limit) if limit < total => {
            debug!("cgroup memory limit {} below host total {}", limit, total);
            Ok(limit)
        }
        _ => Ok(total),
    }
}

pub fn detect_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|e| {
            warn!("could not detect CPU count ({}); assuming 1", e);
            1
        })
}

/// Major version from `pg_config --version` output.
///
/// Releases before 10 keep two components (`9.6.24` is `9.6`).
pub fn parse_pg_config_version(output: &str) -> Result<String, SystemError> {
    let version = output
        .split_whitespace()
        .find(|w| w.starts_with(|c: char| c.is_ascii_digit()))
        .ok_or_else(|| SystemError::Parse(format!("no version in '{}'", output.trim())))?;

    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty());
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| SystemError::Parse(format!("bad version '{}'", version)))?;

    if major >= 10 {
        return Ok(major.to_string());
    }
    match parts.next() {
        Some(minor) => Ok(format!("{}.{}", major, minor)),
        None => Err(SystemError::Parse(format!("bad version '{}'", version))),
    }
}

/// Runs `pg_config --version`.
pub fn detect_pg_version(pg_config: &Path) -> Result<String, SystemError> {
    let output = Command::new(pg_config).arg("--version").output()?;
    if !output.status.success() {
        return Err(SystemError::Parse(format!(
            "{} exited with {}",
            pg_config.display(),
            output.status
        )));
    }
    parse_pg_config_version(&String::from_utf8_lossy(&output.stdout))
}

/// Well-known `postgresql.conf` locations for a major version.
pub fn conf_candidates(pg_version: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/etc/postgresql/{}/main/postgresql.conf", pg_version)),
        PathBuf::from(format!("/var/lib/pgsql/{}/data/postgresql.conf", pg_version)),
        PathBuf::from("/var/lib/pgsql/data/postgresql.conf"),
        PathBuf::from(format!("/usr/local/var/postgresql@{}/postgresql.conf", pg_version)),
        PathBuf::from(format!("/opt/homebrew/var/postgresql@{}/postgresql.conf", pg_version)),
        PathBuf::from("/usr/local/var/postgres/postgresql.conf"),
        PathBuf::from("/opt/homebrew/var/postgres/postgresql.conf"),
    ]
}

/// First existing candidate.
pub fn find_conf_file(fs: &dyn FileSystem, pg_version: &str) -> Result<PathBuf, SystemError> {
    let candidates = conf_candidates(pg_version);
    match candidates.iter().find(|p| fs.exists(p)) {
        Some(path) => {
            debug!("using config file {}", path.display());
            Ok(path.clone())
        }
        None => Err(SystemError::ConfNotFound(candidates)),
    }
}
