//! Host resources and operator choices that drive every recommendation.

use serde::Serialize;

use crate::units::GB;

/// Background workers assumed when the operator doesn't say otherwise.
pub const DEFAULT_MAX_BACKGROUND_WORKERS: usize = 16;
/// Lowest background worker budget the tuner will recommend.
pub const MIN_MAX_BACKGROUND_WORKERS: usize = 8;

/// Upper memory bound (exclusive) and the max_connections used below it.
const MAX_CONNECTIONS_TIERS: [(u64, u64); 3] = [(2 * GB, 20), (4 * GB, 50), (6 * GB, 75)];
const MAX_CONNECTIONS_LARGE: u64 = 100;

/// PostgreSQL major versions the tuner knows how to handle.
pub const SUPPORTED_PG_VERSIONS: &[&str] = &["9.6", "10", "11", "12", "13", "14", "15", "16", "17"];

/// Returns `true` if `version` is one of [`SUPPORTED_PG_VERSIONS`].
pub fn is_supported_version(version: &str) -> bool {
    SUPPORTED_PG_VERSIONS.contains(&version)
}

/// Named variant of recommendation behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Default,
    /// Metrics ingest workloads: aggressive background writer, longer checkpoints.
    Promscale,
}

impl Profile {
    pub fn name(self) -> &'static str {
        match self {
            Profile::Default => "default",
            Profile::Promscale => "promscale",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "" => Ok(Profile::Default),
            "promscale" => Ok(Profile::Promscale),
            other => Err(format!(
                "unknown profile '{}' (expected 'default' or 'promscale')",
                other
            )),
        }
    }
}

/// Operating system the server runs on. Some limits and keys depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetOs {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl TargetOs {
    /// The OS this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            TargetOs::Linux
        } else if cfg!(target_os = "macos") {
            TargetOs::MacOs
        } else if cfg!(target_os = "windows") {
            TargetOs::Windows
        } else {
            TargetOs::Other
        }
    }
}

/// Immutable resource snapshot for one tuning run.
///
/// Built once from host introspection and operator overrides, then shared by
/// reference with every recommender.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    /// Total memory available to PostgreSQL, in bytes.
    pub total_memory: u64,
    pub cpus: usize,
    /// Operator-supplied max_connections; `0` lets the tuner pick.
    pub max_connections: u64,
    /// Size of a dedicated WAL disk in bytes; `0` when not set.
    pub wal_disk_size: u64,
    /// Major version string such as `"9.6"` or `"16"`.
    pub pg_version: String,
    pub max_background_workers: usize,
    pub profile: Profile,
    pub os: TargetOs,
}

impl ResourceSnapshot {
    /// Creates a snapshot with default profile, no overrides and the build OS.
    pub fn new(total_memory: u64, cpus: usize, pg_version: impl Into<String>) -> Self {
        Self {
            total_memory,
            cpus,
            max_connections: 0,
            wal_disk_size: 0,
            pg_version: pg_version.into(),
            max_background_workers: DEFAULT_MAX_BACKGROUND_WORKERS,
            profile: Profile::Default,
            os: TargetOs::current(),
        }
    }

    pub fn with_max_connections(mut self, conns: u64) -> Self {
        self.max_connections = conns;
        self
    }

    pub fn with_wal_disk_size(mut self, bytes: u64) -> Self {
        self.wal_disk_size = bytes;
        self
    }

    /// Sets the background worker budget, raised to the minimum if lower.
    pub fn with_max_background_workers(mut self, workers: usize) -> Self {
        self.max_background_workers = workers.max(MIN_MAX_BACKGROUND_WORKERS);
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_os(mut self, os: TargetOs) -> Self {
        self.os = os;
        self
    }

    /// Connection count the server will run with: the operator's override,
    /// otherwise a memory tier.
    pub fn resolved_max_connections(&self) -> u64 {
        if self.max_connections > 0 {
            return self.max_connections;
        }
        MAX_CONNECTIONS_TIERS
            .iter()
            .find(|(limit, _)| self.total_memory < *limit)
            .map(|(_, conns)| *conns)
            .unwrap_or(MAX_CONNECTIONS_LARGE)
    }

    /// Integer major version: `"9.6"` is 9, `"16"` is 16. Unparsable strings
    /// map to 0 so version gates treat them as the oldest release.
    pub fn pg_major(&self) -> u32 {
        self.pg_version
            .split('.')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_major() {
        assert_eq!(ResourceSnapshot::new(GB, 1, "9.6").pg_major(), 9);
        assert_eq!(ResourceSnapshot::new(GB, 1, "16").pg_major(), 16);
        assert_eq!(ResourceSnapshot::new(GB, 1, "garbage").pg_major(), 0);
    }

    #[test]
    fn test_resolved_max_connections() {
        assert_eq!(ResourceSnapshot::new(GB, 4, "16").resolved_max_connections(), 20);
        assert_eq!(ResourceSnapshot::new(4 * GB, 4, "16").resolved_max_connections(), 75);
        assert_eq!(ResourceSnapshot::new(8 * GB, 4, "16").resolved_max_connections(), 100);

        let snap = ResourceSnapshot::new(8 * GB, 4, "16").with_max_connections(30);
        assert_eq!(snap.resolved_max_connections(), 30);
    }

    #[test]
    fn test_background_workers_floor() {
        let snap = ResourceSnapshot::new(GB, 4, "16").with_max_background_workers(2);
        assert_eq!(snap.max_background_workers, MIN_MAX_BACKGROUND_WORKERS);

        let snap = ResourceSnapshot::new(GB, 4, "16").with_max_background_workers(32);
        assert_eq!(snap.max_background_workers, 32);
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("promscale".parse::<Profile>().unwrap(), Profile::Promscale);
        assert_eq!("Default".parse::<Profile>().unwrap(), Profile::Default);
        assert!("olap".parse::<Profile>().is_err());
    }

    #[test]
    fn test_supported_versions() {
        assert!(is_supported_version("9.6"));
        assert!(is_supported_version("17"));
        assert!(!is_supported_version("9.5"));
        assert!(!is_supported_version("16.2"));
    }
}
