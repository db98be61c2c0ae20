//! Settings groups and the key table shared by the scanner and the decision engine.
//!
//! Every tunable key belongs to exactly one [`GroupId`]. [`SettingsRegistry`]
//! compiles one line pattern per key when it is created; nothing here is
//! mutable after construction.

use regex::Regex;
use serde::Serialize;

use crate::recommend::{
    BgwriterRecommender, MemoryRecommender, MiscRecommender, ParallelRecommender, Recommender,
    WalRecommender, bgwriter, memory, misc, parallel, wal,
};
use crate::snapshot::{ResourceSnapshot, TargetOs};
use crate::units::TimeUnit;

/// Settings categories, in the order they are reviewed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupId {
    Memory,
    Parallel,
    Wal,
    Bgwriter,
    Misc,
}

impl GroupId {
    pub const ORDER: [GroupId; 5] = [
        GroupId::Memory,
        GroupId::Parallel,
        GroupId::Wal,
        GroupId::Bgwriter,
        GroupId::Misc,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GroupId::Memory => "memory",
            GroupId::Parallel => "parallelism",
            GroupId::Wal => "WAL",
            GroupId::Bgwriter => "background writer",
            GroupId::Misc => "miscellaneous",
        }
    }
}

/// How a setting's value is parsed for comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueKind {
    /// Size with a `kB`/`MB`/`GB`/`TB` suffix.
    Bytes,
    /// Duration; bare integers are in the given unit.
    Duration(TimeUnit),
    Integer,
    Float,
}

/// Static description of a tunable key.
#[derive(Debug)]
pub struct SettingSpec {
    pub key: &'static str,
    pub group: GroupId,
    pub kind: ValueKind,
    /// First PostgreSQL major version that has this key; 0 for all.
    pub min_pg_major: u32,
    /// Platforms where the key is not available.
    pub excluded_os: &'static [TargetOs],
}

impl SettingSpec {
    const fn new(key: &'static str, group: GroupId, kind: ValueKind) -> Self {
        Self {
            key,
            group,
            kind,
            min_pg_major: 0,
            excluded_os: &[],
        }
    }

    const fn since(mut self, major: u32) -> Self {
        self.min_pg_major = major;
        self
    }

    const fn not_on(mut self, os: &'static [TargetOs]) -> Self {
        self.excluded_os = os;
        self
    }

    /// Whether this key exists for the snapshot's version and platform.
    pub fn applies_to(&self, snapshot: &ResourceSnapshot) -> bool {
        snapshot.pg_major() >= self.min_pg_major && !self.excluded_os.contains(&snapshot.os)
    }
}

/// All known tunable keys, grouped and ordered as they are presented.
pub static SETTINGS: &[SettingSpec] = &[
    // Memory
    SettingSpec::new(memory::SHARED_BUFFERS, GroupId::Memory, ValueKind::Bytes),
    SettingSpec::new(memory::EFFECTIVE_CACHE_SIZE, GroupId::Memory, ValueKind::Bytes),
    SettingSpec::new(memory::MAINTENANCE_WORK_MEM, GroupId::Memory, ValueKind::Bytes),
    SettingSpec::new(memory::WORK_MEM, GroupId::Memory, ValueKind::Bytes),
    // Parallelism
    SettingSpec::new(parallel::MAX_BACKGROUND_WORKERS, GroupId::Parallel, ValueKind::Integer),
    SettingSpec::new(parallel::MAX_WORKER_PROCESSES, GroupId::Parallel, ValueKind::Integer),
    SettingSpec::new(
        parallel::MAX_PARALLEL_WORKERS_PER_GATHER,
        GroupId::Parallel,
        ValueKind::Integer,
    ),
    SettingSpec::new(
        parallel::MAX_PARALLEL_WORKERS,
        GroupId::Parallel,
        ValueKind::Integer,
    )
    .since(10),
    // WAL
    SettingSpec::new(wal::WAL_BUFFERS, GroupId::Wal, ValueKind::Bytes),
    SettingSpec::new(wal::MIN_WAL_SIZE, GroupId::Wal, ValueKind::Bytes),
    SettingSpec::new(wal::MAX_WAL_SIZE, GroupId::Wal, ValueKind::Bytes),
    SettingSpec::new(
        wal::CHECKPOINT_TIMEOUT,
        GroupId::Wal,
        ValueKind::Duration(TimeUnit::Seconds),
    ),
    // Background writer
    SettingSpec::new(
        bgwriter::BGWRITER_DELAY,
        GroupId::Bgwriter,
        ValueKind::Duration(TimeUnit::Milliseconds),
    ),
    SettingSpec::new(bgwriter::BGWRITER_LRU_MAXPAGES, GroupId::Bgwriter, ValueKind::Integer),
    // Miscellaneous
    SettingSpec::new(misc::DEFAULT_STATISTICS_TARGET, GroupId::Misc, ValueKind::Integer),
    SettingSpec::new(misc::RANDOM_PAGE_COST, GroupId::Misc, ValueKind::Float),
    SettingSpec::new(misc::CHECKPOINT_COMPLETION_TARGET, GroupId::Misc, ValueKind::Float),
    SettingSpec::new(misc::MAX_CONNECTIONS, GroupId::Misc, ValueKind::Integer),
    SettingSpec::new(misc::MAX_LOCKS_PER_TRANSACTION, GroupId::Misc, ValueKind::Integer),
    SettingSpec::new(misc::AUTOVACUUM_MAX_WORKERS, GroupId::Misc, ValueKind::Integer),
    SettingSpec::new(
        misc::AUTOVACUUM_NAPTIME,
        GroupId::Misc,
        ValueKind::Duration(TimeUnit::Seconds),
    ),
    SettingSpec::new(misc::EFFECTIVE_IO_CONCURRENCY, GroupId::Misc, ValueKind::Integer)
        .not_on(&[TargetOs::MacOs, TargetOs::Windows]),
];

/// A category of settings gated to one snapshot's version and platform.
#[derive(Debug)]
pub struct SettingsGroup {
    pub id: GroupId,
    pub keys: Vec<&'static SettingSpec>,
}

impl SettingsGroup {
    /// Collects the group's keys that exist for `snapshot`.
    pub fn for_snapshot(id: GroupId, snapshot: &ResourceSnapshot) -> Self {
        let keys = SETTINGS
            .iter()
            .filter(|s| s.group == id && s.applies_to(snapshot))
            .collect();
        Self { id, keys }
    }

    pub fn label(&self) -> &'static str {
        self.id.label()
    }

    /// Builds the recommender for this category.
    pub fn recommender<'a>(&self, snapshot: &'a ResourceSnapshot) -> Box<dyn Recommender + 'a> {
        match self.id {
            GroupId::Memory => Box::new(MemoryRecommender::new(snapshot)),
            GroupId::Parallel => Box::new(ParallelRecommender::new(snapshot)),
            GroupId::Wal => Box::new(WalRecommender::new(snapshot)),
            GroupId::Bgwriter => Box::new(BgwriterRecommender::new(snapshot)),
            GroupId::Misc => Box::new(MiscRecommender::new(snapshot)),
        }
    }
}

/// Every group for `snapshot`, in review order.
pub fn all_groups(snapshot: &ResourceSnapshot) -> Vec<SettingsGroup> {
    GroupId::ORDER
        .into_iter()
        .map(|id| SettingsGroup::for_snapshot(id, snapshot))
        .collect()
}

/// A known key together with its compiled line pattern.
#[derive(Debug)]
pub struct RegistryEntry {
    pub spec: &'static SettingSpec,
    pub pattern: Regex,
}

/// Compiled line patterns for every known key and for the preload line.
///
/// Capture groups: `prefix` (leading whitespace and comment markers), `value`
/// (`libraries` for the preload line), `trailing` (whitespace and an optional
/// `#` comment).
#[derive(Debug)]
pub struct SettingsRegistry {
    entries: Vec<RegistryEntry>,
    preload: Regex,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        let entries = SETTINGS
            .iter()
            .map(|spec| RegistryEntry {
                spec,
                pattern: setting_pattern(spec.key),
            })
            .collect();
        let preload = Regex::new(
            r"^(?P<prefix>\s*#*\s*)shared_preload_libraries\s*=\s*'(?P<libraries>[^']*)'(?P<trailing>.*)$",
        )
        .expect("preload pattern is valid");
        Self { entries, preload }
    }

    pub fn preload_pattern(&self) -> &Regex {
        &self.preload
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn spec(&self, key: &str) -> Option<&'static SettingSpec> {
        self.entries
            .iter()
            .find(|e| e.spec.key == key)
            .map(|e| e.spec)
    }
}

impl Default for SettingsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn setting_pattern(key: &str) -> Regex {
    let pattern = format!(
        r"^(?P<prefix>\s*#*\s*){}\s*=\s*(?P<value>'[^']*'|[^\s#']*)(?P<trailing>\s*(?:#.*)?)$",
        regex::escape(key)
    );
    Regex::new(&pattern).expect("setting keys are plain identifiers")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GB;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let mut seen = HashSet::new();
        for spec in SETTINGS {
            assert!(seen.insert(spec.key), "duplicate key {}", spec.key);
        }
    }

    #[test]
    fn test_every_group_has_keys() {
        let snap = ResourceSnapshot::new(8 * GB, 4, "16").with_os(TargetOs::Linux);
        for group in all_groups(&snap) {
            assert!(!group.keys.is_empty(), "{} is empty", group.label());
        }
    }

    #[test]
    fn test_version_gate() {
        let old = ResourceSnapshot::new(8 * GB, 4, "9.6");
        let group = SettingsGroup::for_snapshot(GroupId::Parallel, &old);
        assert!(!group.keys.iter().any(|s| s.key == parallel::MAX_PARALLEL_WORKERS));

        let new = ResourceSnapshot::new(8 * GB, 4, "10");
        let group = SettingsGroup::for_snapshot(GroupId::Parallel, &new);
        assert!(group.keys.iter().any(|s| s.key == parallel::MAX_PARALLEL_WORKERS));
    }

    #[test]
    fn test_os_gate() {
        let mac = ResourceSnapshot::new(8 * GB, 4, "16").with_os(TargetOs::MacOs);
        let group = SettingsGroup::for_snapshot(GroupId::Misc, &mac);
        assert!(!group.keys.iter().any(|s| s.key == misc::EFFECTIVE_IO_CONCURRENCY));

        let linux = mac.with_os(TargetOs::Linux);
        let group = SettingsGroup::for_snapshot(GroupId::Misc, &linux);
        assert!(group.keys.iter().any(|s| s.key == misc::EFFECTIVE_IO_CONCURRENCY));
    }

    #[test]
    fn test_pattern_captures() {
        let registry = SettingsRegistry::new();
        let entry = registry
            .entries()
            .iter()
            .find(|e| e.spec.key == memory::SHARED_BUFFERS)
            .unwrap();

        let caps = entry
            .pattern
            .captures("#shared_buffers = 128MB\t\t\t# min 128kB")
            .unwrap();
        assert_eq!(&caps["prefix"], "#");
        assert_eq!(&caps["value"], "128MB");
        assert_eq!(&caps["trailing"], "\t\t\t# min 128kB");

        let caps = entry.pattern.captures("shared_buffers = '1GB'").unwrap();
        assert_eq!(&caps["value"], "'1GB'");
        assert_eq!(&caps["trailing"], "");

        assert!(entry.pattern.captures("shared_buffers_x = 1GB").is_none());
        assert!(entry.pattern.captures("foo shared_buffers = 1GB").is_none());
    }

    #[test]
    fn test_dotted_key_is_escaped() {
        let registry = SettingsRegistry::new();
        let entry = registry
            .entries()
            .iter()
            .find(|e| e.spec.key == parallel::MAX_BACKGROUND_WORKERS)
            .unwrap();
        assert!(entry.pattern.is_match("timescaledb.max_background_workers = 8"));
        assert!(!entry.pattern.is_match("timescaledbXmax_background_workers = 8"));
    }
}
