use tracing::{debug, warn};

use crate::conf::{ConfFile, ParsedLine, PreloadLine};
use crate::settings::SettingsRegistry;

/// Scans `content` once, recording every known setting and the preload line.
///
/// A line matching the preload pattern is not tested against setting
/// patterns. When a key (or the preload line) appears more than once the last
/// occurrence wins and a warning names both line numbers.
pub fn scan(content: &str, registry: &SettingsRegistry) -> ConfFile {
    let mut conf = ConfFile::default();

    if !content.is_empty() {
        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        if content.ends_with('\n') {
            lines.pop();
            conf.trailing_newline = true;
        }
        conf.lines = lines;
    }

    for (index, line) in conf.lines.iter().enumerate() {
        if let Some(caps) = registry.preload_pattern().captures(line) {
            let parsed = PreloadLine {
                index,
                commented: caps["prefix"].contains('#'),
                libraries: caps["libraries"].to_string(),
                trailing: caps["trailing"].to_string(),
            };
            if let Some(prev) = conf.preload.replace(parsed) {
                warn!(
                    "shared_preload_libraries appears on lines {} and {}; using the last one",
                    prev.index + 1,
                    index + 1
                );
            }
            continue;
        }

        for entry in registry.entries() {
            let Some(caps) = entry.pattern.captures(line) else {
                continue;
            };
            let parsed = ParsedLine {
                index,
                commented: caps["prefix"].contains('#'),
                value: caps["value"].to_string(),
                trailing: caps["trailing"].to_string(),
            };
            if let Some(prev) = conf.settings.insert(entry.spec.key, parsed) {
                warn!(
                    "{} appears on lines {} and {}; using the last one",
                    entry.spec.key,
                    prev.index + 1,
                    index + 1
                );
            }
            break;
        }
    }

    debug!(
        "scanned {} lines: {} known settings, preload line {}",
        conf.lines.len(),
        conf.settings.len(),
        if conf.preload.is_some() { "found" } else { "missing" }
    );
    conf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommend::{memory, misc, parallel};

    const SAMPLE: &str = "\
# -----------------------------
# PostgreSQL configuration file
# -----------------------------

listen_addresses = '*'
max_connections = 100\t\t\t# (change requires restart)
#shared_preload_libraries = 'pg_stat_statements'\t# (change requires restart)

shared_buffers = 128MB\t\t\t# min 128kB
#work_mem = 4MB\t\t\t\t# min 64kB
## maintenance_work_mem = 64MB
timescaledb.max_background_workers = 8
";

    #[test]
    fn test_scan_records_settings() {
        let registry = SettingsRegistry::new();
        let conf = scan(SAMPLE, &registry);

        let sb = conf.setting(memory::SHARED_BUFFERS).unwrap();
        assert_eq!(sb.index, 8);
        assert!(!sb.commented);
        assert_eq!(sb.value, "128MB");
        assert_eq!(sb.trailing, "\t\t\t# min 128kB");

        let wm = conf.setting(memory::WORK_MEM).unwrap();
        assert!(wm.commented);
        assert_eq!(wm.value, "4MB");

        let mwm = conf.setting(memory::MAINTENANCE_WORK_MEM).unwrap();
        assert!(mwm.commented);
        assert_eq!(mwm.trailing, "");

        let mc = conf.setting(misc::MAX_CONNECTIONS).unwrap();
        assert_eq!(mc.value, "100");

        assert!(conf.setting(parallel::MAX_BACKGROUND_WORKERS).is_some());
        assert!(conf.setting(memory::EFFECTIVE_CACHE_SIZE).is_none());
        assert_eq!(conf.matched_settings(), 5);
    }

    #[test]
    fn test_scan_records_preload_line() {
        let registry = SettingsRegistry::new();
        let conf = scan(SAMPLE, &registry);

        let preload = conf.preload().unwrap();
        assert_eq!(preload.index, 6);
        assert!(preload.commented);
        assert_eq!(preload.libraries, "pg_stat_statements");
        assert_eq!(preload.trailing, "\t# (change requires restart)");
    }

    #[test]
    fn test_scan_keeps_every_line() {
        let registry = SettingsRegistry::new();
        let conf = scan(SAMPLE, &registry);
        assert_eq!(conf.lines().len(), 12);
        assert_eq!(conf.lines()[4], "listen_addresses = '*'");
        assert_eq!(conf.render(), SAMPLE);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let registry = SettingsRegistry::new();
        let conf = scan(
            "shared_buffers = 1GB\n#shared_buffers = 2GB\nwork_mem = 8MB\n",
            &registry,
        );
        let sb = conf.setting(memory::SHARED_BUFFERS).unwrap();
        assert_eq!(sb.index, 1);
        assert_eq!(sb.value, "2GB");
        assert!(sb.commented);
    }

    #[test]
    fn test_duplicate_preload_last_wins() {
        let registry = SettingsRegistry::new();
        let conf = scan(
            "shared_preload_libraries = 'a'\nshared_preload_libraries = 'b'\n",
            &registry,
        );
        assert_eq!(conf.preload().unwrap().libraries, "b");
        assert_eq!(conf.preload().unwrap().index, 1);
    }

    #[test]
    fn test_unrelated_and_malformed_lines_ignored() {
        let registry = SettingsRegistry::new();
        let conf = scan(
            "shared_buffers = 1GB extra words\nmy_shared_buffers = 1GB\n",
            &registry,
        );
        assert_eq!(conf.matched_settings(), 0);
        assert_eq!(conf.lines().len(), 2);
    }
}
