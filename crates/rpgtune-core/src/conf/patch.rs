//! Applies accepted changes to a [`ConfFile`] and writes it back out.
//!
//! Existing lines are only ever replaced in place; new lines go at the end.

use std::io::{self, Write};

use tracing::debug;

use crate::conf::{ConfFile, ParsedLine, PreloadAction, PreloadLine};
use crate::decide::GroupDecisions;

/// Formats a setting line, keeping the original trailing comment.
pub fn format_setting(key: &str, value: &str, trailing: &str) -> String {
    format!("{} = {}{}", key, value, trailing)
}

impl ConfFile {
    /// Sets `key` to `value`: rewrites its line if the file has one, otherwise
    /// appends a new line. Returns the line index written.
    pub fn apply_setting(&mut self, key: &'static str, value: &str) -> usize {
        match self.settings.get_mut(key) {
            Some(parsed) => {
                let line = format_setting(key, value, &parsed.trailing);
                self.lines[parsed.index] = line;
                parsed.commented = false;
                parsed.value = value.to_string();
                debug!("replaced {} on line {}", key, parsed.index + 1);
                parsed.index
            }
            None => {
                let trailing = self.line_ending().to_string();
                let index = self.append_line(format_setting(key, value, ""));
                self.settings.insert(
                    key,
                    ParsedLine {
                        index,
                        commented: false,
                        value: value.to_string(),
                        trailing,
                    },
                );
                debug!("appended {} on line {}", key, index + 1);
                index
            }
        }
    }

    /// Applies a preload decision. `Unchanged` is a no-op.
    pub fn apply_preload(&mut self, action: &PreloadAction) {
        let index = match action {
            PreloadAction::Unchanged => return,
            PreloadAction::Update { index, line } => {
                self.lines[*index] = line.clone();
                *index
            }
            PreloadAction::Append { line } => self.append_line(line.clone()),
        };

        // key = '<libraries>'<trailing>
        let mut parts = self.lines[index].splitn(3, '\'').skip(1);
        let libraries = parts.next().unwrap_or_default().to_string();
        let trailing = parts.next().unwrap_or_default().to_string();
        self.preload = Some(PreloadLine {
            index,
            commented: false,
            libraries,
            trailing,
        });
    }

    /// Writes the whole file.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(self.render().as_bytes())?;
        w.flush()
    }

    /// `"\r"` when the file uses CRLF line endings.
    fn line_ending(&self) -> &'static str {
        match self.lines.last() {
            Some(last) if last.ends_with('\r') => "\r",
            _ => "",
        }
    }

    /// Appends `line`, matching the file's line ending.
    fn append_line(&mut self, mut line: String) -> usize {
        if self.lines.is_empty() {
            self.trailing_newline = true;
        }
        line.push_str(self.line_ending());
        self.lines.push(line);
        self.lines.len() - 1
    }
}

/// Writes every visible decision of an accepted group. Returns how many
/// settings were changed.
pub fn apply_group(conf: &mut ConfFile, group: &GroupDecisions) -> usize {
    let mut changed = 0;
    for decision in group.visible() {
        conf.apply_setting(decision.key, &decision.recommended);
        changed += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{TIMESCALEDB_LIBRARY, reconcile_preload, scan};
    use crate::recommend::memory;
    use crate::settings::SettingsRegistry;

    #[test]
    fn test_replace_keeps_position_and_comment() {
        let registry = SettingsRegistry::new();
        let mut conf = scan(
            "# top\n#shared_buffers = 128MB\t\t# min 128kB\nother = 1\n",
            &registry,
        );

        let index = conf.apply_setting(memory::SHARED_BUFFERS, "2GB");
        assert_eq!(index, 1);
        assert_eq!(
            conf.render(),
            "# top\nshared_buffers = 2GB\t\t# min 128kB\nother = 1\n"
        );

        let parsed = conf.setting(memory::SHARED_BUFFERS).unwrap();
        assert!(!parsed.commented);
        assert_eq!(parsed.value, "2GB");
    }

    #[test]
    fn test_missing_key_appended_at_end() {
        let registry = SettingsRegistry::new();
        let mut conf = scan("a = 1\nb = 2\n", &registry);

        let index = conf.apply_setting(memory::WORK_MEM, "26214kB");
        assert_eq!(index, 2);
        assert_eq!(conf.render(), "a = 1\nb = 2\nwork_mem = 26214kB\n");
    }

    #[test]
    fn test_append_to_empty_file() {
        let registry = SettingsRegistry::new();
        let mut conf = scan("", &registry);
        conf.apply_setting(memory::WORK_MEM, "64MB");
        assert_eq!(conf.render(), "work_mem = 64MB\n");
    }

    #[test]
    fn test_preload_patched_in_place() {
        let registry = SettingsRegistry::new();
        let mut conf = scan(
            "x = 1\n#shared_preload_libraries = 'pg_stat_statements'\ny = 2\n",
            &registry,
        );
        let action = reconcile_preload(conf.preload(), TIMESCALEDB_LIBRARY);
        conf.apply_preload(&action);
        assert_eq!(
            conf.render(),
            "x = 1\nshared_preload_libraries = 'pg_stat_statements,timescaledb'\ny = 2\n"
        );
        assert_eq!(
            reconcile_preload(conf.preload(), TIMESCALEDB_LIBRARY),
            PreloadAction::Unchanged
        );
    }

    #[test]
    fn test_preload_appended_when_missing() {
        let registry = SettingsRegistry::new();
        let mut conf = scan("x = 1\n", &registry);
        let action = reconcile_preload(conf.preload(), TIMESCALEDB_LIBRARY);
        conf.apply_preload(&action);
        assert_eq!(
            conf.render(),
            "x = 1\nshared_preload_libraries = 'timescaledb'\t# (change requires restart)\n"
        );
        assert_eq!(conf.preload().unwrap().index, 1);
    }

    #[test]
    fn test_append_keeps_crlf_endings() {
        let registry = SettingsRegistry::new();
        let mut conf = scan("a = 1\r\nshared_buffers = 128MB\r\n", &registry);
        conf.apply_setting(memory::SHARED_BUFFERS, "2GB");
        conf.apply_setting(memory::WORK_MEM, "26214kB");
        conf.apply_preload(&reconcile_preload(conf.preload(), TIMESCALEDB_LIBRARY));
        assert_eq!(
            conf.render(),
            "a = 1\r\nshared_buffers = 2GB\r\nwork_mem = 26214kB\r\n\
             shared_preload_libraries = 'timescaledb'\t# (change requires restart)\r\n"
        );

        conf.apply_setting(memory::WORK_MEM, "64MB");
        assert!(conf.render().contains("\r\nwork_mem = 64MB\r\n"));
        assert_eq!(conf.preload().unwrap().libraries, "timescaledb");
    }

    #[test]
    fn test_write_to_file() {
        let registry = SettingsRegistry::new();
        let mut conf = scan("# keep me\nwork_mem = 4MB\n", &registry);
        conf.apply_setting(memory::WORK_MEM, "8MB");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postgresql.conf");
        conf.write_to(std::fs::File::create(&path).unwrap()).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "# keep me\nwork_mem = 8MB\n");
    }
}
