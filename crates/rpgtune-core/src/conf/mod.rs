//! Line model for `postgresql.conf`.
//!
//! The file is kept as its original sequence of lines. Scanning records where
//! each known setting and the `shared_preload_libraries` line live; patching
//! replaces lines by index or appends at the end, so everything else is written
//! back exactly as it was read.

pub mod patch;
pub mod preload;
pub mod scan;

use std::collections::HashMap;

pub use patch::format_setting;
pub use preload::{PreloadAction, TIMESCALEDB_LIBRARY, reconcile_preload};
pub use scan::scan;

/// Position and content of a matched setting line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Zero-based index into the line buffer.
    pub index: usize,
    /// Line starts with one or more `#`.
    pub commented: bool,
    /// Value exactly as written, quotes included.
    pub value: String,
    /// Whitespace and comment after the value, kept when the line is rewritten.
    pub trailing: String,
}

/// The `shared_preload_libraries` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadLine {
    pub index: usize,
    pub commented: bool,
    /// Contents between the quotes, e.g. `pg_stat_statements,auto_explain`.
    pub libraries: String,
    pub trailing: String,
}

/// A configuration file held as lines plus the positions of known settings.
#[derive(Debug, Clone, Default)]
pub struct ConfFile {
    lines: Vec<String>,
    trailing_newline: bool,
    settings: HashMap<&'static str, ParsedLine>,
    preload: Option<PreloadLine>,
}

impl ConfFile {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn setting(&self, key: &str) -> Option<&ParsedLine> {
        self.settings.get(key)
    }

    pub fn preload(&self) -> Option<&PreloadLine> {
        self.preload.as_ref()
    }

    /// Number of tunable keys found in the file.
    pub fn matched_settings(&self) -> usize {
        self.settings.len()
    }

    /// Whole file as text, with the original final newline if there was one.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}
