//! Reconciles the list-valued `shared_preload_libraries` line.

use crate::conf::PreloadLine;

pub const TIMESCALEDB_LIBRARY: &str = "timescaledb";

const PRELOAD_KEY: &str = "shared_preload_libraries";
const RESTART_COMMENT: &str = "\t# (change requires restart)";

/// What to do with the preload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadAction {
    /// Already active and lists the library.
    Unchanged,
    /// Rewrite the existing line at `index`.
    Update { index: usize, line: String },
    /// No preload line exists; add one at the end of the file.
    Append { line: String },
}

/// Decides how to make `library` part of an active preload line.
///
/// Existing entries keep their order, the line is uncommented, and its
/// trailing comment is preserved.
pub fn reconcile_preload(current: Option<&PreloadLine>, library: &str) -> PreloadAction {
    let Some(current) = current else {
        return PreloadAction::Append {
            line: format_preload(&[library], RESTART_COMMENT),
        };
    };

    let mut libraries = split_libraries(&current.libraries);
    let present = libraries.contains(&library);
    if present && !current.commented {
        return PreloadAction::Unchanged;
    }
    if !present {
        libraries.push(library);
    }

    PreloadAction::Update {
        index: current.index,
        line: format_preload(&libraries, &current.trailing),
    }
}

fn split_libraries(csv: &str) -> Vec<&str> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn format_preload(libraries: &[&str], trailing: &str) -> String {
    format!("{} = '{}'{}", PRELOAD_KEY, libraries.join(","), trailing)
}
