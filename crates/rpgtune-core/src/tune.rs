//! Review loop: shows each group's recommendations, asks for approval and
//! applies accepted changes to the in-memory file.
//!
//! Nothing is written to disk here. A [`TuneError::UserAbort`] leaves the
//! caller with a partially edited [`ConfFile`] that must be discarded.

use std::io::{self, BufRead, Write};

use tracing::{info, warn};

use crate::conf::patch::apply_group;
use crate::conf::{ConfFile, PreloadAction, TIMESCALEDB_LIBRARY, reconcile_preload, scan};
use crate::decide::{GroupDecisions, decide_group};
use crate::recommend::RecommendError;
use crate::settings::{SettingsRegistry, all_groups};
use crate::snapshot::{ResourceSnapshot, SUPPORTED_PG_VERSIONS, is_supported_version};
use crate::units::bytes_to_decimal;

const APPROVAL_QUESTION: &str = "Is this okay?";
const PRELOAD_LABEL: &str = "shared_preload_libraries";

/// Error type for a tuning run.
#[derive(Debug)]
pub enum TuneError {
    /// Reading input or writing prompts failed.
    Io(io::Error),
    /// The operator quit, or input ended before an answer.
    UserAbort,
    /// A recommender was asked for a key outside its category.
    Integrity(RecommendError),
    /// PostgreSQL version the tuner has no rules for.
    UnsupportedVersion(String),
}

impl std::fmt::Display for TuneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TuneError::Io(e) => write!(f, "I/O error: {}", e),
            TuneError::UserAbort => write!(f, "aborted by user; no changes written"),
            TuneError::Integrity(e) => write!(f, "internal error: {}", e),
            TuneError::UnsupportedVersion(v) => write!(
                f,
                "unsupported PostgreSQL version '{}' (supported: {})",
                v,
                SUPPORTED_PG_VERSIONS.join(", ")
            ),
        }
    }
}

impl std::error::Error for TuneError {}

impl From<io::Error> for TuneError {
    fn from(e: io::Error) -> Self {
        TuneError::Io(e)
    }
}

impl From<RecommendError> for TuneError {
    fn from(e: RecommendError) -> Self {
        TuneError::Integrity(e)
    }
}

/// Operator's answer to a prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Approval {
    Accept,
    Skip,
    Quit,
}

impl Approval {
    /// Parses `y`/`yes`, `s`/`skip`, `q`/`quit` in any case.
    pub fn parse(input: &str) -> Option<Approval> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Approval::Accept),
            "s" | "skip" => Some(Approval::Skip),
            "q" | "quit" => Some(Approval::Quit),
            _ => None,
        }
    }
}

/// Where recommendations are shown and answers come from.
pub trait Prompter {
    fn show(&mut self, text: &str) -> io::Result<()>;
    /// Blocks until the operator answers.
    fn approve(&mut self, question: &str) -> Result<Approval, TuneError>;
}

/// Line-based prompter over any reader and writer, normally stdin/stdout.
pub struct StdioPrompter<R: BufRead, W: Write> {
    input: R,
    output: W,
    assume_yes: bool,
}

impl<R: BufRead, W: Write> StdioPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            assume_yes: false,
        }
    }

    /// Accept every prompt without reading input.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompter for StdioPrompter<R, W> {
    fn show(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    fn approve(&mut self, question: &str) -> Result<Approval, TuneError> {
        if self.assume_yes {
            writeln!(self.output, "{} [(y)es/(s)kip/(q)uit]: y", question)?;
            return Ok(Approval::Accept);
        }

        loop {
            write!(self.output, "{} [(y)es/(s)kip/(q)uit]: ", question)?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                return Err(TuneError::UserAbort);
            }
            match Approval::parse(&answer) {
                Some(approval) => return Ok(approval),
                None => writeln!(self.output, "Invalid response: {}", answer.trim())?,
            }
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TuneReport {
    /// Settings rewritten or appended.
    pub changed: usize,
    pub preload_changed: bool,
    /// Labels of groups the operator skipped.
    pub skipped: Vec<String>,
}

impl TuneReport {
    pub fn has_changes(&self) -> bool {
        self.changed > 0 || self.preload_changed
    }
}

/// Drives one tuning run for a fixed snapshot.
pub struct Tuner<'a> {
    snapshot: &'a ResourceSnapshot,
    registry: SettingsRegistry,
}

impl<'a> Tuner<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Result<Self, TuneError> {
        if !is_supported_version(&snapshot.pg_version) {
            return Err(TuneError::UnsupportedVersion(snapshot.pg_version.clone()));
        }
        Ok(Self {
            snapshot,
            registry: SettingsRegistry::new(),
        })
    }

    pub fn scan(&self, content: &str) -> ConfFile {
        scan(content, &self.registry)
    }

    /// Decisions for every available group, without prompting.
    pub fn analyze(&self, conf: &ConfFile) -> Result<Vec<GroupDecisions>, TuneError> {
        let mut out = Vec::new();
        for group in all_groups(self.snapshot) {
            if let Some(decisions) = decide_group(&group, conf, self.snapshot)? {
                out.push(decisions);
            }
        }
        Ok(out)
    }

    /// Reviews the preload line and then every group in order, applying what
    /// the operator accepts.
    pub fn run<P: Prompter>(
        &self,
        conf: &mut ConfFile,
        prompter: &mut P,
    ) -> Result<TuneReport, TuneError> {
        let mut report = TuneReport::default();
        prompter.show(&headline(self.snapshot))?;

        let action = reconcile_preload(conf.preload(), TIMESCALEDB_LIBRARY);
        if action == PreloadAction::Unchanged {
            prompter.show("\nshared_preload_libraries already loads timescaledb")?;
        } else {
            prompter.show(&render_preload(conf, &action))?;
            match prompter.approve(APPROVAL_QUESTION)? {
                Approval::Accept => {
                    conf.apply_preload(&action);
                    report.preload_changed = true;
                }
                Approval::Skip => {
                    warn!(
                        "{} must load {} before the extension can be used",
                        PRELOAD_LABEL, TIMESCALEDB_LIBRARY
                    );
                    report.skipped.push(PRELOAD_LABEL.to_string());
                }
                Approval::Quit => return Err(TuneError::UserAbort),
            }
        }

        for group in all_groups(self.snapshot) {
            let Some(decisions) = decide_group(&group, conf, self.snapshot)? else {
                continue;
            };
            if decisions.is_tuned() {
                prompter.show(&format!(
                    "\n{} settings are already tuned",
                    capitalize(decisions.label)
                ))?;
                continue;
            }

            prompter.show(&render_group(conf, &decisions))?;
            match prompter.approve(APPROVAL_QUESTION)? {
                Approval::Accept => report.changed += apply_group(conf, &decisions),
                Approval::Skip => {
                    info!("skipped {} settings; edit them manually if needed", decisions.label);
                    report.skipped.push(decisions.label.to_string());
                }
                Approval::Quit => return Err(TuneError::UserAbort),
            }
        }

        info!(
            "{} settings changed, preload line {}",
            report.changed,
            if report.preload_changed { "updated" } else { "unchanged" }
        );
        Ok(report)
    }
}

/// One-line summary of the inputs driving the recommendations.
pub fn headline(snapshot: &ResourceSnapshot) -> String {
    format!(
        "Recommendations based on {} of available memory and {} CPUs for PostgreSQL {} ({} profile)",
        bytes_to_decimal(snapshot.total_memory),
        snapshot.cpus,
        snapshot.pg_version,
        snapshot.profile
    )
}

/// Current and recommended lines for a group's visible settings.
pub fn render_group(conf: &ConfFile, group: &GroupDecisions) -> String {
    let mut out = format!("\n{} settings recommendations\ncurrent:\n", capitalize(group.label));
    for decision in group.visible() {
        match conf.setting(decision.key) {
            Some(parsed) => out.push_str(&conf.lines()[parsed.index]),
            None => out.push_str(&format!("{} = <missing>", decision.key)),
        }
        out.push('\n');
    }
    out.push_str("recommended:");
    for decision in group.visible() {
        out.push('\n');
        out.push_str(&format!("{} = {}", decision.key, decision.recommended));
    }
    out
}

/// Current and proposed preload line.
pub fn render_preload(conf: &ConfFile, action: &PreloadAction) -> String {
    let current = conf
        .preload()
        .map(|p| conf.lines()[p.index].clone())
        .unwrap_or_else(|| format!("{} = <missing>", PRELOAD_LABEL));
    let proposed = match action {
        PreloadAction::Unchanged => current.clone(),
        PreloadAction::Update { line, .. } | PreloadAction::Append { line } => line.clone(),
    };
    format!(
        "\n{} needs to load {}\ncurrent:\n{}\nrecommended:\n{}",
        PRELOAD_LABEL, TIMESCALEDB_LIBRARY, current, proposed
    )
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
