//! rpgtune - PostgreSQL/TimescaleDB configuration tuner.
//!
//! Reads postgresql.conf, recommends settings for the host's memory, CPUs and
//! disks, asks for approval group by group, and writes the result back.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use rpgtune_core::conf::ConfFile;
use rpgtune_core::snapshot::{DEFAULT_MAX_BACKGROUND_WORKERS, Profile, ResourceSnapshot};
use rpgtune_core::system::{
    FileSystem, RealFs, SystemError, detect_cpus, detect_pg_version, detect_total_memory,
    find_conf_file,
};
use rpgtune_core::tune::{Prompter, StdioPrompter, TuneError, TuneReport, Tuner};
use rpgtune_core::units::canonical_to_bytes;

/// PostgreSQL/TimescaleDB configuration tuner.
#[derive(Parser)]
#[command(name = "rpgtune", about = "Tune postgresql.conf for TimescaleDB", version)]
struct Args {
    /// Path to postgresql.conf. Searched in well-known locations if not given.
    #[arg(long, value_name = "PATH")]
    conf_path: Option<PathBuf>,

    /// Where to write the result (default: overwrite --conf-path).
    #[arg(long, value_name = "PATH")]
    out_path: Option<PathBuf>,

    /// Print the resulting file to stdout instead of writing it.
    #[arg(long)]
    dry_run: bool,

    /// Accept every recommendation without prompting.
    #[arg(short, long)]
    yes: bool,

    /// Memory available to PostgreSQL (e.g. "8GB"). Detected if not given.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    memory: Option<u64>,

    /// Number of CPUs available to PostgreSQL. Detected if not given.
    #[arg(long)]
    cpus: Option<usize>,

    /// Desired max_connections. Picked from memory if not given.
    #[arg(long)]
    max_conns: Option<u64>,

    /// Background workers reserved for TimescaleDB.
    #[arg(long, default_value_t = DEFAULT_MAX_BACKGROUND_WORKERS)]
    max_bg_workers: usize,

    /// Size of a dedicated WAL disk (e.g. "100GB").
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    wal_disk_size: Option<u64>,

    /// PostgreSQL major version (e.g. "16"). Detected via pg_config if not given.
    #[arg(long)]
    pg_version: Option<String>,

    /// pg_config binary used for version detection.
    #[arg(long, value_name = "PATH", default_value = "pg_config")]
    pg_config: PathBuf,

    /// Recommendation profile: default or promscale.
    #[arg(long, default_value = "default")]
    profile: Profile,

    /// Print the decisions as JSON and exit without prompting or writing.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a canonical size such as "8GB" or "512MB" into bytes.
fn parse_size(s: &str) -> Result<u64, String> {
    canonical_to_bytes(s).map_err(|e| e.to_string())
}

/// Initializes the tracing subscriber on stderr.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_snapshot(args: &Args, fs: &dyn FileSystem) -> Result<ResourceSnapshot, SystemError> {
    let memory = match args.memory {
        Some(bytes) => bytes,
        None => detect_total_memory(fs)?,
    };
    let cpus = args.cpus.unwrap_or_else(detect_cpus);
    let pg_version = match &args.pg_version {
        Some(v) => v.clone(),
        None => detect_pg_version(&args.pg_config)?,
    };

    Ok(ResourceSnapshot::new(memory, cpus, pg_version)
        .with_max_connections(args.max_conns.unwrap_or(0))
        .with_wal_disk_size(args.wal_disk_size.unwrap_or(0))
        .with_max_background_workers(args.max_bg_workers)
        .with_profile(args.profile))
}

fn resolve_conf_path(
    explicit: Option<&Path>,
    fs: &dyn FileSystem,
    pg_version: &str,
) -> Result<PathBuf, SystemError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => find_conf_file(fs, pg_version),
    }
}

/// Runs the approval loop over `content` and returns the edited file.
fn tune_contents<P: Prompter>(
    tuner: &Tuner<'_>,
    content: &str,
    prompter: &mut P,
) -> Result<(ConfFile, TuneReport), TuneError> {
    let mut conf = tuner.scan(content);
    let report = tuner.run(&mut conf, prompter)?;
    Ok((conf, report))
}

/// An unchanged file is not rewritten in place, but a separate destination
/// always receives the full output.
fn should_write(report: &TuneReport, conf_path: &Path, out_path: &Path) -> bool {
    report.has_changes() || out_path != conf_path
}

fn write_output(conf: &ConfFile, path: &Path) -> io::Result<()> {
    conf.write_to(File::create(path)?)
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let fs = RealFs;
    let snapshot = build_snapshot(&args, &fs).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    debug!("snapshot: {:?}", snapshot);

    let tuner = Tuner::new(&snapshot).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let conf_path = resolve_conf_path(args.conf_path.as_deref(), &fs, &snapshot.pg_version)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });
    let content = fs.read_to_string(&conf_path).unwrap_or_else(|e| {
        eprintln!("Error: cannot read {}: {}", conf_path.display(), e);
        std::process::exit(1);
    });
    info!("using config file {}", conf_path.display());

    if args.json {
        let conf = tuner.scan(&content);
        let groups = tuner.analyze(&conf).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });
        let report = serde_json::json!({
            "conf_path": conf_path.display().to_string(),
            "snapshot": snapshot,
            "groups": groups,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Prompts go to stderr when stdout carries the file.
    let prompt_out: Box<dyn Write> = if args.dry_run {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut prompter = StdioPrompter::new(io::stdin().lock(), prompt_out).assume_yes(args.yes);

    let (conf, report) = match tune_contents(&tuner, &content, &mut prompter) {
        Ok(result) => result,
        Err(TuneError::UserAbort) => {
            eprintln!("Aborted; {} was not modified", conf_path.display());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if args.dry_run {
        if let Err(e) = conf.write_to(io::stdout().lock()) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let out_path = args.out_path.as_deref().unwrap_or(&conf_path);
    if !should_write(&report, &conf_path, out_path) {
        info!("nothing to change");
        return;
    }
    if let Err(e) = write_output(&conf, out_path) {
        eprintln!("Error: cannot write {}: {}", out_path.display(), e);
        std::process::exit(1);
    }
    info!(
        "wrote {} ({} settings changed); restart PostgreSQL to apply",
        out_path.display(),
        report.changed
    );
}
