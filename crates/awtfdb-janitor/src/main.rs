//! `awtfdb-janitor` — consistency checker for the awtfdb index.
//!
//! # Usage
//!
//! ```
//! awtfdb-janitor                  # audit only, report problems
//! awtfdb-janitor --full --only ~/media --hash-files-smaller-than 10M
//! awtfdb-janitor --repair         # fix what can be fixed
//! awtfdb-janitor --from-report /tmp/awtfdb-janitor_xxxx --repair
//! ```
//!
//! Exit codes: 0 clean, 1 help/version shown (or a fatal error), 2 problems
//! found without `--repair`.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use awtfdb_core::{
  bytesize::parse_byte_amount,
  report::{JanitorReport, Problem},
};
use awtfdb_store_sqlite::{janitor, Janitor, JanitorOptions, Store};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
  name = "awtfdb-janitor",
  version,
  about = "Consistency checker for the awtfdb file-tagging index"
)]
struct Args {
  /// Print debug-level logging.
  #[arg(short = 'v', long)]
  verbose: bool,

  /// Re-hash file contents instead of only checking that paths open.
  #[arg(long)]
  full: bool,

  /// With --full, only re-hash files under this path prefix (repeatable).
  #[arg(long = "only", value_name = "PATH")]
  only: Vec<PathBuf>,

  /// Fix repairable problems; abort (rolling everything back) on
  /// unrepairable ones.
  #[arg(long)]
  repair: bool,

  /// With --full, skip files at or above this size (e.g. 500K, 10M, 1G).
  #[arg(long = "hash-files-smaller-than", value_name = "SIZE")]
  hash_files_smaller_than: Option<String>,

  /// Revisit only the rows listed in a previous run's report.
  #[arg(long = "from-report", value_name = "PATH")]
  from_report: Option<PathBuf>,

  /// Skip the database-level PRAGMA checks.
  #[arg(long = "skip-db")]
  skip_db: bool,

  /// Skip re-hashing tag core randomness.
  #[arg(long = "skip-tag-cores")]
  skip_tag_cores: bool,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> ExitCode {
  let args = match Args::try_parse() {
    Ok(args) => args,
    Err(e) => {
      let _ = e.print();
      return match e.kind() {
        clap::error::ErrorKind::DisplayHelp
        | clap::error::ErrorKind::DisplayVersion => ExitCode::from(1),
        _ => ExitCode::from(2),
      };
    }
  };

  let default_level = if args.verbose {
    LevelFilter::DEBUG
  } else {
    LevelFilter::INFO
  };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy(),
    )
    .init();

  match run(args) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::from(2),
    Err(e) => {
      tracing::error!("{e:#}");
      ExitCode::FAILURE
    }
  }
}

fn run(args: Args) -> anyhow::Result<bool> {
  let db_path = Store::default_db_path()
    .context("HOME is not set; cannot locate awtf.db")?;
  let store = Store::open(&db_path)
    .with_context(|| format!("opening {}", db_path.display()))?;

  let hash_files_smaller_than = args
    .hash_files_smaller_than
    .as_deref()
    .map(parse_byte_amount)
    .transpose()?;

  let options = JanitorOptions {
    full: args.full,
    only: args.only,
    repair: args.repair,
    hash_files_smaller_than,
    skip_db: args.skip_db,
    skip_tag_cores: args.skip_tag_cores,
  };

  let mut worker = Janitor::new(&store, options);
  if let Some(path) = &args.from_report {
    worker
      .load_report(path)
      .with_context(|| format!("loading report {}", path.display()))?;
  }

  let report = worker.run().context("janitor run failed")?;
  print_summary(report);

  let problems = report.counters.total_problems();
  if problems > 0 {
    let report_path = janitor::write_report(report)?;
    tracing::info!("report written to {}", report_path.display());
  }

  drop(worker);
  store.close()?;
  Ok(problems == 0 || args.repair)
}

fn print_summary(report: &JanitorReport) {
  let total = report.counters.total_problems();
  if total == 0 {
    tracing::info!("no problems found");
    return;
  }
  for problem in Problem::ALL {
    let counter = report.counters.get(problem);
    if counter.total > 0 {
      tracing::warn!(
        "{problem:?}: {} total, {} unrepairable",
        counter.total,
        counter.unrepairable
      );
    }
  }
}
