//! dynarun: run a program under dynamic analyses.
//!
//! Thin invocation surface over `dynarun-core`. Prints the session id on
//! stdout once the session completes; everything else goes to stderr so the
//! target program owns stdout.
//!
//! ## Usage
//!
//! ```bash
//! dynarun --entry app.py --analysis TraceAll CallGraph --coverage
//! dynarun --entry pkg.main --analysis BranchCoverage --coverage --coverage-dir ./cov
//! dynarun merge /tmp/dynapyt_coverage-<session>
//! ```

mod commands;
mod logging;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dynarun")]
#[command(about = "Run a program under dynamic analyses and merge its coverage")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Entry to execute: a script path (e.g., app.py) or a dotted module name
    #[arg(long, required = true, value_name = "ENTRY")]
    pub entry: Option<String>,

    /// Analysis identifiers, in hook order
    #[arg(long, required = true, num_args = 1.., value_name = "ID")]
    pub analysis: Vec<String>,

    /// Name to associate with this run
    #[arg(long)]
    pub name: Option<String>,

    /// Collect coverage and merge it when the run ends
    #[arg(long)]
    pub coverage: bool,

    /// Parent directory for the session coverage directory (default: temp dir)
    #[arg(long, requires = "coverage", value_name = "DIR")]
    pub coverage_dir: Option<PathBuf>,

    /// Skip unparseable coverage fragments instead of failing the merge
    #[arg(long)]
    pub skip_malformed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the fragments of an existing session coverage directory
    Merge {
        /// Session coverage directory (dynapyt_coverage-<session>)
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Skip unparseable coverage fragments instead of failing the merge
        #[arg(long)]
        skip_malformed: bool,
    },
}

fn main() {
    let code = run_cli();
    std::process::exit(code);
}

/// Kept separate from `main` so the logging guard flushes before exit.
fn run_cli() -> i32 {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Merge {
            dir,
            skip_malformed,
        }) => commands::merge(&dir, skip_malformed),
        None => commands::run(cli.run),
    }
}
