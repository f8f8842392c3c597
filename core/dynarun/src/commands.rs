//! Command handlers. Each returns the process exit code.

use dynarun_core::{
    AnalysisCatalog, CoverageAggregator, FragmentPolicy, Orchestrator, RunError, RunRequest,
    RunnerConfig,
};
use std::path::Path;

use crate::RunArgs;

const EXIT_FAILURE: i32 = 1;
const EXIT_ENTRY_ERROR: i32 = 2;

pub fn run(args: RunArgs) -> i32 {
    // clap requires --entry whenever no subcommand is given.
    let entry = args.entry.unwrap_or_default();

    let mut config = RunnerConfig::load();
    if args.skip_malformed {
        config.fragment_policy = FragmentPolicy::Skip;
    }

    let mut request = RunRequest::new(entry, args.analysis);
    request.name = args.name;
    if args.coverage {
        request = request.with_coverage(args.coverage_dir);
    }

    let result = Orchestrator::from_config(&config, AnalysisCatalog::new())
        .and_then(|mut orchestrator| orchestrator.run(&request));

    match result {
        Ok(outcome) => {
            if let Some(merge) = &outcome.merge {
                tracing::info!(
                    report = %merge.report_path.display(),
                    fragments = merge.fragments_merged,
                    "Coverage merged"
                );
            }
            println!("{}", outcome.session_id);
            0
        }
        Err(err) => fail(&err),
    }
}

pub fn merge(dir: &Path, skip_malformed: bool) -> i32 {
    let policy = if skip_malformed {
        FragmentPolicy::Skip
    } else {
        RunnerConfig::load().fragment_policy
    };

    match CoverageAggregator::new(policy).merge_into_report(dir) {
        Ok(summary) => {
            println!(
                "{} ({} fragments, {} skipped, {} files, {} items)",
                summary.report_path.display(),
                summary.fragments_merged,
                summary.skipped.len(),
                summary.report.file_count(),
                summary.report.item_count()
            );
            0
        }
        Err(err) => fail(&err),
    }
}

fn fail(err: &RunError) -> i32 {
    tracing::error!(error = %err, "dynarun failed");
    eprintln!("dynarun: {}", err);
    exit_code(err)
}

/// A failing target passes its own status through.
pub fn exit_code(err: &RunError) -> i32 {
    match err {
        RunError::TargetFailed { code, .. } => code.unwrap_or(EXIT_FAILURE),
        err if err.is_entry_error() => EXIT_ENTRY_ERROR,
        _ => EXIT_FAILURE,
    }
}
