use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use ufbench_runner::command::ProcessRunner;
use ufbench_runner::config::{DEFAULT_ARCHIVE_BASE_URL, DEFAULT_INDEX_URL, DEFAULT_MATRIX_DIR};
use ufbench_runner::fetch::HttpFetcher;
use ufbench_runner::select::{DEFAULT_ID_MAX, DEFAULT_ID_MIN};
use ufbench_runner::{
    run_harness, CoverageConfig, Endpoints, HarnessConfig, RetentionFlags, RunOutcome,
    SelectionCriteria, TestMode,
};

#[derive(Parser, Debug)]
#[command(
    name = "ufbench",
    version = "0.3.0",
    about = "Run the partitioner's test executables against collection matrices"
)]
struct Cli {
    /// Keep downloaded matrices after their tests ran
    #[arg(short = 'k', long)]
    keep: bool,
    /// Delete every matrix after use, including ones already cached
    #[arg(short = 'p', long)]
    purge: bool,
    #[arg(long, default_value_t = DEFAULT_ID_MIN)]
    min: u32,
    #[arg(long, default_value_t = DEFAULT_ID_MAX)]
    max: u32,
    /// Only these ids, intersected with the min/max range
    #[arg(short = 'i', long, num_args = 1..)]
    ids: Vec<u32>,
    #[arg(short = 'd', long = "matrix-directory", default_value = DEFAULT_MATRIX_DIR)]
    matrix_directory: PathBuf,
    #[arg(short = 't', long, value_enum, default_value_t = TestsArg::All)]
    tests: TestsArg,
    #[arg(short = 'c', long)]
    coverage: bool,
    /// Write an HTML coverage report instead of a text summary
    #[arg(long)]
    html_coverage: bool,
    #[arg(long)]
    gcov: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    build_dir: PathBuf,
    #[arg(long)]
    json: bool,
    #[arg(short = 'v', long)]
    verbose: bool,
    #[arg(long, hide = true, default_value = DEFAULT_INDEX_URL)]
    index_url: String,
    #[arg(long = "archive-url", hide = true, default_value = DEFAULT_ARCHIVE_BASE_URL)]
    archive_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TestsArg {
    #[value(name = "all")]
    All,
    #[value(name = "memory")]
    Memory,
    #[value(name = "io")]
    Io,
    #[value(name = "edgesep")]
    Edgesep,
    #[value(name = "performance")]
    Performance,
    #[value(name = "compare")]
    Compare,
}

impl From<TestsArg> for TestMode {
    fn from(arg: TestsArg) -> Self {
        match arg {
            TestsArg::All => TestMode::All,
            TestsArg::Memory => TestMode::Memory,
            TestsArg::Io => TestMode::Io,
            TestsArg::Edgesep => TestMode::EdgeSeparator,
            TestsArg::Performance => TestMode::Performance,
            TestsArg::Compare => TestMode::Compare,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));
    init_logging(cli.verbose);

    let config = build_config(&cli)?;
    let fetcher = HttpFetcher::new()?;
    let outcome =
        run_harness(&config, &fetcher, &ProcessRunner).context("benchmark run failed")?;

    if cli.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

/// `-min`/`-max` are accepted as single-dash long flags.
fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s) if is_legacy(s, "-min") || is_legacy(s, "-max") => {
                OsString::from(format!("-{}", s))
            }
            _ => arg,
        })
        .collect()
}

fn is_legacy(arg: &str, flag: &str) -> bool {
    arg == flag || arg.strip_prefix(flag).map(|rest| rest.starts_with('=')).unwrap_or(false)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<HarnessConfig> {
    Ok(HarnessConfig {
        matrix_dir: cli.matrix_directory.clone(),
        build_dir: cli.build_dir.clone(),
        selection: SelectionCriteria::new(cli.min, cli.max, cli.ids.iter().copied())?,
        mode: cli.tests.into(),
        retention: RetentionFlags {
            keep: cli.keep,
            purge: cli.purge,
        },
        coverage: CoverageConfig {
            enabled: cli.coverage || cli.html_coverage,
            html: cli.html_coverage,
            gcov: cli.gcov.clone(),
        },
        endpoints: Endpoints {
            index_url: cli.index_url.clone(),
            archive_base_url: cli.archive_url.clone(),
        },
    })
}

fn print_summary(outcome: &RunOutcome) {
    println!("mode: {}", outcome.mode.as_str());
    println!("started_at: {}", outcome.started_at);
    println!("finished_at: {}", outcome.finished_at);
    println!("matrices: {}", outcome.selected_count());
    println!("downloads: {}", outcome.downloads());
    println!("failed_tests: {}", outcome.failed_test_count());
    for m in &outcome.matrices {
        let failed: Vec<&str> = m
            .tests
            .iter()
            .filter(|t| !t.passed())
            .map(|t| t.label.as_str())
            .collect();
        let status = if failed.is_empty() {
            "ok".to_string()
        } else {
            format!("FAILED ({})", failed.join(", "))
        };
        println!("  [{}] {}/{}: {}", m.id, m.group, m.name, status);
        if let Some(err) = &m.cleanup_error {
            println!("    cleanup: {}", err);
        }
    }
    if let Some(coverage) = &outcome.coverage {
        if let Some(path) = &coverage.report_path {
            println!("coverage_report: {}", path.display());
        }
        if !coverage.skipped.is_empty() {
            println!("coverage_skipped: {}", coverage.skipped.join(", "));
        }
    }
}
