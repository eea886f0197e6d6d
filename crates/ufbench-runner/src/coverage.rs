//! Post-run coverage collection over the library's object directory.
//!
//! A missing tool skips its stage with a warning; coverage never fails a run.

use crate::command::{find_executable, path_arg, CommandRunner};
use crate::config::{BuildLayout, CoverageConfig};
use crate::error::{HarnessError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const REPORT_TOOL: &str = "gcovr";
const LLVM_MARKER: &str = "LLVM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageVariant {
    Gcc,
    Llvm,
}

impl CoverageVariant {
    pub fn detect(version_output: &str) -> Self {
        if version_output.contains(LLVM_MARKER) {
            CoverageVariant::Llvm
        } else {
            CoverageVariant::Gcc
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageTool {
    pub path: PathBuf,
    pub variant: CoverageVariant,
}

impl CoverageTool {
    /// `llvm-cov` only speaks gcov syntax through its `gcov` subcommand.
    fn needs_subcommand(&self) -> bool {
        self.variant == CoverageVariant::Llvm
            && self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with("llvm-cov"))
                .unwrap_or(false)
    }

    pub fn collect_args(&self, object_dir: &Path, data_files: &[PathBuf]) -> Vec<String> {
        let mut args = Vec::new();
        if self.needs_subcommand() {
            args.push("gcov".to_string());
        }
        match self.variant {
            CoverageVariant::Gcc => {
                args.push("--object-directory".to_string());
                args.push(path_arg(object_dir));
            }
            CoverageVariant::Llvm => {
                args.push(format!("-object-directory={}", object_dir.display()));
            }
        }
        args.extend(data_files.iter().map(|p| path_arg(p)));
        args
    }

    /// Value for gcovr's `--gcov-executable`.
    pub fn gcov_executable_arg(&self) -> String {
        if self.needs_subcommand() {
            format!("{} gcov", self.path.display())
        } else {
            path_arg(&self.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageOutcome {
    pub variant: Option<CoverageVariant>,
    pub collect_exit: Option<i32>,
    pub report_exit: Option<i32>,
    pub report_path: Option<PathBuf>,
    pub skipped: Vec<String>,
}

pub fn report_args(
    tool: &CoverageTool,
    layout: &BuildLayout,
    html_out: Option<&Path>,
) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(out) = html_out {
        args.push("--html".to_string());
        args.push("--html-details".to_string());
        args.push("-o".to_string());
        args.push(path_arg(out));
    }
    args.push("--gcov-executable".to_string());
    args.push(tool.gcov_executable_arg());
    args.push("--object-directory".to_string());
    args.push(path_arg(&layout.object_dir()));
    args.push("-r".to_string());
    args.push(path_arg(&layout.source_root()));
    args
}

/// Coverage data files (`.gcda`) written by the test executables.
pub fn data_files(object_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(object_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|x| x == "gcda").unwrap_or(false))
        .collect();
    files.sort();
    files
}

/// An explicitly named coverage tool must exist; only the `gcov` default may
/// be absent.
pub fn check_explicit_tool<F>(config: &CoverageConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<PathBuf>,
{
    match &config.gcov {
        Some(path) if config.enabled && lookup(&path_arg(path)).is_none() => {
            Err(HarnessError::Config(format!(
                "coverage tool {} was not found or is not executable",
                path.display()
            )))
        }
        _ => Ok(()),
    }
}

pub fn aggregate(
    config: &CoverageConfig,
    layout: &BuildLayout,
    runner: &dyn CommandRunner,
) -> CoverageOutcome {
    aggregate_with(config, layout, runner, find_executable)
}

pub fn aggregate_with<F>(
    config: &CoverageConfig,
    layout: &BuildLayout,
    runner: &dyn CommandRunner,
    lookup: F,
) -> CoverageOutcome
where
    F: Fn(&str) -> Option<PathBuf>,
{
    let mut outcome = CoverageOutcome {
        variant: None,
        collect_exit: None,
        report_exit: None,
        report_path: None,
        skipped: Vec::new(),
    };

    let gcov = match &config.gcov {
        Some(path) => lookup(&path_arg(path)),
        None => lookup("gcov"),
    };
    let Some(gcov) = gcov else {
        warn!("coverage tool not found; skipping coverage");
        outcome.skipped.push("collect".to_string());
        outcome.skipped.push("report".to_string());
        return outcome;
    };

    let version = runner
        .capture(&gcov, &["--version".to_string()])
        .unwrap_or_default();
    let tool = CoverageTool {
        path: gcov,
        variant: CoverageVariant::detect(&version),
    };
    outcome.variant = Some(tool.variant);

    let object_dir = layout.object_dir();
    let files = data_files(&object_dir);
    if files.is_empty() {
        warn!(dir = %object_dir.display(), "no coverage data found");
        outcome.skipped.push("collect".to_string());
    } else {
        info!("Collecting coverage with {:?} tool...", tool.variant);
        outcome.collect_exit = runner
            .run(&tool.path, &tool.collect_args(&object_dir, &files))
            .unwrap_or_else(|e| {
                warn!(error = %e, "coverage tool failed to start");
                None
            });
    }

    let Some(report_tool) = lookup(REPORT_TOOL) else {
        warn!("{} not found; skipping coverage report", REPORT_TOOL);
        outcome.skipped.push("report".to_string());
        return outcome;
    };
    let html_out = config
        .html
        .then(|| layout.build_dir.join("coverage").join("index.html"));
    if let Some(out) = &html_out {
        if let Some(parent) = out.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "cannot create coverage report directory");
            }
        }
    }
    info!(
        "Generating {} coverage report...",
        if html_out.is_some() { "HTML" } else { "text" }
    );
    outcome.report_exit = runner
        .run(&report_tool, &report_args(&tool, layout, html_out.as_deref()))
        .unwrap_or_else(|e| {
            warn!(error = %e, "{} failed to start", REPORT_TOOL);
            None
        });
    outcome.report_path = html_out;
    outcome
}
