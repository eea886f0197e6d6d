//! Batch validation harness: selects matrices from the public sparse matrix
//! collection index, caches their archives, runs the library's test
//! executables on each one, and optionally aggregates coverage.

pub mod cache;
pub mod command;
pub mod config;
pub mod coverage;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod index;
pub mod retention;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use cache::AssetCache;
use chrono::Utc;
use command::CommandRunner;
use coverage::CoverageOutcome;
use dispatch::{TestResult, Toolchain};
use fetch::Fetcher;
use index::IndexRecord;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

pub use config::{BuildLayout, CoverageConfig, Endpoints, HarnessConfig, RetentionFlags};
pub use dispatch::TestMode;
pub use error::{HarnessError, Result};
pub use select::SelectionCriteria;

#[derive(Debug, Clone, Serialize)]
pub struct MatrixOutcome {
    pub id: u32,
    pub group: String,
    pub name: String,
    pub matrix_path: PathBuf,
    pub downloaded: bool,
    pub deleted: bool,
    pub tests: Vec<TestResult>,
    pub cleanup_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub started_at: String,
    pub finished_at: String,
    pub mode: TestMode,
    pub matrices: Vec<MatrixOutcome>,
    pub coverage: Option<CoverageOutcome>,
}

impl RunOutcome {
    pub fn selected_count(&self) -> usize {
        self.matrices.len()
    }

    pub fn failed_test_count(&self) -> usize {
        self.matrices
            .iter()
            .flat_map(|m| m.tests.iter())
            .filter(|t| !t.passed())
            .count()
    }

    pub fn downloads(&self) -> usize {
        self.matrices.iter().filter(|m| m.downloaded).count()
    }
}

pub struct Harness<'a> {
    config: &'a HarnessConfig,
    fetcher: &'a dyn Fetcher,
    runner: &'a dyn CommandRunner,
    toolchain: Toolchain,
}

impl<'a> Harness<'a> {
    /// Checks the build tree and resolves every tool the mode and an explicit
    /// `--gcov` need. Nothing touches the network or the matrix directory
    /// before this succeeds.
    pub fn prepare(
        config: &'a HarnessConfig,
        fetcher: &'a dyn Fetcher,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self> {
        let layout = config.layout();
        layout.verify()?;
        let toolchain = Toolchain::resolve(config.mode, &layout)?;
        coverage::check_explicit_tool(&config.coverage, command::find_executable)?;
        Ok(Self::with_toolchain(config, fetcher, runner, toolchain))
    }

    pub fn with_toolchain(
        config: &'a HarnessConfig,
        fetcher: &'a dyn Fetcher,
        runner: &'a dyn CommandRunner,
        toolchain: Toolchain,
    ) -> Self {
        Self {
            config,
            fetcher,
            runner,
            toolchain,
        }
    }

    pub fn run(&self) -> Result<RunOutcome> {
        let started_at = Utc::now().to_rfc3339();
        let matrix_dir = &self.config.matrix_dir;
        fs::create_dir_all(matrix_dir).map_err(|e| HarnessError::io(matrix_dir, e))?;

        let index_path = index::fetch_index(
            self.fetcher,
            &self.config.endpoints.index_url,
            matrix_dir,
        )?;
        let cache = AssetCache::new(
            matrix_dir,
            &self.config.endpoints.archive_base_url,
            self.fetcher,
        );

        let mut matrices = Vec::new();
        for record in index::open_index(&index_path)? {
            let record = record?;
            if !self.config.selection.admits(&record) {
                continue;
            }
            matrices.push(self.process(&cache, record)?);
        }

        let coverage = self.config.coverage.enabled.then(|| {
            coverage::aggregate(&self.config.coverage, &self.config.layout(), self.runner)
        });

        fs::remove_file(&index_path).map_err(|e| HarnessError::io(&index_path, e))?;

        Ok(RunOutcome {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            mode: self.config.mode,
            matrices,
            coverage,
        })
    }

    fn process(&self, cache: &AssetCache<'_>, record: IndexRecord) -> Result<MatrixOutcome> {
        info!(id = record.id, "Selected {}/{}", record.group, record.name);
        let asset = cache.acquire(&record)?;
        let plan = self.toolchain.plan(self.config.mode, &asset.matrix_path)?;
        let tests = dispatch::dispatch(&plan, self.runner);

        let (deleted, cleanup_error) = match retention::apply(&asset, self.config.retention) {
            Ok(deleted) => (deleted, None),
            Err(e) => {
                warn!(id = record.id, error = %e, "cleanup failed; continuing");
                (false, Some(e.to_string()))
            }
        };

        Ok(MatrixOutcome {
            id: record.id,
            group: record.group,
            name: record.name,
            matrix_path: asset.matrix_path.clone(),
            downloaded: asset.downloaded(),
            deleted,
            tests,
            cleanup_error,
        })
    }
}

/// Runs the whole pipeline: gate, index, select, acquire, dispatch, retain,
/// then optional coverage. The local index copy is removed at the end.
pub fn run_harness(
    config: &HarnessConfig,
    fetcher: &dyn Fetcher,
    runner: &dyn CommandRunner,
) -> Result<RunOutcome> {
    Harness::prepare(config, fetcher, runner)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_tree, FakeFetcher, FakeRunner};

    #[test]
    fn unbuilt_tree_fails_before_any_fetch() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = HarnessConfig {
            build_dir: root.path().join("_build"),
            matrix_dir: root.path().join("Matrix"),
            ..HarnessConfig::default()
        };
        let fetcher = FakeFetcher::new();
        let runner = FakeRunner::new();

        let err = run_harness(&config, &fetcher, &runner).expect_err("must fail");

        assert!(matches!(err, HarnessError::Environment(_)));
        assert!(fetcher.requests().is_empty());
        assert!(!config.matrix_dir.exists());
    }

    #[test]
    fn missing_named_gcov_fails_before_any_fetch() {
        let root = tempfile::tempdir().expect("tempdir");
        let layout = build_tree(root.path());
        let config = HarnessConfig {
            build_dir: layout.build_dir,
            matrix_dir: root.path().join("Matrix"),
            coverage: CoverageConfig {
                enabled: true,
                html: true,
                gcov: Some(root.path().join("no-such-gcov")),
            },
            ..HarnessConfig::default()
        };
        let fetcher = FakeFetcher::new();

        let err = run_harness(&config, &fetcher, &FakeRunner::new()).expect_err("must fail");

        assert!(matches!(err, HarnessError::Config(_)));
        assert!(fetcher.requests().is_empty());
        assert!(!config.matrix_dir.exists());
    }

    #[test]
    fn outcome_counts_failed_tests_across_matrices() {
        let test = |code| TestResult {
            label: "Memory Test".to_string(),
            program: PathBuf::from("mongoose_test_memory"),
            exit_code: code,
            spawn_error: None,
        };
        let matrix = |tests| MatrixOutcome {
            id: 1,
            group: "HB".to_string(),
            name: "bcsstk01".to_string(),
            matrix_path: PathBuf::from("bcsstk01/bcsstk01.mtx"),
            downloaded: true,
            deleted: true,
            tests,
            cleanup_error: None,
        };
        let outcome = RunOutcome {
            started_at: String::new(),
            finished_at: String::new(),
            mode: TestMode::Memory,
            matrices: vec![matrix(vec![test(Some(0))]), matrix(vec![test(Some(2)), test(None)])],
            coverage: None,
        };
        assert_eq!(outcome.selected_count(), 2);
        assert_eq!(outcome.failed_test_count(), 2);
        assert_eq!(outcome.downloads(), 2);
    }
}
