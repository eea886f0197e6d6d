//! Maps a test mode to the ordered external invocations for one matrix and
//! runs them. There is no fail-fast: every entry of a plan runs regardless of
//! how earlier entries exited.

use crate::command::{find_executable, path_arg, CommandRunner};
use crate::config::BuildLayout;
use crate::error::{HarnessError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extra argument the I/O test executable expects after the matrix path.
pub const IO_TEST_EXTRA_ARG: &str = "1";
/// Partition count handed to gpmetis in compare mode.
const COMPARE_PARTS: &str = "2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    All,
    Memory,
    Io,
    #[serde(rename = "edgesep")]
    EdgeSeparator,
    Performance,
    /// Library driver side by side with gpmetis on the converted graph.
    Compare,
}

impl TestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestMode::All => "all",
            TestMode::Memory => "memory",
            TestMode::Io => "io",
            TestMode::EdgeSeparator => "edgesep",
            TestMode::Performance => "performance",
            TestMode::Compare => "compare",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

pub type TestPlan = Vec<Invocation>;

/// Third-party tools needed by compare mode, located before any work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareTools {
    pub gcv: PathBuf,
    pub gpmetis: PathBuf,
}

/// Executables a run dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub tests_dir: PathBuf,
    pub driver: PathBuf,
    pub compare: Option<CompareTools>,
}

impl Toolchain {
    /// Resolves what `mode` needs. A tool that cannot be found is a
    /// configuration error here, never a missing path handed to a spawn.
    pub fn resolve(mode: TestMode, layout: &BuildLayout) -> Result<Self> {
        Self::resolve_with(mode, layout, find_executable)
    }

    pub fn resolve_with<F>(mode: TestMode, layout: &BuildLayout, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        let compare = if mode == TestMode::Compare {
            let require = |name: &str| {
                lookup(name).ok_or_else(|| {
                    HarnessError::Config(format!(
                        "'{}' is required for compare mode but was not found on PATH",
                        name
                    ))
                })
            };
            Some(CompareTools {
                gcv: require("gcv")?,
                gpmetis: require("gpmetis")?,
            })
        } else {
            None
        };
        Ok(Self {
            tests_dir: layout.tests_dir(),
            driver: layout.driver(),
            compare,
        })
    }

    fn test_exe(&self, name: &str) -> PathBuf {
        self.tests_dir.join(name)
    }

    fn single(&self, label: &str, exe: &str, matrix: &Path, extra: &[&str]) -> Invocation {
        let mut args = vec![path_arg(matrix)];
        args.extend(extra.iter().map(|s| s.to_string()));
        Invocation {
            label: label.to_string(),
            program: self.test_exe(exe),
            args,
        }
    }

    pub fn plan(&self, mode: TestMode, matrix_path: &Path) -> Result<TestPlan> {
        let io = || {
            self.single(
                "I/O Test",
                "mongoose_test_io",
                matrix_path,
                &[IO_TEST_EXTRA_ARG],
            )
        };
        let edgesep = || {
            self.single(
                "Edge Separator Test",
                "mongoose_test_edgesep",
                matrix_path,
                &[],
            )
        };
        let memory = || self.single("Memory Test", "mongoose_test_memory", matrix_path, &[]);
        let performance = || {
            self.single(
                "Performance Test",
                "mongoose_test_performance",
                matrix_path,
                &[],
            )
        };

        Ok(match mode {
            TestMode::All => vec![io(), edgesep(), memory(), performance()],
            TestMode::Memory => vec![memory()],
            TestMode::Io => vec![io()],
            TestMode::EdgeSeparator => vec![edgesep()],
            TestMode::Performance => vec![performance()],
            TestMode::Compare => self.compare_plan(matrix_path)?,
        })
    }

    fn compare_plan(&self, matrix_path: &Path) -> Result<TestPlan> {
        let tools = self.compare.as_ref().ok_or_else(|| {
            HarnessError::Config("compare tools were not resolved for this run".to_string())
        })?;
        let graph_path = matrix_path.with_extension("grf");
        Ok(vec![
            Invocation {
                label: "gcv conversion".to_string(),
                program: tools.gcv.clone(),
                args: vec![
                    "-im".to_string(),
                    "-oc".to_string(),
                    path_arg(matrix_path),
                    path_arg(&graph_path),
                ],
            },
            Invocation {
                label: "Mongoose".to_string(),
                program: self.driver.clone(),
                args: vec![path_arg(matrix_path)],
            },
            Invocation {
                label: "gpmetis".to_string(),
                program: tools.gpmetis.clone(),
                args: vec![path_arg(&graph_path), COMPARE_PARTS.to_string()],
            },
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub label: String,
    pub program: PathBuf,
    /// `None` when the process could not be spawned or died from a signal.
    pub exit_code: Option<i32>,
    pub spawn_error: Option<String>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs each invocation in order, waiting for each to exit before the next.
pub fn dispatch(plan: &[Invocation], runner: &dyn CommandRunner) -> Vec<TestResult> {
    plan.iter()
        .map(|inv| {
            info!("Calling {}...", inv.label);
            let (exit_code, spawn_error) = match runner.run(&inv.program, &inv.args) {
                Ok(code) => (code, None),
                Err(e) => (None, Some(e.to_string())),
            };
            match (&exit_code, &spawn_error) {
                (Some(0), _) => {}
                (_, Some(err)) => warn!(
                    program = %inv.program.display(),
                    error = %err,
                    "{} could not be started", inv.label
                ),
                (code, None) => warn!(
                    program = %inv.program.display(),
                    exit_code = ?code,
                    "{} failed", inv.label
                ),
            }
            TestResult {
                label: inv.label.clone(),
                program: inv.program.clone(),
                exit_code,
                spawn_error,
            }
        })
        .collect()
}
