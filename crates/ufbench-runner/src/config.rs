use crate::dispatch::TestMode;
use crate::error::{HarnessError, Result};
use crate::select::SelectionCriteria;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX_URL: &str =
    "https://www.cise.ufl.edu/research/sparse/matrices/UFstats.csv";
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://www.cise.ufl.edu/research/sparse/MM/";
pub const DEFAULT_MATRIX_DIR: &str = "../Matrix";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoints {
    pub index_url: String,
    pub archive_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionFlags {
    pub keep: bool,
    pub purge: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageConfig {
    pub enabled: bool,
    pub html: bool,
    /// Explicit coverage tool; `gcov` on PATH otherwise.
    pub gcov: Option<PathBuf>,
}

/// Everything a run needs, fixed before the first component is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessConfig {
    pub matrix_dir: PathBuf,
    pub build_dir: PathBuf,
    pub selection: SelectionCriteria,
    pub mode: TestMode,
    pub retention: RetentionFlags,
    pub coverage: CoverageConfig,
    pub endpoints: Endpoints,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            matrix_dir: PathBuf::from(DEFAULT_MATRIX_DIR),
            build_dir: PathBuf::from("."),
            selection: SelectionCriteria::default(),
            mode: TestMode::All,
            retention: RetentionFlags::default(),
            coverage: CoverageConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl HarnessConfig {
    pub fn layout(&self) -> BuildLayout {
        BuildLayout::new(&self.build_dir)
    }
}

/// Paths inside the native library's CMake build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub build_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(build_dir: &Path) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
        }
    }

    pub fn object_dir(&self) -> PathBuf {
        self.build_dir
            .join("CMakeFiles")
            .join("mongoose_dbg.dir")
            .join("Source")
    }

    pub fn source_root(&self) -> PathBuf {
        self.build_dir.join("..")
    }

    pub fn source_dir(&self) -> PathBuf {
        self.source_root().join("Source")
    }

    pub fn core_object(&self) -> PathBuf {
        self.object_dir().join("Mongoose_Graph.o")
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.build_dir.join("tests")
    }

    pub fn driver(&self) -> PathBuf {
        self.build_dir.join("bin").join("mongoose")
    }

    /// Fails unless this looks like a build directory in which the library
    /// has been compiled. Only reads file metadata.
    pub fn verify(&self) -> Result<()> {
        if !(self.object_dir().is_dir() && self.source_dir().is_dir()) {
            return Err(HarnessError::Environment(format!(
                "{} does not look like a build directory. Run from the build \
                 directory (e.g. Mongoose/_build) after 'cmake ..' and 'make'.",
                self.build_dir.display()
            )));
        }
        if !self.core_object().exists() {
            return Err(HarnessError::Environment(format!(
                "{} not found; the library has not been built yet. Run 'cmake ..' \
                 followed by 'make' in the build directory.",
                self.core_object().display()
            )));
        }
        Ok(())
    }
}
