//! On-disk cache of matrix archives under the matrix directory.
//!
//! Layout for a record `group/name`:
//!
//! ```text
//! <matrix_dir>/group_name.tar.gz   archive
//! <matrix_dir>/name/               extracted by the archive's own layout
//! <matrix_dir>/name/name.mtx       the file handed to the test executables
//! ```

use crate::error::{HarnessError, Result};
use crate::fetch::Fetcher;
use crate::index::IndexRecord;
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixAsset {
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub matrix_path: PathBuf,
    /// Whether the archive was already on disk when this run reached the
    /// record. Computed once; retention decisions read nothing else.
    pub preexisted: bool,
    /// Member paths listed in the archive, relative to the matrix directory.
    /// Enumerated on every acquire so a caller can remove exactly what the
    /// archive produced; retention itself only clears `extract_dir`.
    #[serde(skip)]
    pub members: Vec<PathBuf>,
}

impl MatrixAsset {
    pub fn downloaded(&self) -> bool {
        !self.preexisted
    }
}

pub fn archive_url(archive_base_url: &str, record: &IndexRecord) -> String {
    format!(
        "{}/{}/{}.tar.gz",
        archive_base_url.trim_end_matches('/'),
        record.group,
        record.name
    )
}

pub struct AssetCache<'a> {
    matrix_dir: &'a Path,
    archive_base_url: &'a str,
    fetcher: &'a dyn Fetcher,
}

impl<'a> AssetCache<'a> {
    pub fn new(matrix_dir: &'a Path, archive_base_url: &'a str, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            matrix_dir,
            archive_base_url,
            fetcher,
        }
    }

    pub fn archive_path(&self, record: &IndexRecord) -> PathBuf {
        self.matrix_dir
            .join(format!("{}_{}.tar.gz", record.group, record.name))
    }

    pub fn extract_dir(&self, record: &IndexRecord) -> PathBuf {
        self.matrix_dir.join(&record.name)
    }

    /// Resolves `record` to local files, downloading and unpacking on a miss.
    /// The matrix file itself is not checked; a missing file shows up as a
    /// failing test executable.
    pub fn acquire(&self, record: &IndexRecord) -> Result<MatrixAsset> {
        let archive_path = self.archive_path(record);
        let extract_dir = self.extract_dir(record);
        let matrix_path = extract_dir.join(format!("{}.mtx", record.name));
        let preexisted = archive_path.is_file();

        let members = if preexisted {
            debug!(archive = %archive_path.display(), "reusing cached archive");
            if extract_dir.exists() {
                list_members(&archive_path)?
            } else {
                info!(
                    "Extracting cached {}/{} (extracted directory missing)",
                    record.group, record.name
                );
                extract(&archive_path, self.matrix_dir)?
            }
        } else {
            let url = archive_url(self.archive_base_url, record);
            info!("Downloading {}/{}.tar.gz", record.group, record.name);
            self.fetcher.fetch(&url, &archive_path)?;
            extract(&archive_path, self.matrix_dir)?
        };
        debug!(members = members.len(), "archive members");

        Ok(MatrixAsset {
            archive_path,
            extract_dir,
            matrix_path,
            preexisted,
            members,
        })
    }
}

fn open_archive(path: &Path) -> Result<tar::Archive<GzDecoder<fs::File>>> {
    let file = fs::File::open(path).map_err(|source| HarnessError::Archive {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

pub fn list_members(archive_path: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |source: std::io::Error| HarnessError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = open_archive(archive_path)?;
    let mut members = Vec::new();
    for entry in archive.entries().map_err(archive_err)? {
        let entry = entry.map_err(archive_err)?;
        members.push(entry.path().map_err(archive_err)?.into_owned());
    }
    Ok(members)
}

/// Unpacks the whole archive into `dest`, trusting its internal layout.
/// Entries that would escape `dest` are skipped by `tar`.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |source: std::io::Error| HarnessError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = open_archive(archive_path)?;
    let mut members = Vec::new();
    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let member = entry.path().map_err(archive_err)?.into_owned();
        entry.unpack_in(dest).map_err(archive_err)?;
        members.push(member);
    }
    Ok(members)
}
