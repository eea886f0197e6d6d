//! Remote transfer of the benchmark index and matrix archives.

use crate::error::{HarnessError, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Retrieves a remote resource into a local file, overwriting any existing copy.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|e| HarnessError::Config(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url, dest = %dest.display(), "fetching");
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| HarnessError::network(url, e))?;
        write_atomically(dest, |file| {
            response
                .copy_to(file)
                .map(|_| ())
                .map_err(|e| HarnessError::network(url, e))
        })
    }
}

/// Writes through a sibling temp file and renames it into place, so an
/// interrupted transfer never leaves a truncated file at `dest`.
pub(crate) fn write_atomically<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    let name = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    let tmp = dest.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    let mut file = fs::File::create(&tmp).map_err(|e| HarnessError::io(&tmp, e))?;
    let written = write(&mut file).and_then(|_| {
        file.flush().map_err(|e| HarnessError::io(&tmp, e))?;
        file.sync_all().map_err(|e| HarnessError::io(&tmp, e))
    });
    drop(file);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, dest).map_err(|e| HarnessError::io(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomically_replaces_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("UFstats.csv");
        fs::write(&dest, b"stale").expect("seed");

        write_atomically(&dest, |f| {
            f.write_all(b"fresh")
                .map_err(|e| HarnessError::io("UFstats.csv", e))
        })
        .expect("write");

        assert_eq!(fs::read(&dest).expect("read"), b"fresh");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind");
    }

    #[test]
    fn write_atomically_keeps_previous_file_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("HB_bcsstk01.tar.gz");
        fs::write(&dest, b"old").expect("seed");

        let err = write_atomically(&dest, |_| Err(HarnessError::network("http://x", "reset")))
            .expect_err("must fail");

        assert!(matches!(err, HarnessError::Network { .. }));
        assert_eq!(fs::read(&dest).expect("read"), b"old");
    }
}
