use crate::cache::MatrixAsset;
use crate::config::RetentionFlags;
use crate::error::{HarnessError, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Purge always deletes. Otherwise only what this run downloaded is deleted,
/// and only when keep was not requested.
pub fn should_delete(flags: RetentionFlags, preexisted: bool) -> bool {
    flags.purge || (!flags.keep && !preexisted)
}

/// Applies the retention policy to one asset after its tests ran.
/// Returns whether the asset was deleted.
pub fn apply(asset: &MatrixAsset, flags: RetentionFlags) -> Result<bool> {
    if !should_delete(flags, asset.preexisted) {
        return Ok(false);
    }
    info!(
        archive = %asset.archive_path.display(),
        "Removing {}",
        asset.extract_dir.display()
    );
    remove_extracted(&asset.extract_dir)?;
    fs::remove_file(&asset.archive_path).map_err(|e| cleanup_err(&asset.archive_path, e))?;
    Ok(true)
}

/// Removes each entry directly inside `dir`, then `dir` itself. Nested
/// directories are not descended into, so a nested layout fails here.
fn remove_extracted(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| cleanup_err(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| cleanup_err(dir, e))?.path();
        fs::remove_file(&path).map_err(|e| cleanup_err(&path, e))?;
    }
    fs::remove_dir(dir).map_err(|e| cleanup_err(dir, e))
}

fn cleanup_err(path: &Path, source: std::io::Error) -> HarnessError {
    HarnessError::Cleanup {
        path: path.to_path_buf(),
        source,
    }
}
