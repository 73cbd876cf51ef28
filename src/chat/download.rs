//! Saving exported archives to disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Write `blob` into `dir` as `name`, returning the path written.
///
/// An existing file is never overwritten; `name (1).ext`, `name (2).ext`, ... are tried instead.
pub fn save_download(dir: &Path, blob: &[u8], name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|err| Error::io(format!("creating {}", dir.display()), err))?;
    let path = free_path(dir, name);
    fs::write(&path, blob).map_err(|err| Error::io(format!("writing {}", path.display()), err))?;
    tracing::debug!(path = %path.display(), bytes = blob.len(), "saved download");
    Ok(path)
}

fn free_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
