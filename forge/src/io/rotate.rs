//! Timestamped archival rotation for round artifacts.
//!
//! A round artifact being superseded is renamed, never deleted, so prior
//! attempts stay auditable. Rotation is single-process only; concurrent
//! rotation of the same path is not supported.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::info;

/// Rename `path` with a time-of-day suffix before the extension.
///
/// Returns the archived path, or `None` if `path` does not exist. The
/// content moves byte-for-byte; if the archived name is already taken
/// (two rotations inside one second), a numeric suffix disambiguates.
pub fn rotate(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = Local::now().format("%H%M%S").to_string();
    let archived = available_name(path, &stamp)?;
    std::fs::rename(path, &archived).with_context(|| {
        format!("rotate {} to {}", path.display(), archived.display())
    })?;
    info!(from = %path.display(), to = %archived.display(), "rotated artifact");
    Ok(Some(archived))
}

fn available_name(path: &Path, stamp: &str) -> Result<PathBuf> {
    let base = archived_name(path, stamp)?;
    if !base.exists() {
        return Ok(base);
    }
    for n in 1..100 {
        let candidate = archived_name(path, &format!("{stamp}-{n}"))?;
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow!(
        "no free archive name for {} at {stamp}",
        path.display()
    ))
}

fn archived_name(path: &Path, stamp: &str) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("cannot rotate {}: no file name", path.display()))?;
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{stamp}.{ext}"),
        None => format!("{stem}_{stamp}"),
    };
    Ok(path.with_file_name(name))
}
