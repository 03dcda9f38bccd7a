//! Newline-delimited JSON batch file codec.
//!
//! One object per line, UTF-8. File bytes are decoded lossily so malformed
//! byte sequences inside free-text fields never abort a whole batch;
//! structural decode failures (a line that is not valid JSON for the target
//! type) are fatal for that read and reported with the line number.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Read every line of a batch file into typed objects.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = fs::read(path).with_context(|| format!("read batch {}", path.display()))?;
    // Lossy decode: invalid sequences become U+FFFD in text content.
    let text = String::from_utf8_lossy(&bytes);

    let mut items = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let item: T = serde_json::from_str(line)
            .with_context(|| format!("parse {} line {}", path.display(), lineno + 1))?;
        items.push(item);
    }
    debug!(path = %path.display(), lines = items.len(), "batch read");
    Ok(items)
}

/// Write objects to a batch file, one compact JSON object per line.
///
/// Creates parent directories as needed and replaces any existing file.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create batch directory {}", parent.display()))?;
    }
    let mut buf = String::new();
    for item in items {
        buf.push_str(&serde_json::to_string(item).context("serialize batch line")?);
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write batch {}", path.display()))?;
    debug!(path = %path.display(), lines = items.len(), "batch written");
    Ok(())
}
