//! The snapshot file shared by the collector and the analyzer.

use crate::collector::EnrichedPullRequest;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Overwrites `path` with the pretty-printed pull requests.
///
/// The JSON goes to a temporary file in the same directory which is then renamed over
/// `path`, so readers see either the previous snapshot or the complete new one.
pub fn write(path: &Path, prs: &[EnrichedPullRequest]) -> Result<()> {
    let json = serde_json::to_string_pretty(prs).context("Failed to serialize snapshot")?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.as_file().sync_all())
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("Failed to replace snapshot {}", path.display()))?;

    tracing::info!(path = %path.display(), count = prs.len(), "Wrote snapshot");
    Ok(())
}

pub fn read(path: &Path) -> Result<Vec<EnrichedPullRequest>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;

    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}
