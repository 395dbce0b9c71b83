//! Setup script discovery

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::FixtureError;

/// Scripts found under a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredScripts {
    /// Scripts to run, sorted by full path
    pub scripts: Vec<PathBuf>,
    /// Scripts excluded by the skip prefix, sorted by full path
    pub skipped: Vec<PathBuf>,
}

/// Collect every `.sql` file under `root`, recursively.
///
/// Files whose name starts with `skip_prefix` are set aside; the rest are
/// returned in ascending full-path order, compared case-insensitively, which
/// is the order they run in.
pub fn discover_scripts(root: &Path, skip_prefix: &str) -> Result<DiscoveredScripts, FixtureError> {
    if !root.is_dir() {
        return Err(FixtureError::ScriptDirectoryMissing {
            path: root.to_path_buf(),
        });
    }

    let mut discovered = DiscoveredScripts::default();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| FixtureError::ScriptDirectoryScanError {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_sql_file(path) {
            continue;
        }

        if has_skip_prefix(path, skip_prefix) {
            debug!("Skipping disabled script {}", path.display());
            discovered.skipped.push(path.to_path_buf());
        } else {
            discovered.scripts.push(path.to_path_buf());
        }
    }

    sort_paths(&mut discovered.scripts);
    sort_paths(&mut discovered.skipped);
    Ok(discovered)
}

/// Order paths by the whole path string, ignoring case; paths equal except
/// for case fall back to byte order.
pub fn sort_paths(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| path_order_key(p));
}

/// Sort key behind [`sort_paths`]
pub fn path_order_key(path: &Path) -> (String, PathBuf) {
    (path.to_string_lossy().to_lowercase(), path.to_path_buf())
}

fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

/// Whether the file name of `path` starts with `skip_prefix`
pub fn has_skip_prefix(path: &Path, skip_prefix: &str) -> bool {
    !skip_prefix.is_empty()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(skip_prefix))
}
