use std::path::{Path, PathBuf};

use tracing::warn;

/// Directories never descended into during script discovery.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".env", "dist", "build", ".next", "target"];

/// Recursively collect `<prefix>-*.py` files under `dir`.
///
/// Unreadable directories are skipped with a warning rather than
/// aborting discovery.
pub(crate) fn find_scripts(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut results = Vec::new();
    walk(dir, prefix, &mut results);
    results
}

fn walk(dir: &Path, prefix: &str, results: &mut Vec<PathBuf>) {
    if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
        if SKIP_DIRS.contains(&name) {
            return;
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        // file_type() does not follow symlinks, so a cyclic directory
        // link cannot recurse forever.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            walk(&path, prefix, results);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let wanted = format!("{prefix}-");
            if name.starts_with(&wanted) && name.ends_with(".py") {
                results.push(path);
            }
        }
    }
}
