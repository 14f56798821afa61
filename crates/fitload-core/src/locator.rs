use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Finds every regular file under `root` matching the glob `pattern`.
///
/// `**` in the pattern recurses through subdirectories. The result is sorted
/// lexicographically so repeated runs over the same tree aggregate records in
/// the same order. No match is not an error: an absent export simply yields an
/// empty list.
pub fn locate(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(PipelineError::invalid_path(root, "directory does not exist"));
    }
    if !root.is_dir() {
        return Err(PipelineError::invalid_path(root, "not a directory"));
    }
    let root_str = root
        .to_str()
        .ok_or_else(|| PipelineError::invalid_path(root, "path is not valid UTF-8"))?;

    let pattern = pattern.trim_start_matches('/');
    let full_pattern = if root_str.ends_with('/') {
        format!("{}{}", Pattern::escape(root_str), pattern)
    } else {
        format!("{}/{}", Pattern::escape(root_str), pattern)
    };

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut paths = Vec::new();
    for entry in glob::glob_with(&full_pattern, options)? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(path) => debug!(path = %path.display(), "ignoring non-file match"),
            Err(err) => warn!(error = %err, "could not read path while matching pattern"),
        }
    }

    paths.sort();
    paths.dedup();

    info!(pattern, count = paths.len(), "located files");
    for path in &paths {
        debug!(path = %path.display(), "matched file");
    }

    Ok(paths)
}
