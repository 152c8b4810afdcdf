//! Recursive file listing.
//!
//! Symbolic links to files count as files; symbolic links to directories are
//! not descended into, so link loops cannot occur.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::record::FileRecord;

/// List every regular file under `root`, depth first.
///
/// Entries come back in the order the filesystem returns them. Paths are
/// absolute. A missing or non-directory root is `Error::NotFound`; anything
/// unreadable below the root is logged and skipped.
pub fn list_files(root: &Path) -> Result<Vec<FileRecord>> {
    list_files_excluding(root, &[])
}

/// Like [`list_files`], but prunes each existing path in `excluded`.
///
/// Excluded directories are not descended into. An excluded path equal to
/// the root itself is ignored.
pub fn list_files_excluding(root: &Path, excluded: &[&Path]) -> Result<Vec<FileRecord>> {
    let not_found = || Error::NotFound {
        path: root.to_path_buf(),
    };

    let metadata = fs::metadata(root).map_err(|_| not_found())?;
    if !metadata.is_dir() {
        return Err(not_found());
    }
    let root = fs::canonicalize(root).map_err(|_| not_found())?;

    // Paths that do not exist yet have nothing to prune
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .filter_map(|path| fs::canonicalize(path).ok())
        .filter(|path| *path != root)
        .collect();

    let mut files = Vec::new();

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|path| path == entry.path()));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                match err.path() {
                    Some(path) => warn!(path = %path.display(), "failed to access: {}", err),
                    None => warn!("walk error: {}", err),
                }
                continue;
            }
        };

        // Follows file symlinks; directories are skipped
        if !entry.path().is_file() {
            continue;
        }

        files.push(FileRecord::at(files.len(), entry.into_path()));
    }

    debug!(root = %root.display(), count = files.len(), "listed files");
    Ok(files)
}
