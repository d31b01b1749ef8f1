use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions picked up by indexing, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tiff", "tif", "webp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

/// Collect every image under the given files and directories, canonicalized,
/// deduplicated and sorted.
pub fn scan_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for root in paths {
        let root = root.as_ref();
        if !root.exists() {
            return Err(Error::ImagePathNotFound(root.to_path_buf()));
        }
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if entry.file_type().is_file() && is_image_file(entry.path()) {
                found.insert(entry.path().canonicalize()?);
            }
        }
    }
    Ok(found.into_iter().collect())
}
