//! Input image discovery.
//!
//! Walks the input directory recursively and returns the image files whose
//! extension is in the configured set, sorted so batch order (and therefore
//! log output and statistics) is deterministic across runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::AutolabelError;
use crate::validate;

/// Collects image files under `folder`, recursively, sorted by path.
///
/// Fails when the folder is missing or not a directory, when it contains no
/// files at all, and when it contains files but none with a supported image
/// extension. The error messages distinguish these cases since they call for
/// different fixes on the user's side.
pub fn scan_images(
    folder: &Path,
    extensions: &BTreeSet<String>,
) -> Result<Vec<PathBuf>, AutolabelError> {
    validate::validate_directory(folder)?;

    let mut images = Vec::new();
    let mut saw_any_file = false;

    for entry in WalkDir::new(folder).follow_links(true) {
        let entry = entry.map_err(|source| {
            AutolabelError::invalid_parameter(format!(
                "failed while traversing {}: {source}",
                folder.display()
            ))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        saw_any_file = true;
        if has_image_extension(entry.path(), extensions) {
            images.push(entry.path().to_path_buf());
        }
    }

    if images.is_empty() {
        let message = if saw_any_file {
            format!(
                "no image files with a supported extension ({}) in {}",
                extensions
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
                folder.display()
            )
        } else {
            format!("directory {} contains no files", folder.display())
        };
        return Err(AutolabelError::invalid_parameter(message));
    }

    images.sort();
    debug!(count = images.len(), folder = %folder.display(), "scanned input images");
    Ok(images)
}

fn has_image_extension(path: &Path, extensions: &BTreeSet<String>) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions.contains(&format!(".{}", ext.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn extension_set() -> BTreeSet<String> {
        validate::validate_image_extensions(&[".png".to_string(), ".jpg".to_string()]).unwrap()
    }

    #[test]
    fn finds_images_recursively_and_sorted() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("b.png"), b"png").unwrap();
        fs::write(nested.join("a.JPG"), b"jpg").unwrap();
        fs::write(temp.path().join("notes.txt"), b"text").unwrap();

        let images = scan_images(temp.path(), &extension_set()).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.windows(2).all(|w| w[0] < w[1]));
        assert!(images.iter().any(|p| p.ends_with("nested/a.JPG")));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let err = scan_images(&temp.path().join("absent"), &extension_set()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let err = scan_images(temp.path(), &extension_set()).unwrap_err();
        assert!(err.to_string().contains("contains no files"));
    }

    #[test]
    fn directory_without_images_is_rejected_distinctly() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("readme.md"), b"md").unwrap();
        let err = scan_images(temp.path(), &extension_set()).unwrap_err();
        assert!(err.to_string().contains("supported extension"));
    }
}
