//! Label file serialization.
//!
//! Writes the shared `classes.txt` (one name per line, line position is the
//! label index) and one `{image base name}.txt` per image with lines
//! `"{index} {cx:.6} {cy:.6} {w:.6} {h:.6}"`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::annotate::ClassMap;
use crate::detector::Detection;
use crate::error::AutolabelError;

/// File name of the shared class dictionary.
pub const CLASS_FILE_NAME: &str = "classes.txt";

/// Writes the shared class file, one name per line in index order.
pub fn write_class_file(output_dir: &Path, map: &ClassMap) -> Result<PathBuf, AutolabelError> {
    let path = output_dir.join(CLASS_FILE_NAME);
    let mut file = fs::File::create(&path)
        .map_err(|source| AutolabelError::file_operation(path.clone(), source))?;

    for entry in map.entries() {
        writeln!(file, "{}", entry.name)
            .map_err(|source| AutolabelError::file_operation(path.clone(), source))?;
    }

    Ok(path)
}

/// Writes one image's label file and returns its path.
///
/// The file name is the image file name with its extension replaced by
/// `.txt`. Detections without box coordinates are skipped; an id missing
/// from the map falls back to index 0, which cannot happen when the map
/// was derived from the same batch of detections.
pub fn write_annotation_file(
    output_dir: &Path,
    image_path: &Path,
    detections: &[Detection],
    map: &ClassMap,
) -> Result<PathBuf, AutolabelError> {
    let file_name = image_path.file_name().ok_or_else(|| {
        AutolabelError::file_operation(
            image_path,
            io::Error::new(io::ErrorKind::InvalidInput, "image path has no file name"),
        )
    })?;
    let path = output_dir.join(Path::new(file_name).with_extension("txt"));

    let mut file = fs::File::create(&path)
        .map_err(|source| AutolabelError::file_operation(path.clone(), source))?;

    for detection in detections {
        let Some(bbox) = detection.bbox else {
            continue;
        };
        let index = map.index_of(detection.class_id).unwrap_or(0);
        writeln!(
            file,
            "{} {:.6} {:.6} {:.6} {:.6}",
            index, bbox.cx, bbox.cy, bbox.w, bbox.h
        )
        .map_err(|source| AutolabelError::file_operation(path.clone(), source))?;
    }

    Ok(path)
}
