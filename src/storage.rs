// SPDX-License-Identifier: GPL-3.0-only

//! Saving anaglyph composites and locating them afterwards

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::constants::storage::FILENAME_PREFIX;
use crate::errors::StorageError;
use crate::stereo::Frame;

/// Directory where composites are saved: `Pictures/<folder>`, falling back
/// to the home directory and then the working directory.
pub fn photo_directory(folder: &str) -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(folder)
}

/// Timestamped file name for a new composite
fn composite_filename() -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.png", FILENAME_PREFIX, timestamp)
}

/// Encode the composite as PNG and write it into `dir`.
///
/// `dir` is created if missing. Returns the path of the written file.
pub fn save_composite_sync(frame: &Frame, dir: &Path) -> Result<PathBuf, StorageError> {
    if frame.is_empty() {
        return Err(StorageError::NothingToSave);
    }

    std::fs::create_dir_all(dir)?;

    let image = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| {
            StorageError::EncodingFailed(format!(
                "buffer does not match {}x{} RGBA",
                frame.width(),
                frame.height()
            ))
        })?;

    let path = dir.join(composite_filename());
    image
        .save(&path)
        .map_err(|e| StorageError::SaveFailed(e.to_string()))?;

    info!(path = %path.display(), "Saved composite");
    Ok(path)
}

/// Save a composite without blocking the caller's thread.
pub async fn save_composite(frame: Frame, dir: PathBuf) -> Result<PathBuf, StorageError> {
    tokio::task::spawn_blocking(move || save_composite_sync(&frame, &dir))
        .await
        .map_err(|e| StorageError::SaveFailed(format!("save task failed: {}", e)))?
}

/// Most recently modified composite in `dir`, if any
pub fn latest_composite_path(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let is_image = path.extension().is_some_and(|ext| {
                let ext = ext.to_string_lossy();
                ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("jpg")
            });
            if !is_image {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Hand a saved file to the system image viewer.
pub fn open_in_viewer(path: &Path) {
    if let Err(e) = open::that_detached(path) {
        error!(error = %e, path = %path.display(), "Failed to open image viewer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stereo-camera-test-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn test_composite_filename_shape() {
        let name = composite_filename();
        assert!(name.starts_with("anaglyph_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_save_rejects_empty_frame() {
        let err = save_composite_sync(&Frame::empty(), Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, StorageError::NothingToSave));
    }

    #[test]
    fn test_save_writes_png_and_rescan_finds_it() {
        let dir = scratch_dir("save");
        let _ = std::fs::remove_dir_all(&dir);

        // 2x1 frame: red, cyan
        let data: Vec<u8> = vec![255, 0, 0, 255, 0, 255, 255, 255];
        let frame = Frame::new(2, 1, Arc::from(data));
        let path = save_composite_sync(&frame, &dir).expect("save should succeed");
        assert!(path.exists());
        assert!(
            path.file_name()
                .expect("file name")
                .to_string_lossy()
                .starts_with("anaglyph_")
        );

        let found = latest_composite_path(&dir).expect("rescan should find the saved file");
        assert_eq!(found, path);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_latest_composite_path_on_missing_dir() {
        assert!(latest_composite_path(Path::new("/nonexistent/stereo")).is_none());
    }
}
