//! Enrolled identities, loaded from a directory of reference images.
//!
//! Each image contributes at most one entry: the first detected face, named
//! after the file stem. Files that cannot be enrolled are skipped with a
//! warning; a missing directory yields an empty gallery.

use crate::encoder::{EncodeError, FaceEncoder};
use crate::types::{Embedding, UNKNOWN_LABEL};
use image::ImageReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a reference image did not produce a gallery entry.
#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("file name has no usable stem")]
    NoName,
    #[error("file name {0:?} is reserved for unmatched faces")]
    ReservedName(String),
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no face detected")]
    NoFace,
    #[error("detected face could not be encoded")]
    NoEmbedding,
    #[error("encoder produced an invalid embedding")]
    InvalidEmbedding,
    #[error(transparent)]
    Encoder(#[from] EncodeError),
}

/// One enrolled (name, embedding) pair.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Ordered set of enrolled faces; order is enrollment scan order.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    /// Enroll every image file in `dir`, in path order.
    pub fn load<E: FaceEncoder + ?Sized>(dir: &Path, encoder: &mut E) -> Self {
        let files = match list_files(dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "gallery directory unreadable; starting with an empty gallery");
                return Self::default();
            }
        };

        tracing::info!(dir = %dir.display(), files = files.len(), "loading gallery");

        let mut entries = Vec::with_capacity(files.len());
        for path in &files {
            match enroll_file(path, encoder) {
                Ok(entry) => {
                    tracing::debug!(name = %entry.name, path = %path.display(), "enrolled");
                    entries.push(entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), reason = %e, "skipping gallery image");
                }
            }
        }

        tracing::info!(
            loaded = entries.len(),
            skipped = files.len() - entries.len(),
            "gallery loaded"
        );

        Self { entries }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in gallery order (repeats when one person has several images).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path()));
    Ok(regular_files(dir, entries))
}

/// Sorted regular files; unreadable entries are skipped.
fn regular_files(
    dir: &Path,
    entries: impl IntoIterator<Item = std::io::Result<PathBuf>>,
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable gallery entry"),
        }
    }
    files.sort();
    files
}

/// Build the gallery entry for a single reference image.
pub fn enroll_file<E: FaceEncoder + ?Sized>(
    path: &Path,
    encoder: &mut E,
) -> Result<GalleryEntry, EnrollError> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or(EnrollError::NoName)?;
    if name == UNKNOWN_LABEL {
        return Err(EnrollError::ReservedName(name));
    }

    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgb8();

    let detections = encoder.detect(&image)?;
    let first = detections.first().ok_or(EnrollError::NoFace)?;
    if detections.len() > 1 {
        tracing::debug!(path = %path.display(), faces = detections.len(), "several faces; using the first");
    }

    let embedding = encoder.encode(&image, first)?.ok_or(EnrollError::NoEmbedding)?;
    if !embedding.is_valid() {
        return Err(EnrollError::InvalidEmbedding);
    }

    Ok(GalleryEntry { name, embedding })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ColorEncoder;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, file: &str, color: [u8; 3]) {
        RgbImage::from_pixel(8, 8, Rgb(color)).save(dir.join(file)).unwrap();
    }

    #[test]
    fn test_load_counts_only_images_with_faces() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "alice.png", [10, 20, 30]);
        write_image(dir.path(), "bob.png", [40, 50, 60]);
        write_image(dir.path(), "empty_room.png", [0, 0, 0]); // no face
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let gallery = Gallery::load(dir.path(), &mut ColorEncoder);
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_entries_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "zoe.png", [1, 1, 1]);
        write_image(dir.path(), "adam.png", [2, 2, 2]);
        write_image(dir.path(), "mia.png", [3, 3, 3]);

        let gallery = Gallery::load(dir.path(), &mut ColorEncoder);
        assert_eq!(gallery.names().collect::<Vec<_>>(), vec!["adam", "mia", "zoe"]);
    }

    #[test]
    fn test_same_name_different_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "carol.png", [5, 5, 5]);
        write_image(dir.path(), "carol.bmp", [6, 6, 6]);

        let gallery = Gallery::load(dir.path(), &mut ColorEncoder);
        assert_eq!(gallery.len(), 2);
        assert!(gallery.names().all(|n| n == "carol"));
    }

    #[test]
    fn test_unreadable_entry_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("alice.jpg");
        let b = dir.path().join("bob.jpg");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"x").unwrap();

        let entries = vec![
            Ok(b.clone()),
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied")),
            Ok(dir.path().to_path_buf()),
            Ok(a.clone()),
        ];
        assert_eq!(regular_files(dir.path(), entries), vec![a, b]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Gallery::load(&dir.path().join("nope"), &mut ColorEncoder);
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_reserved_name_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "Unknown.png", [9, 9, 9]);
        let err = enroll_file(&dir.path().join("Unknown.png"), &mut ColorEncoder).unwrap_err();
        assert!(matches!(err, EnrollError::ReservedName(_)));
        assert!(Gallery::load(dir.path(), &mut ColorEncoder).is_empty());
    }

    #[test]
    fn test_enroll_file_no_face() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "blank.png", [0, 7, 7]);
        let err = enroll_file(&dir.path().join("blank.png"), &mut ColorEncoder).unwrap_err();
        assert!(matches!(err, EnrollError::NoFace));
    }

    #[test]
    fn test_enroll_file_embedding_from_first_face() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "dave.png", [7, 8, 9]);
        let entry = enroll_file(&dir.path().join("dave.png"), &mut ColorEncoder).unwrap();
        assert_eq!(entry.name, "dave");
        assert_eq!(entry.embedding.values, vec![7.0, 8.0, 9.0]);
    }
}
