//! File storage for attachments and generated thumbnails.
//!
//! Everything lives under a single data root:
//! `files/{entry_id}/...` for attachments and `thumbnails/{entry_id}[-variant].jpg`
//! for generated thumbnails. Stored paths are relative to the root so the
//! database stays portable across hosts.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("path escapes storage root: {0}")]
    PathEscapesRoot(String),
}

/// A file persisted under the storage root.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the storage root, with forward slashes.
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Storage collaborator for job handlers and the upload surface.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    fn attachments_root(&self) -> PathBuf {
        self.root.join("files")
    }

    fn thumbnails_root(&self) -> PathBuf {
        self.root.join("thumbnails")
    }

    pub fn save_attachment(
        &self,
        entry_id: Uuid,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let safe_name = sanitize_file_name(original_name);
        let ext = extension_from_name(&safe_name);
        let id = Uuid::new_v4();

        let entry_dir = self.attachments_root().join(entry_id.to_string());
        ensure_under_root(&self.attachments_root(), &entry_dir)?;
        fs::create_dir_all(&entry_dir)?;

        let stored_file_name = if ext.is_empty() {
            id.to_string()
        } else {
            format!("{id}.{ext}")
        };
        let absolute = entry_dir.join(&stored_file_name);
        ensure_under_root(&self.attachments_root(), &absolute)?;

        fs::write(&absolute, bytes)?;

        let mime_type = mime_guess::from_path(&safe_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StoredFile {
            storage_path: relative_path(&self.root, &absolute),
            original_name: safe_name,
            mime_type,
            size_bytes: bytes.len() as u64,
        })
    }

    /// Store a thumbnail JPEG for an entry. Variant is optional (e.g.
    /// "large"): without one the file is `{entry_id}.jpg`, with one it is
    /// `{entry_id}-{variant}.jpg`.
    pub fn save_thumbnail_jpeg(
        &self,
        entry_id: Uuid,
        variant: Option<&str>,
        jpeg_bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let suffix = match variant.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => format!("-{}", v.to_ascii_lowercase()),
            None => String::new(),
        };
        let file_name = format!("{entry_id}{suffix}.jpg");
        let thumbs = self.thumbnails_root();
        let absolute = thumbs.join(&file_name);
        ensure_under_root(&thumbs, &absolute)?;
        fs::create_dir_all(&thumbs)?;
        fs::write(&absolute, jpeg_bytes)?;

        Ok(StoredFile {
            storage_path: relative_path(&self.root, &absolute),
            original_name: file_name,
            mime_type: "image/jpeg".to_string(),
            size_bytes: jpeg_bytes.len() as u64,
        })
    }

    pub fn load_bytes(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        let absolute = self.root.join(relative);
        ensure_under_root(&self.root, &absolute)?;
        Ok(fs::read(absolute)?)
    }

    pub fn exists(&self, relative: &str) -> bool {
        let absolute = self.root.join(relative);
        ensure_under_root(&self.root, &absolute).is_ok() && absolute.exists()
    }

    /// Best-effort cleanup of everything stored for an entry.
    pub fn delete_entry_data(&self, entry_id: Uuid) -> Result<(), StorageError> {
        let entry_dir = self.attachments_root().join(entry_id.to_string());
        ensure_under_root(&self.attachments_root(), &entry_dir)?;
        if entry_dir.exists() {
            fs::remove_dir_all(&entry_dir)?;
        }

        let thumbs = self.thumbnails_root();
        if thumbs.is_dir() {
            let prefix = entry_id.to_string();
            for dir_entry in fs::read_dir(&thumbs)? {
                let Ok(dir_entry) = dir_entry else { continue };
                let name = dir_entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with(".jpg") {
                    if let Err(err) = fs::remove_file(dir_entry.path()) {
                        tracing::debug!(file = %name, error = %err, "thumbnail cleanup skipped");
                    }
                }
            }
        }
        Ok(())
    }
}

fn relative_path(root: &Path, absolute: &Path) -> String {
    absolute
        .strip_prefix(root)
        .unwrap_or(absolute)
        .to_string_lossy()
        .replace('\\', "/")
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' | ' ' => c,
            _ => '_',
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "upload".to_string()
    } else {
        collapsed
    }
}

fn extension_from_name(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(i) if i + 1 < file_name.len() => file_name[i + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

fn ensure_under_root(root: &Path, candidate: &Path) -> Result<(), StorageError> {
    // Reject traversal lexically; the candidate may not exist yet.
    for component in candidate.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(StorageError::PathEscapesRoot(
                candidate.to_string_lossy().into_owned(),
            ));
        }
    }
    if !candidate.starts_with(root) {
        return Err(StorageError::PathEscapesRoot(
            candidate.to_string_lossy().into_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path());
        (dir, storage)
    }

    #[test]
    fn saves_and_loads_attachment() {
        let (_dir, storage) = storage();
        let entry = Uuid::new_v4();
        let stored = storage
            .save_attachment(entry, "my photo.png", b"pngbytes")
            .expect("save");
        assert!(stored.storage_path.starts_with("files/"));
        assert_eq!(stored.mime_type, "image/png");
        assert_eq!(storage.load_bytes(&stored.storage_path).unwrap(), b"pngbytes");
    }

    #[test]
    fn thumbnail_naming_includes_variant() {
        let (_dir, storage) = storage();
        let entry = Uuid::new_v4();
        let small = storage
            .save_thumbnail_jpeg(entry, None, b"jpg")
            .expect("small");
        let large = storage
            .save_thumbnail_jpeg(entry, Some("large"), b"jpg")
            .expect("large");
        assert!(small.storage_path.ends_with(&format!("{entry}.jpg")));
        assert!(large.storage_path.ends_with(&format!("{entry}-large.jpg")));
    }

    #[test]
    fn rejects_traversal() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.load_bytes("../outside.txt"),
            Err(StorageError::PathEscapesRoot(_))
        ));
    }

    #[test]
    fn sanitizes_hostile_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("  "), "upload");
        assert_eq!(sanitize_file_name("a   b.png"), "a b.png");
    }

    #[test]
    fn delete_entry_data_removes_thumbnails() {
        let (_dir, storage) = storage();
        let entry = Uuid::new_v4();
        storage.save_thumbnail_jpeg(entry, None, b"jpg").unwrap();
        storage
            .save_thumbnail_jpeg(entry, Some("large"), b"jpg")
            .unwrap();
        storage.save_attachment(entry, "a.txt", b"text").unwrap();

        storage.delete_entry_data(entry).expect("delete");
        let small = format!("thumbnails/{entry}.jpg");
        assert!(!storage.exists(&small));
    }
}
