use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::routes;
use crate::validation::ImageFormat;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write upload to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove upload {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create uploads directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file written to the uploads directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Sanitised version of the client's filename
    pub filename: String,
    /// Name on disk, unique per upload
    pub stored_name: String,
    pub image_url: String,
}

/// Uploaded images on local disk, served back under `/uploads`.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: self.root.clone(),
                    source,
                })?;
            info!(path = %self.root.display(), "Created uploads directory");
        }
        Ok(())
    }

    /// Writes `bytes` under a fresh name. The extension follows the detected
    /// format, not the client's filename.
    pub async fn save(
        &self,
        original_name: &str,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        self.ensure_root().await?;

        let filename = secure_filename(original_name);
        let stored_name = format!("{}.{}", Uuid::new_v4().simple(), format.extension());
        let path = self.root.join(&stored_name);

        fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), size = bytes.len(), "Stored upload");

        Ok(StoredUpload {
            image_url: Self::image_url(&stored_name),
            filename,
            stored_name,
        })
    }

    #[must_use]
    pub fn image_url(stored_name: &str) -> String {
        format!("{}/{stored_name}", routes::UPLOADS_PREFIX)
    }

    /// Deletes a stored image. Already gone counts as removed.
    pub async fn remove(&self, stored_name: &str) -> Result<(), StorageError> {
        if stored_name.is_empty() || secure_filename(stored_name) != stored_name {
            return Ok(());
        }

        let path = self.root.join(stored_name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove { path, source }),
        }
    }

    /// Whether a previously stored image is still on disk.
    pub async fn exists(&self, stored_name: &str) -> bool {
        if stored_name.is_empty() || secure_filename(stored_name) != stored_name {
            return false;
        }

        fs::metadata(self.root.join(stored_name))
            .await
            .is_ok_and(|m| m.is_file())
    }
}

/// Reduces a client-supplied filename to a safe flat name: ASCII letters,
/// digits, `_`, `-` and `.` only, whitespace runs become `_`, no leading
/// dots or underscores, no path components. Falls back to `upload`.
#[must_use]
pub fn secure_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool chest.png"), "My_cool_chest.png");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("C:\\Windows\\x-ray.jpg"), "C_Windows_x-ray.jpg");
        assert_eq!(secure_filename(".hidden"), "hidden");
        assert_eq!(secure_filename("röntgen.png"), "rntgen.png");
        assert_eq!(secure_filename("..."), "upload");
        assert_eq!(secure_filename(""), "upload");
    }

    #[tokio::test]
    async fn test_save_and_exists() {
        let root = std::env::temp_dir().join(format!("mediscan-storage-{}", Uuid::new_v4()));
        let storage = UploadStorage::new(&root);

        let stored = storage
            .save("scan 1.PNG", ImageFormat::Png, b"\x89PNG\r\n\x1a\n")
            .await
            .unwrap();

        assert_eq!(stored.filename, "scan_1.PNG");
        assert!(stored.stored_name.ends_with(".png"));
        assert_eq!(stored.image_url, format!("/uploads/{}", stored.stored_name));
        assert!(storage.exists(&stored.stored_name).await);
        assert!(!storage.exists("missing.png").await);
        assert!(!storage.exists("../secret").await);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let root = std::env::temp_dir().join(format!("mediscan-storage-{}", Uuid::new_v4()));
        let storage = UploadStorage::new(&root);

        let stored = storage
            .save("scan.png", ImageFormat::Png, b"\x89PNG\r\n\x1a\n")
            .await
            .unwrap();

        storage.remove(&stored.stored_name).await.unwrap();
        assert!(!storage.exists(&stored.stored_name).await);
        storage.remove(&stored.stored_name).await.unwrap();
        storage.remove("../outside.png").await.unwrap();

        let _ = std::fs::remove_dir_all(root);
    }
}
