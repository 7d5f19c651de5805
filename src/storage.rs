use async_trait::async_trait;
use log::warn;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed blob store for uploaded evidence files.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
    async fn delete(&self, hash: &str) -> Result<(), MediaStoreError>;
}

/// Filesystem implementation. Blobs live under `MEDIA_DIR` (default
/// `data/media`), fanned out by the first two hash characters.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new() -> Self {
        let root = std::env::var("MEDIA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/media"));
        Self { root }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        let mut p = self.root.clone();
        p.push(&hash[0..2]);
        p.push(hash);
        p
    }
}

impl Default for FsMediaStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, hash: &str, _mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let path = self.path_for(hash);
        if path.exists() {
            return Err(MediaStoreError::Duplicate);
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| MediaStoreError::Other(e.to_string()))?;
        }
        std::fs::write(&path, bytes).map_err(|e| MediaStoreError::Other(e.to_string()))
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let path = self.path_for(hash);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaStoreError::NotFound)
            }
            Err(e) => return Err(MediaStoreError::Other(e.to_string())),
        };
        // MIME is not persisted alongside the blob; sniff on the way out.
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, hash: &str) -> Result<(), MediaStoreError> {
        let path = self.path_for(hash);
        // Best-effort delete: treat not found as success.
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove blob {hash}: {e}");
            }
        }
        Ok(())
    }
}

/// Factory used in main.
pub fn build_media_store() -> Arc<dyn MediaStore> {
    Arc::new(FsMediaStore::new())
}
