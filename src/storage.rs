use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::fs;

/// Separate key spaces so a file and a JSON payload can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobNamespace {
    Files,
    Json,
}

impl BlobNamespace {
    pub fn for_document(is_file: bool) -> Self {
        if is_file {
            BlobNamespace::Files
        } else {
            BlobNamespace::Json
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlobNamespace::Files => "files",
            BlobNamespace::Json => "json",
        }
    }
}

impl fmt::Display for BlobNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(String),
    #[error("invalid blob name {0:?}")]
    InvalidName(String),
    #[error("blob storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn store(&self, namespace: BlobNamespace, name: &str, bytes: Bytes) -> BlobResult<()>;

    async fn retrieve(&self, namespace: BlobNamespace, name: &str) -> BlobResult<Bytes>;

    /// Succeeds when the blob is already gone.
    async fn remove(&self, namespace: BlobNamespace, name: &str) -> BlobResult<()>;
}

/// Names become single path components, so anything that could escape the
/// namespace directory is refused.
pub fn validate_blob_name(name: &str) -> BlobResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidName(name.to_string()))
    }
}

/// Filesystem layout: `{root}/files/{name}` and `{root}/json/{name}`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(root: impl AsRef<Path>) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        for namespace in [BlobNamespace::Files, BlobNamespace::Json] {
            fs::create_dir_all(root.join(namespace.as_str())).await?;
        }
        Ok(Self { root })
    }

    fn blob_path(&self, namespace: BlobNamespace, name: &str) -> BlobResult<PathBuf> {
        validate_blob_name(name)?;
        Ok(self.root.join(namespace.as_str()).join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, namespace: BlobNamespace, name: &str, bytes: Bytes) -> BlobResult<()> {
        let path = self.blob_path(namespace, name)?;
        fs::write(&path, &bytes).await?;
        Ok(())
    }

    async fn retrieve(&self, namespace: BlobNamespace, name: &str) -> BlobResult<Bytes> {
        let path = self.blob_path(namespace, name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(BlobError::NotFound(format!("{namespace}/{name}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, namespace: BlobNamespace, name: &str) -> BlobResult<()> {
        let path = self.blob_path(namespace, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(BlobNamespace, String), Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, namespace: BlobNamespace, name: &str) -> bool {
        self.blobs
            .read()
            .contains_key(&(namespace, name.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, namespace: BlobNamespace, name: &str, bytes: Bytes) -> BlobResult<()> {
        validate_blob_name(name)?;
        self.blobs
            .write()
            .insert((namespace, name.to_string()), bytes);
        Ok(())
    }

    async fn retrieve(&self, namespace: BlobNamespace, name: &str) -> BlobResult<Bytes> {
        validate_blob_name(name)?;
        self.blobs
            .read()
            .get(&(namespace, name.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::NotFound(format!("{namespace}/{name}")))
    }

    async fn remove(&self, namespace: BlobNamespace, name: &str) -> BlobResult<()> {
        validate_blob_name(name)?;
        self.blobs.write().remove(&(namespace, name.to_string()));
        Ok(())
    }
}
