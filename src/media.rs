//! Durable storage for attachment bytes.
//!
//! The backend turns a [`LocalHandle`] into a stored object and hands back a
//! URI that stays valid across sessions.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::models::{LocalHandle, OwnerId};

/// Storage backend for attachment objects.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> std::io::Result<()>;

    /// Delete data at the specified path.
    async fn delete(&self, path: &str) -> std::io::Result<()>;

    /// URI that addresses `path` from outside the process.
    fn uri(&self, path: &str) -> String;

    /// Inverse of [`StorageBackend::uri`]; `None` for URIs this backend does not own.
    fn path_of(&self, uri: &str) -> Option<String>;
}

/// Files under a base directory, addressed with `file://` URIs
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> std::io::Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, size = data.len(), "media: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // temp file + rename so a crash never leaves half an attachment
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "media: rename failed");
            e
        })
    }

    async fn delete(&self, path: &str) -> std::io::Result<()> {
        match fs::remove_file(self.full_path(path)).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn uri(&self, path: &str) -> String {
        format!("file://{}", self.full_path(path).display())
    }

    fn path_of(&self, uri: &str) -> Option<String> {
        let prefix = format!("file://{}/", self.base_path.display());
        uri.strip_prefix(&prefix).map(str::to_string)
    }
}

/// Storage path for a captured object: `{owner}/{handle-id}.{ext}`
pub fn object_path(owner: &OwnerId, handle: &LocalHandle) -> String {
    format!("{}/{}.{}", sanitize(&owner.0), handle.id, extension_for(&handle.media_type))
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}
