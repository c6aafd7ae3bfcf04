//! The `Filesystem` capability trait: the only door jack's persistence
//! layers (`jack-config-store`, `jack-snapshot`) use to touch disk, so
//! tests can run against an in-memory fake instead of a real temp dir.

use async_trait::async_trait;
use jack_core::Result;
use std::path::Path;

#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    /// Plain write, no temp file or rename — callers that need atomicity
    /// (config store, snapshot ring) sequence `write`/`rename` themselves
    /// so they control the exact temp path and backup ordering.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    async fn remove_file(&self, path: &Path) -> Result<()>;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    async fn exists(&self, path: &Path) -> bool;
    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;
    /// File names directly under `dir`, unsorted.
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;
}

pub struct RealFilesystem;

#[async_trait]
impl Filesystem for RealFilesystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(path, data).await?)
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::copy(from, to).await?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Ok(tokio::fs::rename(from, to).await?)
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::remove_file(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(mode);
        Ok(tokio::fs::set_permissions(path, perms).await?)
    }

    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}
