//! Where artifacts are written.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use daq_core::DaqResult;
use tempfile::TempDir;

/// Supplies the output directory for each staged session.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Directory the writer should put the next artifact in.
    async fn get_directory(&self) -> DaqResult<PathBuf>;
}

/// A fresh temporary directory, removed when the provider is dropped.
#[derive(Debug)]
pub struct TmpDirectoryProvider {
    dir: TempDir,
}

impl TmpDirectoryProvider {
    /// Allocate the directory.
    pub fn new() -> DaqResult<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// The allocated directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
impl DirectoryProvider for TmpDirectoryProvider {
    async fn get_directory(&self) -> DaqResult<PathBuf> {
        Ok(self.dir.path().to_path_buf())
    }
}

/// Always the same directory.
#[derive(Debug, Clone)]
pub struct StaticDirectoryProvider {
    dir: PathBuf,
}

impl StaticDirectoryProvider {
    /// Use `dir` for every session.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectoryProvider {
    async fn get_directory(&self) -> DaqResult<PathBuf> {
        Ok(self.dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tmp_directory_is_stable_and_exists() {
        let provider = TmpDirectoryProvider::new().unwrap();
        let first = provider.get_directory().await.unwrap();
        assert_eq!(first, provider.get_directory().await.unwrap());
        assert!(first.is_dir());
    }

    #[tokio::test]
    async fn test_static_directory() {
        let provider = StaticDirectoryProvider::new("/tmp/123456");
        assert_eq!(provider.get_directory().await.unwrap(), PathBuf::from("/tmp/123456"));
    }
}
