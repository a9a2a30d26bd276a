//! An on-disk `PageStorage`: one file per key under a per-process temp
//! directory, created lazily with `create_dir_all` (tolerating the
//! already-exists failure mode), as `procfs`'s own lazily-initialized
//! process-wide statics (`BOOTTIME`, `TICKS_PER_SECOND`) do for
//! derived, read-only facts -- this crate's equivalent is a derived,
//! read-only *location*.

use super::PageStorage;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

lazy_static! {
    /// The base directory new `FileStorage` instances default into when
    /// not given an explicit directory: a process-wide temp directory,
    /// named with a monotonic suffix plus randomness so that multiple
    /// processes (or multiple buffers in one process) never collide.
    static ref BASE_TEMP_DIR: PathBuf = {
        let unique = tempfile::Builder::new()
            .prefix("pbuf-")
            .tempdir()
            .expect("failed to create pbuf base temp directory")
            .into_path();
        unique
    };
}

/// One file per key under `dir`. `dir` is created lazily on first use.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Stores pages under the process-wide default base directory.
    pub fn new() -> Self {
        FileStorage {
            dir: BASE_TEMP_DIR.clone(),
        }
    }

    /// Stores pages under an explicit directory, useful for tests that
    /// want a `tempfile::tempdir()` they control the lifetime of.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        FileStorage { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        match fs::create_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        FileStorage::new()
    }
}

#[async_trait]
impl PageStorage for FileStorage {
    async fn save_page(&self, key: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.ensure_dir().await?;
        // Write to a sibling temp file and rename into place so a
        // concurrent `load_page` never observes a partial write.
        let target = self.path_for(key);
        let tmp = target.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp).await?;
            f.write_all(bytes).await?;
            f.flush().await?;
        }
        fs::rename(&tmp, &target).await
    }

    async fn load_page(&self, key: &str) -> std::io::Result<Vec<u8>> {
        fs::read(self.path_for(key)).await
    }

    async fn delete_page(&self, key: &str) -> std::io::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn page_exists(&self, key: &str) -> std::io::Result<bool> {
        Ok(fs::metadata(self.path_for(key)).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_page() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(tmp.path());
        storage.save_page("p0", b"hello world").await.unwrap();
        assert!(storage.page_exists("p0").await.unwrap());
        assert_eq!(storage.load_page("p0").await.unwrap(), b"hello world");
        assert!(storage.path_for("p0").starts_with(tmp.path()));
    }

    #[tokio::test]
    async fn delete_of_absent_key_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(tmp.path());
        storage.delete_page("missing").await.unwrap();
    }

    #[tokio::test]
    async fn load_of_absent_key_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(tmp.path());
        assert!(storage.load_page("missing").await.is_err());
    }

    #[tokio::test]
    async fn overwrite_replaces_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(tmp.path());
        storage.save_page("p0", b"first").await.unwrap();
        storage.save_page("p0", b"second").await.unwrap();
        assert_eq!(storage.load_page("p0").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn directory_created_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested").join("pages");
        let storage = FileStorage::with_dir(&nested);
        storage.save_page("p0", b"x").await.unwrap();
        assert!(nested.is_dir());
    }
}
