//! On-disk blob storage for the file cache.
//!
//! Layout under the root directory:
//!
//! ```text
//! blobs/<sha256>                 finished files, content addressed
//! fragments/<session>/<offset>   parts of a fragmented upload
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use matcha_core::files::assemble_fragments;
use matcha_core::{BlobStore, FileError, FileResult};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

pub struct DiskBlobs {
    root: PathBuf,
}

impl DiskBlobs {
    /// Creates the directory layout under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> FileResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join("blobs")).await?;
        tokio::fs::create_dir_all(root.join("fragments")).await?;
        debug!(root = %root.display(), "Opened file cache directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, sha256: &str) -> FileResult<PathBuf> {
        if !is_safe_name(sha256) {
            return Err(FileError::NotFound(sha256.to_owned()));
        }
        Ok(self.root.join("blobs").join(sha256))
    }

    fn session_dir(&self, session: &str) -> FileResult<PathBuf> {
        if !is_safe_name(session) {
            return Err(FileError::Fragment(format!("invalid session id {session}")));
        }
        Ok(self.root.join("fragments").join(session))
    }
}

/// Names become path components; only hex digits, letters and dashes are allowed.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn not_found(sha256: &str, err: std::io::Error) -> FileError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FileError::NotFound(sha256.to_owned())
    } else {
        err.into()
    }
}

#[async_trait]
impl BlobStore for DiskBlobs {
    async fn exists(&self, sha256: &str) -> FileResult<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(sha256)?).await?)
    }

    async fn put(&self, sha256: &str, contents: Vec<u8>) -> FileResult<()> {
        let path = self.blob_path(sha256)?;
        // write-then-rename keeps readers from seeing a partial blob
        let staging = path.with_extension(format!("{}.part", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&staging, &contents).await?;
        tokio::fs::rename(&staging, &path).await?;
        trace!(sha256, size = contents.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, sha256: &str) -> FileResult<Vec<u8>> {
        tokio::fs::read(self.blob_path(sha256)?)
            .await
            .map_err(|e| not_found(sha256, e))
    }

    async fn read_range(&self, sha256: &str, offset: u64, size: u64) -> FileResult<Vec<u8>> {
        let mut file = tokio::fs::File::open(self.blob_path(sha256)?)
            .await
            .map_err(|e| not_found(sha256, e))?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        file.take(size).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    fn locate(&self, sha256: &str) -> String {
        self.root.join("blobs").join(sha256).display().to_string()
    }

    async fn put_fragment(&self, session: &str, offset: u64, contents: Vec<u8>) -> FileResult<()> {
        let dir = self.session_dir(session)?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(offset.to_string()), contents).await?;
        Ok(())
    }

    async fn merge_fragments(&self, session: &str, total_size: u64) -> FileResult<Vec<u8>> {
        let dir = self.session_dir(session)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FileError::Fragment(format!("no fragments for session {session}"))
            } else {
                e.into()
            }
        })?;
        let mut parts = BTreeMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(offset) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) else {
                continue;
            };
            parts.insert(offset, tokio::fs::read(entry.path()).await?);
        }
        assemble_fragments(parts, total_size)
    }

    async fn discard_fragments(&self, session: &str) -> FileResult<()> {
        match tokio::fs::remove_dir_all(self.session_dir(session)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(feature = "remote-files")]
    async fn fetch_remote(&self, url: &str) -> FileResult<Vec<u8>> {
        debug!(url, "Downloading file source");
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FileError::Download(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FileError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use matcha_core::files::sha256_hex;
    use matcha_core::{FileCache, FileSource, MemoryStore};

    async fn scratch() -> DiskBlobs {
        let dir = std::env::temp_dir().join(format!("matcha-blobs-{}", uuid::Uuid::new_v4()));
        DiskBlobs::open(dir).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_and_range() {
        let blobs = scratch().await;
        let sha = sha256_hex(b"hello world");
        assert!(!blobs.exists(&sha).await.unwrap());

        blobs.put(&sha, b"hello world".to_vec()).await.unwrap();
        assert!(blobs.exists(&sha).await.unwrap());
        assert_eq!(blobs.get(&sha).await.unwrap(), b"hello world");
        assert_eq!(blobs.read_range(&sha, 6, 100).await.unwrap(), b"world");
        assert!(blobs.locate(&sha).ends_with(&sha));
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let blobs = scratch().await;
        assert!(matches!(blobs.get("abc").await, Err(FileError::NotFound(_))));
        assert!(matches!(blobs.get("../etc").await, Err(FileError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fragments() {
        let blobs = scratch().await;
        blobs.put_fragment("s1", 3, b"def".to_vec()).await.unwrap();
        blobs.put_fragment("s1", 0, b"abc".to_vec()).await.unwrap();
        assert_eq!(blobs.merge_fragments("s1", 6).await.unwrap(), b"abcdef");
        assert!(matches!(
            blobs.merge_fragments("s1", 7).await,
            Err(FileError::Fragment(_))
        ));

        blobs.discard_fragments("s1").await.unwrap();
        blobs.discard_fragments("s1").await.unwrap();
        assert!(matches!(
            blobs.merge_fragments("s1", 6).await,
            Err(FileError::Fragment(_))
        ));
    }

    #[tokio::test]
    async fn test_behind_file_cache() {
        let blobs = scratch().await;
        let cache = FileCache::new(Arc::new(MemoryStore::new()), Arc::new(blobs), "http://cache");
        let file = cache
            .create(FileSource::Bytes(b"tea".to_vec()), Some("tea.txt".into()), None)
            .await
            .unwrap();
        assert_eq!(cache.data(&file.id).await.unwrap(), b"tea");
        assert!(cache.path(&file.id).await.unwrap().contains("blobs"));
    }
}
