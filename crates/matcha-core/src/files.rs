//! File cache capability.
//!
//! Files are addressed by an opaque id. Metadata lives in the [`Store`];
//! contents live in a [`BlobStore`] keyed by SHA-256 digest, so identical
//! uploads share one blob and one id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FileError, FileResult};
use crate::store::{CacheFile, Store};

/// Hex SHA-256 of `contents`.
pub fn sha256_hex(contents: &[u8]) -> String {
    format!("{:x}", Sha256::digest(contents))
}

/// Where file contents come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// `http(s)://`, `file://`, `data:...;base64,`, `base64://` or bare Base64.
    Str(String),
    Bytes(Vec<u8>),
}

/// Result of caching a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFile {
    pub id: String,
    pub url: String,
}

/// Content-addressed byte storage plus scratch space for fragmented uploads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, sha256: &str) -> FileResult<bool>;
    async fn put(&self, sha256: &str, contents: Vec<u8>) -> FileResult<()>;
    async fn get(&self, sha256: &str) -> FileResult<Vec<u8>>;
    async fn read_range(&self, sha256: &str, offset: u64, size: u64) -> FileResult<Vec<u8>>;
    /// A local path (or pseudo-path) for the blob.
    fn locate(&self, sha256: &str) -> String;

    async fn put_fragment(&self, session: &str, offset: u64, contents: Vec<u8>) -> FileResult<()>;
    /// Concatenates all fragments of `session`; they must cover `0..total_size` exactly.
    async fn merge_fragments(&self, session: &str, total_size: u64) -> FileResult<Vec<u8>>;
    async fn discard_fragments(&self, session: &str) -> FileResult<()>;

    /// Downloads a remote source.
    async fn fetch_remote(&self, url: &str) -> FileResult<Vec<u8>> {
        Err(FileError::Download(format!("remote sources are not supported: {url}")))
    }
}

/// Checks that fragments keyed by offset tile `0..total_size` with no gap or overlap.
pub fn assemble_fragments(parts: BTreeMap<u64, Vec<u8>>, total_size: u64) -> FileResult<Vec<u8>> {
    let mut merged = Vec::new();
    for (offset, part) in parts {
        if offset != merged.len() as u64 {
            return Err(FileError::Fragment(format!(
                "expected fragment at offset {}, found {offset}",
                merged.len()
            )));
        }
        if offset + part.len() as u64 > total_size {
            return Err(FileError::Fragment(format!(
                "fragment at offset {offset} overruns declared size {total_size}"
            )));
        }
        merged.extend_from_slice(&part);
    }
    if merged.len() as u64 != total_size {
        return Err(FileError::Fragment(format!(
            "merged size {} does not match declared {total_size}",
            merged.len()
        )));
    }
    Ok(merged)
}

fn looks_like_file_id(s: &str) -> bool {
    s.len() == 36 && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

// ============================================================================
// FileCache
// ============================================================================

/// Id-addressed file cache built from a store and a blob backend.
pub struct FileCache {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    base_url: String,
}

impl FileCache {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            blobs,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Resolves a source string to bytes.
    pub async fn load(&self, source: &str) -> FileResult<Vec<u8>> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.blobs.fetch_remote(source).await;
        }
        if let Some(path) = source.strip_prefix("file://") {
            // file:///C:/x on Windows keeps the drive letter after the third slash
            let path = if cfg!(windows) { path.trim_start_matches('/') } else { path };
            return Ok(tokio::fs::read(path).await?);
        }
        let encoded = if source.starts_with("data:") {
            source
                .split_once(";base64,")
                .map(|(_, data)| data)
                .ok_or_else(|| FileError::InvalidSource("data URL without base64 payload".into()))?
        } else {
            source.strip_prefix("base64://").unwrap_or(source)
        };
        BASE64
            .decode(encoded)
            .map_err(|e| FileError::InvalidSource(e.to_string()))
    }

    /// Resolves a source to its contents without caching it.
    pub async fn bytes_of(&self, source: FileSource) -> FileResult<Vec<u8>> {
        match source {
            FileSource::Bytes(b) => Ok(b),
            FileSource::Str(s) => self.load(&s).await,
        }
    }

    /// Caches a file, reusing an existing id when the content is already known.
    ///
    /// A source string that is itself a cached file id resolves to that file.
    pub async fn create(
        &self,
        source: FileSource,
        name: Option<String>,
        expected_sha256: Option<&str>,
    ) -> FileResult<CachedFile> {
        if let FileSource::Str(s) = &source
            && looks_like_file_id(s)
            && let Some(file) = self.store.file(s).await?
            && self.blobs.exists(&file.sha256).await?
        {
            return Ok(CachedFile {
                url: self.url_for(&file.sha256),
                id: file.id,
            });
        }

        let contents = self.bytes_of(source).await?;
        let sha256 = sha256_hex(&contents);
        if let Some(expected) = expected_sha256
            && !expected.eq_ignore_ascii_case(&sha256)
        {
            return Err(FileError::ChecksumMismatch {
                expected: expected.to_owned(),
                actual: sha256,
            });
        }
        let size = contents.len() as u64;
        if !self.blobs.exists(&sha256).await? {
            self.blobs.put(&sha256, contents).await?;
        }

        let id = match self.store.file_by_sha256(&sha256).await? {
            Some(existing) => existing.id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                self.store
                    .put_file(CacheFile {
                        id: id.clone(),
                        name: name.unwrap_or_else(|| sha256.clone()),
                        sha256: sha256.clone(),
                        size,
                    })
                    .await?;
                id
            }
        };
        debug!(file_id = %id, sha256 = %sha256, size, "Cached file");
        Ok(CachedFile {
            id,
            url: self.url_for(&sha256),
        })
    }

    fn url_for(&self, sha256: &str) -> String {
        format!("{}/{sha256}", self.base_url)
    }

    pub async fn info(&self, id: &str) -> FileResult<CacheFile> {
        self.store
            .file(id)
            .await?
            .ok_or_else(|| FileError::NotFound(id.to_owned()))
    }

    pub async fn url(&self, id: &str) -> FileResult<String> {
        Ok(self.url_for(&self.info(id).await?.sha256))
    }

    pub async fn path(&self, id: &str) -> FileResult<String> {
        Ok(self.blobs.locate(&self.info(id).await?.sha256))
    }

    pub async fn data(&self, id: &str) -> FileResult<Vec<u8>> {
        self.blobs.get(&self.info(id).await?.sha256).await
    }

    pub async fn read_range(&self, id: &str, offset: u64, size: u64) -> FileResult<Vec<u8>> {
        let info = self.info(id).await?;
        self.blobs.read_range(&info.sha256, offset, size).await
    }

    pub async fn write_fragment(&self, session: &str, offset: u64, source: FileSource) -> FileResult<()> {
        let contents = self.bytes_of(source).await?;
        self.blobs.put_fragment(session, offset, contents).await
    }

    /// Merges a fragmented upload and registers it under `session` as its id.
    pub async fn finish_fragments(
        &self,
        session: &str,
        name: &str,
        total_size: u64,
        sha256: &str,
    ) -> FileResult<CacheFile> {
        let merged = self.blobs.merge_fragments(session, total_size).await?;
        let actual = sha256_hex(&merged);
        if !actual.eq_ignore_ascii_case(sha256) {
            self.blobs.discard_fragments(session).await?;
            return Err(FileError::ChecksumMismatch {
                expected: sha256.to_owned(),
                actual,
            });
        }
        if !self.blobs.exists(&actual).await? {
            self.blobs.put(&actual, merged).await?;
        }
        self.blobs.discard_fragments(session).await?;
        let file = CacheFile {
            id: session.to_owned(),
            name: name.to_owned(),
            sha256: actual,
            size: total_size,
        };
        self.store.put_file(file.clone()).await?;
        Ok(file)
    }

    pub async fn discard_fragments(&self, session: &str) -> FileResult<()> {
        self.blobs.discard_fragments(session).await
    }
}

// ============================================================================
// MemoryBlobs
// ============================================================================

/// In-memory [`BlobStore`].
#[derive(Default)]
pub struct MemoryBlobs {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fragments: RwLock<HashMap<String, BTreeMap<u64, Vec<u8>>>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn exists(&self, sha256: &str) -> FileResult<bool> {
        Ok(self.blobs.read().contains_key(sha256))
    }

    async fn put(&self, sha256: &str, contents: Vec<u8>) -> FileResult<()> {
        self.blobs.write().insert(sha256.to_owned(), contents);
        Ok(())
    }

    async fn get(&self, sha256: &str) -> FileResult<Vec<u8>> {
        self.blobs
            .read()
            .get(sha256)
            .cloned()
            .ok_or_else(|| FileError::NotFound(sha256.to_owned()))
    }

    async fn read_range(&self, sha256: &str, offset: u64, size: u64) -> FileResult<Vec<u8>> {
        let blobs = self.blobs.read();
        let blob = blobs
            .get(sha256)
            .ok_or_else(|| FileError::NotFound(sha256.to_owned()))?;
        let start = (offset as usize).min(blob.len());
        let end = start.saturating_add(size as usize).min(blob.len());
        Ok(blob[start..end].to_vec())
    }

    fn locate(&self, sha256: &str) -> String {
        format!("memory://{sha256}")
    }

    async fn put_fragment(&self, session: &str, offset: u64, contents: Vec<u8>) -> FileResult<()> {
        self.fragments
            .write()
            .entry(session.to_owned())
            .or_default()
            .insert(offset, contents);
        Ok(())
    }

    async fn merge_fragments(&self, session: &str, total_size: u64) -> FileResult<Vec<u8>> {
        let parts = self
            .fragments
            .read()
            .get(session)
            .cloned()
            .ok_or_else(|| FileError::Fragment(format!("no fragments for session {session}")))?;
        assemble_fragments(parts, total_size)
    }

    async fn discard_fragments(&self, session: &str) -> FileResult<()> {
        self.fragments.write().remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> FileCache {
        FileCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobs::new()),
            "http://127.0.0.1:8121/matcha/cache/",
        )
    }

    #[tokio::test]
    async fn test_create_deduplicates_by_digest() {
        let cache = cache();
        let a = cache
            .create(FileSource::Str("base64://aGVsbG8=".into()), None, None)
            .await
            .unwrap();
        let b = cache
            .create(FileSource::Bytes(b"hello".to_vec()), None, None)
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.url, format!("http://127.0.0.1:8121/matcha/cache/{}", sha256_hex(b"hello")));
        assert_eq!(cache.data(&a.id).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_accepts_existing_id() {
        let cache = cache();
        let first = cache
            .create(FileSource::Bytes(vec![9; 4]), Some("n.bin".into()), None)
            .await
            .unwrap();
        let again = cache
            .create(FileSource::Str(first.id.clone()), None, None)
            .await
            .unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn test_data_url_and_checksum() {
        let cache = cache();
        let err = cache
            .create(
                FileSource::Str("data:text/plain;base64,aGVsbG8=".into()),
                None,
                Some("00"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fragment_merge() {
        let cache = cache();
        cache
            .write_fragment("s", 3, FileSource::Bytes(b"lo".to_vec()))
            .await
            .unwrap();
        cache
            .write_fragment("s", 0, FileSource::Bytes(b"hel".to_vec()))
            .await
            .unwrap();
        let file = cache
            .finish_fragments("s", "greeting.txt", 5, &sha256_hex(b"hello"))
            .await
            .unwrap();
        assert_eq!(file.id, "s");
        assert_eq!(cache.read_range("s", 1, 3).await.unwrap(), b"ell");
    }

    #[test]
    fn test_assemble_rejects_gap() {
        let mut parts = BTreeMap::new();
        parts.insert(0, vec![1]);
        parts.insert(2, vec![3]);
        assert!(assemble_fragments(parts, 3).is_err());
    }

    #[test]
    fn test_assemble_bounds_declared_size() {
        let mut parts = BTreeMap::new();
        parts.insert(0, b"hel".to_vec());
        assert!(matches!(
            assemble_fragments(parts.clone(), u64::MAX),
            Err(FileError::Fragment(_))
        ));

        parts.insert(3, b"lo!".to_vec());
        let err = assemble_fragments(parts, 5).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }
}
