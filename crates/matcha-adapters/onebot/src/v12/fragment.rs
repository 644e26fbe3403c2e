//! Sessions of `upload_file_fragmented`.
//!
//! A session lives from `prepare` to `finish`. Sessions that stop making
//! progress expire after the configured TTL; expired sessions are swept on
//! the next access and their fragments discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use matcha_core::{ActionError, ActionResult, CacheFile, FileCache, FileSource};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct Session {
    name: String,
    total_size: u64,
    expires_at: Instant,
}

pub struct FragmentSessions {
    files: Arc<FileCache>,
    ttl: Duration,
    max_size: u64,
    sessions: Mutex<HashMap<String, Session>>,
}

impl FragmentSessions {
    pub fn new(files: Arc<FileCache>, ttl: Duration, max_size: u64) -> Self {
        Self {
            files,
            ttl,
            max_size,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut sessions = self.sessions.lock();
            let ids = sessions
                .iter()
                .filter(|(_, s)| s.expires_at <= now)
                .map(|(id, _)| id.clone())
                .collect::<Vec<_>>();
            for id in &ids {
                sessions.remove(id);
            }
            ids
        };
        for id in expired {
            debug!(file_id = %id, "Fragmented upload expired");
            if let Err(e) = self.files.discard_fragments(&id).await {
                warn!(file_id = %id, error = %e, "Failed to discard expired fragments");
            }
        }
    }

    /// Opens a session; its token doubles as the final file id.
    pub async fn prepare(&self, name: String, total_size: u64) -> ActionResult<String> {
        self.sweep().await;
        if total_size > self.max_size {
            return Err(ActionError::bad_param(format!(
                "total size {total_size} exceeds the limit of {} bytes",
                self.max_size
            )));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.lock().insert(
            id.clone(),
            Session {
                name,
                total_size,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(id)
    }

    pub async fn transfer(&self, id: &str, offset: u64, data: FileSource) -> ActionResult<()> {
        self.sweep().await;
        let total_size = self
            .sessions
            .lock()
            .get(id)
            .map(|s| s.total_size)
            .ok_or_else(|| ActionError::bad_param(format!("unknown upload session {id}")))?;
        let contents = self.files.bytes_of(data).await?;
        let end = offset.checked_add(contents.len() as u64);
        if end.is_none_or(|end| end > total_size) {
            return Err(ActionError::bad_param(format!(
                "fragment of {} bytes at offset {offset} overruns total size {total_size}",
                contents.len()
            )));
        }
        {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| ActionError::bad_param(format!("unknown upload session {id}")))?;
            session.expires_at = Instant::now() + self.ttl;
        }
        self.files
            .write_fragment(id, offset, FileSource::Bytes(contents))
            .await?;
        Ok(())
    }

    pub async fn finish(&self, id: &str, sha256: &str) -> ActionResult<CacheFile> {
        self.sweep().await;
        let session = self
            .sessions
            .lock()
            .remove(id)
            .ok_or_else(|| ActionError::bad_param(format!("unknown upload session {id}")))?;
        Ok(self
            .files
            .finish_fragments(id, &session.name, session.total_size, sha256)
            .await?)
    }
}
