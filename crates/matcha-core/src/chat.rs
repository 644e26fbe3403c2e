//! Chat log sink: every finished scene, in order, with its rendered event.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::action::{ActionError, ActionResult};
use crate::scene::{MessageScene, Scene, SceneBody};

const FIRST_MESSAGE_ID: i64 = 10_000;

/// Operator decision on a request scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Await,
    Agree,
    Refuse,
}

#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub scene: Scene,
    /// The wire event rendered for the scene, if the protocol has one.
    pub event: Option<Value>,
    /// Whether the event was pushed to the connected bot program.
    pub pushed: bool,
    pub recalled: bool,
    /// Set for request scenes only.
    pub action: Option<RequestAction>,
}

/// Append-only log of scenes.
pub struct ChatLog {
    entries: RwLock<Vec<ChatEntry>>,
    last_message_id: AtomicI64,
    updates: broadcast::Sender<ChatEntry>,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLog {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(Vec::new()),
            last_message_id: AtomicI64::new(FIRST_MESSAGE_ID),
            updates,
        }
    }

    /// Allocates the next message id.
    pub fn next_message_id(&self) -> i64 {
        self.last_message_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn append(&self, scene: Scene, event: Option<Value>, pushed: bool) {
        let action = matches!(scene.body, SceneBody::Request(_)).then_some(RequestAction::Await);
        let entry = ChatEntry {
            scene,
            event,
            pushed,
            recalled: false,
            action,
        };
        self.entries.write().push(entry.clone());
        // no subscribers is fine
        let _ = self.updates.send(entry);
    }

    /// Receives every entry appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEntry> {
        self.updates.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn entries(&self) -> Vec<ChatEntry> {
        self.entries.read().clone()
    }

    /// Entries whose talker is `chat_id`, or all entries.
    pub fn conversation(&self, chat_id: Option<&str>) -> Vec<ChatEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| chat_id.is_none_or(|id| e.scene.talker == id))
            .cloned()
            .collect()
    }

    pub fn find_message(&self, message_id: &str) -> Option<ChatEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| {
                matches!(&e.scene.body, SceneBody::Message(m) if m.fields().message_id == message_id)
            })
            .cloned()
    }

    pub fn find_message_scene(&self, message_id: &str) -> Option<MessageScene> {
        self.find_message(message_id).and_then(|e| match e.scene.body {
            SceneBody::Message(m) => Some(m),
            _ => None,
        })
    }

    /// Flags a message as recalled. Returns false if it is missing or already recalled.
    pub fn mark_recalled(&self, message_id: &str) -> bool {
        let mut entries = self.entries.write();
        let entry = entries.iter_mut().find(|e| {
            matches!(&e.scene.body, SceneBody::Message(m) if m.fields().message_id == message_id)
        });
        match entry {
            Some(e) if !e.recalled => {
                e.recalled = true;
                true
            }
            _ => false,
        }
    }

    /// Moves a pending request to `action` and returns its scene.
    pub fn resolve_request(&self, scene_id: &str, action: RequestAction) -> ActionResult<Scene> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.scene.id == scene_id && e.action.is_some())
            .ok_or_else(|| ActionError::not_found(format!("request {scene_id} not found")))?;
        if entry.action != Some(RequestAction::Await) {
            return Err(ActionError::bad_param(format!("request {scene_id} already handled")));
        }
        entry.action = Some(action);
        Ok(entry.scene.clone())
    }

    /// Puts a resolved request back to `Await`, for an approval that could not be applied.
    pub fn reopen_request(&self, scene_id: &str) {
        if let Some(entry) = self
            .entries
            .write()
            .iter_mut()
            .find(|e| e.scene.id == scene_id && e.action.is_some())
        {
            entry.action = Some(RequestAction::Await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{RequestScene, SceneSelf};

    fn request(id: &str) -> Scene {
        Scene {
            id: id.into(),
            time: 0,
            self_info: SceneSelf {
                platform: "matcha".into(),
                bot_id: "1".into(),
            },
            talker: "2".into(),
            body: SceneBody::Request(RequestScene::AddFriend {
                user_id: "2".into(),
                comment: String::new(),
            }),
        }
    }

    #[test]
    fn test_message_ids_increase_from_base() {
        let log = ChatLog::new();
        assert_eq!(log.next_message_id(), 10_001);
        assert_eq!(log.next_message_id(), 10_002);
    }

    #[test]
    fn test_request_resolves_once() {
        let log = ChatLog::new();
        log.append(request("r1"), None, false);
        assert_eq!(log.entries()[0].action, Some(RequestAction::Await));

        log.resolve_request("r1", RequestAction::Agree).unwrap();
        let again = log.resolve_request("r1", RequestAction::Refuse).unwrap_err();
        assert_eq!(again.kind, crate::action::ErrorKind::BadParam);
        assert!(log.resolve_request("nope", RequestAction::Agree).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_appends() {
        let log = ChatLog::new();
        let mut rx = log.subscribe();
        log.append(request("r1"), None, false);
        assert_eq!(rx.recv().await.unwrap().scene.id, "r1");
    }
}
