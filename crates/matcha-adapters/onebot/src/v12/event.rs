//! OneBot v12 events.
//!
//! v12 is outbound only here: scenes are rendered, never parsed back. Ids
//! stay strings and every non-meta event carries `self`, filled in from the
//! active bot at render time.

use std::time::Duration;

use async_trait::async_trait;
use matcha_core::scene::{DecreaseKind, DeleteKind, IncreaseKind, MessageScene, NoticeScene};
use matcha_core::{
    CodecError, CodecResult, EventCodec, PLATFORM, Scene, SceneBody, build_message, unix_now,
};
use serde::Serialize;
use serde_json::Value;

use super::message::{Segment, V12MessageCodec};
use crate::common::{IMPL_NAME, IMPL_VERSION, OneBotContext};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSelf {
    pub platform: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub time: i64,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_info: Option<BotSelf>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Meta(MetaEvent),
    Message(MessageEvent),
    Notice(NoticeEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    #[serde(rename = "impl")]
    pub implementation: String,
    pub version: String,
    pub onebot_version: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            implementation: IMPL_NAME.to_owned(),
            version: IMPL_VERSION.to_owned(),
            onebot_version: "12".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    #[serde(rename = "self")]
    pub self_info: BotSelf,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub good: bool,
    pub bots: Vec<BotStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum MetaEvent {
    Connect {
        sub_type: String,
        version: VersionInfo,
    },
    StatusUpdate {
        sub_type: String,
        status: Status,
    },
    Heartbeat {
        sub_type: String,
        /// Milliseconds.
        interval: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum MessageEvent {
    Private {
        sub_type: String,
        message_id: String,
        message: Vec<Segment>,
        alt_message: String,
        user_id: String,
    },
    Group {
        sub_type: String,
        message_id: String,
        message: Vec<Segment>,
        alt_message: String,
        user_id: String,
        group_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum NoticeEvent {
    FriendIncrease {
        sub_type: String,
        user_id: String,
    },
    FriendDecrease {
        sub_type: String,
        user_id: String,
    },
    PrivateMessageDelete {
        sub_type: String,
        message_id: String,
        user_id: String,
    },
    GroupMemberIncrease {
        sub_type: String,
        group_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupMemberDecrease {
        sub_type: String,
        group_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupMessageDelete {
        sub_type: String,
        group_id: String,
        message_id: String,
        user_id: String,
        operator_id: String,
    },
}

/// Renders scenes and meta events in v12 shape.
#[derive(Clone)]
pub struct V12EventCodec {
    ctx: OneBotContext,
    messages: V12MessageCodec,
}

impl V12EventCodec {
    pub fn new(ctx: OneBotContext, messages: V12MessageCodec) -> Self {
        Self { ctx, messages }
    }

    pub fn bot_self(&self) -> BotSelf {
        BotSelf {
            platform: PLATFORM.to_owned(),
            user_id: self.ctx.bot_id(),
        }
    }

    pub fn status(&self) -> Status {
        let online = self.ctx.behav.bot().is_assigned();
        Status {
            good: online,
            bots: vec![BotStatus {
                self_info: self.bot_self(),
                online,
            }],
        }
    }

    fn meta(&self, meta: MetaEvent) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            time: unix_now(),
            self_info: None,
            kind: EventKind::Meta(meta),
        }
    }

    pub fn connect(&self) -> Event {
        self.meta(MetaEvent::Connect {
            sub_type: String::new(),
            version: VersionInfo::current(),
        })
    }

    pub fn status_update(&self) -> Event {
        self.meta(MetaEvent::StatusUpdate {
            sub_type: String::new(),
            status: self.status(),
        })
    }

    pub fn heartbeat(&self, interval: Duration) -> Event {
        self.meta(MetaEvent::Heartbeat {
            sub_type: String::new(),
            interval: interval.as_millis() as u64,
        })
    }

    async fn build_message_event(&self, message: &MessageScene) -> CodecResult<MessageEvent> {
        let fields = message.fields();
        let segments = build_message(&self.messages, &fields.message).await?;
        Ok(match message {
            MessageScene::Private(p) => MessageEvent::Private {
                sub_type: String::new(),
                message_id: fields.message_id.clone(),
                message: segments,
                alt_message: fields.plain_message.clone(),
                user_id: p.fields.user_id.clone(),
            },
            MessageScene::Group(g) => MessageEvent::Group {
                sub_type: String::new(),
                message_id: fields.message_id.clone(),
                message: segments,
                alt_message: fields.plain_message.clone(),
                user_id: g.fields.user_id.clone(),
                group_id: g.group_id.clone(),
            },
        })
    }

    fn build_notice_event(notice: &NoticeScene) -> Option<NoticeEvent> {
        Some(match notice {
            NoticeScene::FriendIncrease { user_id } => NoticeEvent::FriendIncrease {
                sub_type: String::new(),
                user_id: user_id.clone(),
            },
            NoticeScene::FriendDecrease { user_id } => NoticeEvent::FriendDecrease {
                sub_type: String::new(),
                user_id: user_id.clone(),
            },
            NoticeScene::PrivateMessageDelete {
                user_id,
                message_id,
            } => NoticeEvent::PrivateMessageDelete {
                sub_type: String::new(),
                message_id: message_id.clone(),
                user_id: user_id.clone(),
            },
            NoticeScene::GroupMemberIncrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
            } => NoticeEvent::GroupMemberIncrease {
                sub_type: match sub_type {
                    IncreaseKind::Join => "join",
                    IncreaseKind::Invite => "invite",
                }
                .to_owned(),
                group_id: group_id.clone(),
                user_id: user_id.clone(),
                operator_id: operator_id.clone(),
            },
            NoticeScene::GroupMemberDecrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
            } => NoticeEvent::GroupMemberDecrease {
                sub_type: match sub_type {
                    DecreaseKind::Leave => "leave",
                    DecreaseKind::Remove => "kick",
                }
                .to_owned(),
                group_id: group_id.clone(),
                user_id: user_id.clone(),
                operator_id: operator_id.clone(),
            },
            NoticeScene::GroupMessageDelete {
                sub_type,
                group_id,
                message_id,
                user_id,
                operator_id,
            } => NoticeEvent::GroupMessageDelete {
                sub_type: match sub_type {
                    DeleteKind::Recall => "recall",
                    DeleteKind::Delete => "delete",
                }
                .to_owned(),
                group_id: group_id.clone(),
                message_id: message_id.clone(),
                user_id: user_id.clone(),
                operator_id: operator_id.clone(),
            },
            _ => return None,
        })
    }

    /// Renders a scene; requests and most notices have no v12 event.
    pub async fn build(&self, scene: &Scene) -> CodecResult<Option<Event>> {
        let kind = match &scene.body {
            SceneBody::Message(m) => EventKind::Message(self.build_message_event(m).await?),
            SceneBody::Notice(n) => match Self::build_notice_event(n) {
                Some(notice) => EventKind::Notice(notice),
                None => return Ok(None),
            },
            SceneBody::Request(_) => return Ok(None),
        };
        Ok(Some(Event {
            id: scene.id.clone(),
            time: scene.time,
            self_info: Some(self.bot_self()),
            kind,
        }))
    }
}

#[async_trait]
impl EventCodec for V12EventCodec {
    async fn build_event(&self, scene: &Scene) -> CodecResult<Option<Value>> {
        match self.build(scene).await? {
            Some(event) => Ok(Some(serde_json::to_value(event).map_err(|e| {
                CodecError::Malformed(format!("event serialization: {e}"))
            })?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use matcha_core::{
        ActiveBot, Behav, BotIdentity, ChatLog, Content, FileCache, Group, Member, MemoryBlobs,
        MemoryStore, Role, Store, User,
    };
    use serde_json::json;

    use crate::config::OneBotConfig;

    async fn setup() -> (V12EventCodec, Arc<Behav>) {
        let store = Arc::new(MemoryStore::new());
        store.put_user(User::new("10000", "bot")).await.unwrap();
        store.put_user(User::new("10001", "alice")).await.unwrap();
        store.put_group(Group::new("123", "tea")).await.unwrap();
        store.put_member(Member::new("123", "10000", Role::Owner)).await.unwrap();
        store.put_member(Member::new("123", "10001", Role::Member)).await.unwrap();

        let bot = ActiveBot::new(Some(BotIdentity::new("10000", "bot")));
        let behav = Arc::new(Behav::new(store.clone(), Arc::new(ChatLog::new()), bot));
        let files = Arc::new(FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache"));
        let ctx = OneBotContext::new(behav.clone(), files.clone(), OneBotConfig::default());
        (V12EventCodec::new(ctx, V12MessageCodec::new(files)), behav)
    }

    #[tokio::test]
    async fn test_group_message_event() {
        let (codec, behav) = setup().await;
        let alice = behav.require_user("10001").await.unwrap();
        let group = behav.require_group("123").await.unwrap();
        let scene = behav
            .send_group_message(&alice, &group, vec![Content::text("hi"), Content::mention_all()], None, None)
            .await
            .unwrap();

        let event = codec.build_event(&scene).await.unwrap().unwrap();
        assert_eq!(event["type"], "message");
        assert_eq!(event["detail_type"], "group");
        assert_eq!(event["sub_type"], "");
        assert_eq!(event["group_id"], "123");
        assert_eq!(event["user_id"], "10001");
        assert_eq!(event["self"], json!({"platform": "matcha", "user_id": "10000"}));
        assert_eq!(event["message"][1], json!({"type": "mention_all", "data": {}}));
        assert_eq!(event["alt_message"], "hi@everyone");
    }

    #[tokio::test]
    async fn test_kick_renders_member_decrease() {
        let (codec, behav) = setup().await;
        let scene = behav.kick_member("123", "10001", "10000").await.unwrap();
        let event = codec.build_event(&scene).await.unwrap().unwrap();
        assert_eq!(event["type"], "notice");
        assert_eq!(event["detail_type"], "group_member_decrease");
        assert_eq!(event["sub_type"], "kick");
        assert_eq!(event["operator_id"], "10000");
    }

    #[tokio::test]
    async fn test_unrendered_scenes() {
        let (codec, behav) = setup().await;
        let ban = behav.set_member_ban("123", "10001", "10000", 60).await.unwrap();
        assert!(codec.build_event(&ban).await.unwrap().is_none());
        let request = behav.request_friend("10001", "hi").await.unwrap();
        assert!(codec.build_event(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_meta_events() {
        let (codec, _) = setup().await;
        let connect = serde_json::to_value(codec.connect()).unwrap();
        assert_eq!(connect["type"], "meta");
        assert_eq!(connect["detail_type"], "connect");
        assert_eq!(connect["version"]["impl"], "matcha");
        assert_eq!(connect["version"]["onebot_version"], "12");
        assert!(connect.get("self").is_none());

        let status = serde_json::to_value(codec.status_update()).unwrap();
        assert_eq!(status["status"]["bots"][0]["self"]["user_id"], "10000");
        assert_eq!(status["status"]["bots"][0]["online"], true);

        let heartbeat = serde_json::to_value(codec.heartbeat(Duration::from_secs(3))).unwrap();
        assert_eq!(heartbeat["interval"], 3000);
    }
}
