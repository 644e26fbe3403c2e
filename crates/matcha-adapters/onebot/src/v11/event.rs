//! OneBot v11 wire events and the scene ⇄ event strategies.
//!
//! # Hierarchy
//!
//! ```text
//! Event { time, self_id }
//! └── EventKind (post_type dispatch)
//!     ├── Message(MessageEvent)          private | group
//!     ├── Notice(NoticeEvent)            notice_type dispatch
//!     │   └── Notify(NotifyEvent)        poke | lucky_king | honor
//!     ├── Request(RequestEvent)          friend | group
//!     └── MetaEvent(MetaEvent)           lifecycle | heartbeat
//! ```
//!
//! Every id is rendered as a JSON number when it is numeric. `self_id` is
//! taken from the active bot when the event is rendered.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use matcha_core::scene::{
    AdminKind, AnonymousSender, BanKind, DecreaseKind, EssenceKind, GroupMessage,
    GroupMessageKind, IncreaseKind, MemberSnapshot, MessageFields, MessageScene, NoticeScene,
    PrivateKind, PrivateMessage, RequestScene, WholeBanKind,
};
use matcha_core::{
    CodecError, CodecResult, EventCodec, Role, Scene, SceneBody, build_message, parse_message,
    unix_now,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::V11MessageCodec;
use super::segment::{MessageBody, Segment, to_cq_string};
use crate::common::OneBotContext;
use crate::config::SegmentFormat;

// ============================================================================
// Identifiers
// ============================================================================

/// An id on the v11 wire: a number when it parses as one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Num(i64),
    Str(String),
}

impl Default for WireId {
    fn default() -> Self {
        WireId::Num(0)
    }
}

impl From<&str> for WireId {
    fn from(id: &str) -> Self {
        id.parse().map_or_else(|_| WireId::Str(id.to_owned()), WireId::Num)
    }
}

impl From<&String> for WireId {
    fn from(id: &String) -> Self {
        WireId::from(id.as_str())
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Num(n) => write!(f, "{n}"),
            WireId::Str(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Event (root)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: i64,
    pub self_id: WireId,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum EventKind {
    Message(MessageEvent),
    Notice(NoticeEvent),
    Request(RequestEvent),
    MetaEvent(MetaEvent),
}

// ============================================================================
// Message events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum MessageEvent {
    Private(PrivateMessageEvent),
    Group(GroupMessageEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateSubType {
    Friend,
    Group,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessageEvent {
    pub sub_type: PrivateSubType,
    pub message_id: WireId,
    pub user_id: WireId,
    pub message: MessageBody,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub font: i32,
    #[serde(default)]
    pub sender: Sender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSubType {
    Normal,
    Anonymous,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessageEvent {
    pub sub_type: GroupSubType,
    pub message_id: WireId,
    pub group_id: WireId,
    pub user_id: WireId,
    pub anonymous: Option<AnonymousInfo>,
    pub message: MessageBody,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub font: i32,
    #[serde(default)]
    pub sender: Sender,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousInfo {
    pub id: WireId,
    pub name: String,
    pub flag: String,
}

/// Sender profile; the group-only fields are absent for private messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: WireId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ============================================================================
// Notice events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice_type", rename_all = "snake_case")]
pub enum NoticeEvent {
    GroupUpload {
        group_id: WireId,
        user_id: WireId,
        file: UploadedFile,
    },
    GroupAdmin {
        sub_type: AdminSubType,
        group_id: WireId,
        user_id: WireId,
    },
    GroupDecrease {
        sub_type: DecreaseSubType,
        group_id: WireId,
        operator_id: WireId,
        user_id: WireId,
    },
    GroupIncrease {
        sub_type: IncreaseSubType,
        group_id: WireId,
        operator_id: WireId,
        user_id: WireId,
    },
    /// `user_id` 0 marks a whole-group ban.
    GroupBan {
        sub_type: BanSubType,
        group_id: WireId,
        operator_id: WireId,
        user_id: WireId,
        duration: i64,
    },
    FriendAdd {
        user_id: WireId,
    },
    GroupRecall {
        group_id: WireId,
        user_id: WireId,
        operator_id: WireId,
        message_id: WireId,
    },
    FriendRecall {
        user_id: WireId,
        message_id: WireId,
    },
    GroupCard {
        group_id: WireId,
        user_id: WireId,
        card_new: String,
        card_old: String,
    },
    OfflineFile {
        user_id: WireId,
        file: OfflineFileInfo,
    },
    Essence {
        sub_type: EssenceSubType,
        group_id: WireId,
        sender_id: WireId,
        operator_id: WireId,
        message_id: WireId,
    },
    Notify(NotifyEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum NotifyEvent {
    Poke {
        /// Absent for a friend poke.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<WireId>,
        user_id: WireId,
        target_id: WireId,
    },
    LuckyKing {
        group_id: WireId,
        user_id: WireId,
        target_id: WireId,
    },
    Honor {
        group_id: WireId,
        honor_type: String,
        user_id: WireId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminSubType {
    Set,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanSubType {
    Ban,
    LiftBan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncreaseSubType {
    Approve,
    Invite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecreaseSubType {
    Leave,
    Kick,
    KickMe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EssenceSubType {
    Add,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub busid: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineFileInfo {
    pub name: String,
    pub size: u64,
    pub url: String,
}

// ============================================================================
// Request events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum RequestEvent {
    Friend {
        user_id: WireId,
        #[serde(default)]
        comment: String,
        flag: String,
    },
    Group {
        sub_type: GroupRequestSubType,
        group_id: WireId,
        user_id: WireId,
        #[serde(default)]
        comment: String,
        flag: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invitor_id: Option<WireId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRequestSubType {
    Add,
    Invite,
}

// ============================================================================
// Meta events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "meta_event_type", rename_all = "snake_case")]
pub enum MetaEvent {
    Lifecycle { sub_type: LifecycleSubType },
    Heartbeat { status: HeartbeatStatus, interval: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSubType {
    Enable,
    Disable,
    Connect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub online: bool,
    pub good: bool,
}

// ============================================================================
// Codec
// ============================================================================

/// Renders scenes as v11 events and reads message/request events back.
#[derive(Clone)]
pub struct V11EventCodec {
    ctx: OneBotContext,
    messages: V11MessageCodec,
}

impl V11EventCodec {
    pub fn new(ctx: OneBotContext, messages: V11MessageCodec) -> Self {
        Self { ctx, messages }
    }

    fn event(&self, time: i64, kind: EventKind) -> Event {
        Event {
            time,
            self_id: WireId::from(self.ctx.bot_id().as_str()),
            kind,
        }
    }

    pub fn lifecycle(&self) -> Event {
        self.event(
            unix_now(),
            EventKind::MetaEvent(MetaEvent::Lifecycle {
                sub_type: LifecycleSubType::Connect,
            }),
        )
    }

    /// `interval` is reported in milliseconds.
    pub fn heartbeat(&self, interval: Duration) -> Event {
        self.event(
            unix_now(),
            EventKind::MetaEvent(MetaEvent::Heartbeat {
                status: HeartbeatStatus {
                    online: true,
                    good: true,
                },
                interval: interval.as_millis() as u64,
            }),
        )
    }

    /// The segments a bot submitted are preferred over a rebuild from content.
    pub(crate) async fn message_body(&self, fields: &MessageFields) -> CodecResult<MessageBody> {
        let segments = match fields
            .original_message
            .clone()
            .and_then(|v| serde_json::from_value::<Vec<Segment>>(v).ok())
        {
            Some(segments) => segments,
            None => build_message(&self.messages, &fields.message).await?,
        };
        Ok(match self.ctx.config.message_format {
            SegmentFormat::Array => MessageBody::Segments(segments),
            SegmentFormat::String => MessageBody::Text(to_cq_string(&segments)),
        })
    }

    pub(crate) async fn sender(&self, fields: &MessageFields) -> CodecResult<Sender> {
        let user = self.ctx.behav.store().user(&fields.user_id).await?;
        let (sex, age) = user.map_or(("unknown".to_owned(), 0), |u| {
            (u.sex.as_str().to_owned(), u.age(unix_now()))
        });
        Ok(Sender {
            user_id: WireId::from(&fields.user_id),
            nickname: fields.user_name.clone(),
            sex,
            age,
            ..Default::default()
        })
    }

    async fn build_message_event(&self, message: &MessageScene) -> CodecResult<MessageEvent> {
        Ok(match message {
            MessageScene::Private(p) => MessageEvent::Private(PrivateMessageEvent {
                sub_type: match p.sub_type {
                    PrivateKind::Friend => PrivateSubType::Friend,
                    PrivateKind::Group => PrivateSubType::Group,
                    PrivateKind::Temp => PrivateSubType::Other,
                },
                message_id: WireId::from(&p.fields.message_id),
                user_id: WireId::from(&p.fields.user_id),
                message: self.message_body(&p.fields).await?,
                raw_message: p.fields.plain_message.clone(),
                font: 0,
                sender: self.sender(&p.fields).await?,
            }),
            MessageScene::Group(g) => {
                let sender = Sender {
                    card: Some(g.member.card.clone()),
                    area: Some(String::new()),
                    level: Some(g.member.level.to_string()),
                    role: Some(g.member.role),
                    title: Some(g.member.title.clone()),
                    ..self.sender(&g.fields).await?
                };
                MessageEvent::Group(GroupMessageEvent {
                    sub_type: match g.sub_type {
                        GroupMessageKind::Normal => GroupSubType::Normal,
                        GroupMessageKind::Anonymous => GroupSubType::Anonymous,
                    },
                    message_id: WireId::from(&g.fields.message_id),
                    group_id: WireId::from(&g.group_id),
                    user_id: WireId::from(&g.fields.user_id),
                    anonymous: g.anonymous.as_ref().map(|a| AnonymousInfo {
                        id: WireId::from(&a.id),
                        name: a.name.clone(),
                        flag: a.id.clone(),
                    }),
                    message: self.message_body(&g.fields).await?,
                    raw_message: g.fields.plain_message.clone(),
                    font: 0,
                    sender,
                })
            }
        })
    }

    fn build_notice_event(&self, notice: &NoticeScene) -> Option<NoticeEvent> {
        let id = WireId::from;
        Some(match notice {
            NoticeScene::FriendIncrease { user_id } => NoticeEvent::FriendAdd { user_id: id(user_id) },
            NoticeScene::PrivateMessageDelete {
                user_id,
                message_id,
            } => NoticeEvent::FriendRecall {
                user_id: id(user_id),
                message_id: id(message_id),
            },
            NoticeScene::FriendPoke { user_id, target_id } => {
                NoticeEvent::Notify(NotifyEvent::Poke {
                    group_id: None,
                    user_id: id(user_id),
                    target_id: id(target_id),
                })
            }
            NoticeScene::OfflineFile { user_id, file } => NoticeEvent::OfflineFile {
                user_id: id(user_id),
                file: OfflineFileInfo {
                    name: file.name.clone(),
                    size: file.size,
                    url: file.url.clone().unwrap_or_default(),
                },
            },
            NoticeScene::GroupMemberIncrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
            } => NoticeEvent::GroupIncrease {
                sub_type: match sub_type {
                    IncreaseKind::Join => IncreaseSubType::Approve,
                    IncreaseKind::Invite => IncreaseSubType::Invite,
                },
                group_id: id(group_id),
                operator_id: id(operator_id),
                user_id: id(user_id),
            },
            NoticeScene::GroupMemberDecrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
            } => NoticeEvent::GroupDecrease {
                sub_type: match sub_type {
                    DecreaseKind::Leave => DecreaseSubType::Leave,
                    DecreaseKind::Remove if *user_id == self.ctx.bot_id() => DecreaseSubType::KickMe,
                    DecreaseKind::Remove => DecreaseSubType::Kick,
                },
                group_id: id(group_id),
                operator_id: id(operator_id),
                user_id: id(user_id),
            },
            NoticeScene::GroupMessageDelete {
                group_id,
                message_id,
                user_id,
                operator_id,
                ..
            } => NoticeEvent::GroupRecall {
                group_id: id(group_id),
                user_id: id(user_id),
                operator_id: id(operator_id),
                message_id: id(message_id),
            },
            NoticeScene::GroupPoke {
                group_id,
                user_id,
                target_id,
            } => NoticeEvent::Notify(NotifyEvent::Poke {
                group_id: Some(id(group_id)),
                user_id: id(user_id),
                target_id: id(target_id),
            }),
            NoticeScene::GroupAdmin {
                sub_type,
                group_id,
                user_id,
                ..
            } => NoticeEvent::GroupAdmin {
                sub_type: match sub_type {
                    AdminKind::Set => AdminSubType::Set,
                    AdminKind::Unset => AdminSubType::Unset,
                },
                group_id: id(group_id),
                user_id: id(user_id),
            },
            NoticeScene::GroupMemberBan {
                sub_type,
                group_id,
                user_id,
                operator_id,
                duration,
            } => NoticeEvent::GroupBan {
                sub_type: match sub_type {
                    BanKind::Ban => BanSubType::Ban,
                    BanKind::LiftBan => BanSubType::LiftBan,
                },
                group_id: id(group_id),
                operator_id: id(operator_id),
                user_id: id(user_id),
                duration: duration.unwrap_or(0),
            },
            NoticeScene::GroupWholeBan {
                sub_type,
                group_id,
                operator_id,
            } => NoticeEvent::GroupBan {
                sub_type: match sub_type {
                    WholeBanKind::Open => BanSubType::Ban,
                    WholeBanKind::Close => BanSubType::LiftBan,
                },
                group_id: id(group_id),
                operator_id: id(operator_id),
                user_id: WireId::Num(0),
                duration: match sub_type {
                    WholeBanKind::Open => -1,
                    WholeBanKind::Close => 0,
                },
            },
            NoticeScene::GroupMemberCard {
                group_id,
                user_id,
                card,
                old_card,
                ..
            } => NoticeEvent::GroupCard {
                group_id: id(group_id),
                user_id: id(user_id),
                card_new: card.clone(),
                card_old: old_card.clone(),
            },
            NoticeScene::GroupMemberHonor {
                group_id,
                user_id,
                honor,
            } => NoticeEvent::Notify(NotifyEvent::Honor {
                group_id: id(group_id),
                honor_type: honor.as_str().to_owned(),
                user_id: id(user_id),
            }),
            NoticeScene::GroupEssence {
                sub_type,
                group_id,
                message_id,
                user_id,
                operator_id,
            } => NoticeEvent::Essence {
                sub_type: match sub_type {
                    EssenceKind::Add => EssenceSubType::Add,
                    EssenceKind::Remove => EssenceSubType::Delete,
                },
                group_id: id(group_id),
                sender_id: id(user_id),
                operator_id: id(operator_id),
                message_id: id(message_id),
            },
            NoticeScene::GroupHongbaoLucky {
                group_id,
                user_id,
                target_id,
            } => NoticeEvent::Notify(NotifyEvent::LuckyKing {
                group_id: id(group_id),
                user_id: id(user_id),
                target_id: id(target_id),
            }),
            NoticeScene::GroupFileUpload {
                group_id,
                user_id,
                file,
            } => NoticeEvent::GroupUpload {
                group_id: id(group_id),
                user_id: id(user_id),
                file: UploadedFile {
                    id: file.id.clone(),
                    name: file.name.clone(),
                    size: file.size,
                    busid: 0,
                },
            },
            NoticeScene::FriendDecrease { .. }
            | NoticeScene::GroupAnonymous { .. }
            | NoticeScene::GroupName { .. }
            | NoticeScene::GroupMemberTitle { .. } => return None,
        })
    }

    fn build_request_event(scene: &Scene, request: &RequestScene) -> RequestEvent {
        match request {
            RequestScene::AddFriend { user_id, comment } => RequestEvent::Friend {
                user_id: WireId::from(user_id),
                comment: comment.clone(),
                flag: scene.id.clone(),
            },
            RequestScene::JoinGroup {
                group_id,
                user_id,
                invitor_id,
                comment,
            } => RequestEvent::Group {
                sub_type: GroupRequestSubType::Add,
                group_id: WireId::from(group_id),
                user_id: WireId::from(user_id),
                comment: comment.clone(),
                flag: scene.id.clone(),
                invitor_id: invitor_id.as_ref().map(WireId::from),
            },
            RequestScene::GroupInvite {
                group_id,
                invitor_id,
                ..
            } => RequestEvent::Group {
                sub_type: GroupRequestSubType::Invite,
                group_id: WireId::from(group_id),
                user_id: WireId::from(invitor_id),
                comment: String::new(),
                flag: scene.id.clone(),
                invitor_id: None,
            },
        }
    }

    /// Renders a scene; `None` when v11 has no such event.
    pub async fn build(&self, scene: &Scene) -> CodecResult<Option<Event>> {
        let kind = match &scene.body {
            SceneBody::Message(m) => EventKind::Message(self.build_message_event(m).await?),
            SceneBody::Notice(n) => match self.build_notice_event(n) {
                Some(notice) => EventKind::Notice(notice),
                None => return Ok(None),
            },
            SceneBody::Request(r) => EventKind::Request(Self::build_request_event(scene, r)),
        };
        Ok(Some(self.event(scene.time, kind)))
    }

    /// Reads a message or request event back into a scene.
    ///
    /// A request scene keeps the event's `flag` as its id so that it can be
    /// resolved later. Other event kinds yield `None`.
    pub async fn parse(&self, event: &Event) -> CodecResult<Option<Scene>> {
        let behav = &self.ctx.behav;
        let (talker, body) = match &event.kind {
            EventKind::Message(MessageEvent::Private(p)) => {
                let fields = self
                    .parse_fields(&p.message_id, &p.user_id, &p.sender, &p.message, &p.raw_message)
                    .await?;
                (
                    fields.user_id.clone(),
                    SceneBody::Message(MessageScene::Private(PrivateMessage {
                        sub_type: match p.sub_type {
                            PrivateSubType::Friend => PrivateKind::Friend,
                            PrivateSubType::Group => PrivateKind::Group,
                            PrivateSubType::Other => PrivateKind::Temp,
                        },
                        target_id: event.self_id.to_string(),
                        fields,
                    })),
                )
            }
            EventKind::Message(MessageEvent::Group(g)) => {
                let fields = self
                    .parse_fields(&g.message_id, &g.user_id, &g.sender, &g.message, &g.raw_message)
                    .await?;
                let group_id = g.group_id.to_string();
                let group_name = behav
                    .store()
                    .group(&group_id)
                    .await?
                    .map(|group| group.name)
                    .unwrap_or_default();
                (
                    group_id.clone(),
                    SceneBody::Message(MessageScene::Group(GroupMessage {
                        sub_type: match g.sub_type {
                            GroupSubType::Anonymous => GroupMessageKind::Anonymous,
                            GroupSubType::Normal | GroupSubType::Notice => GroupMessageKind::Normal,
                        },
                        group_id,
                        group_name,
                        anonymous: g.anonymous.as_ref().map(|a| AnonymousSender {
                            id: a.id.to_string(),
                            name: a.name.clone(),
                        }),
                        member: MemberSnapshot {
                            card: g.sender.card.clone().unwrap_or_default(),
                            role: g.sender.role.unwrap_or_default(),
                            level: g
                                .sender
                                .level
                                .as_deref()
                                .and_then(|l| l.parse().ok())
                                .unwrap_or(0),
                            title: g.sender.title.clone().unwrap_or_default(),
                        },
                        fields,
                    })),
                )
            }
            EventKind::Request(RequestEvent::Friend {
                user_id, comment, ..
            }) => (
                user_id.to_string(),
                SceneBody::Request(RequestScene::AddFriend {
                    user_id: user_id.to_string(),
                    comment: comment.clone(),
                }),
            ),
            EventKind::Request(RequestEvent::Group {
                sub_type,
                group_id,
                user_id,
                comment,
                invitor_id,
                ..
            }) => (
                group_id.to_string(),
                SceneBody::Request(match sub_type {
                    GroupRequestSubType::Add => RequestScene::JoinGroup {
                        group_id: group_id.to_string(),
                        user_id: user_id.to_string(),
                        invitor_id: invitor_id.as_ref().map(ToString::to_string),
                        comment: comment.clone(),
                    },
                    GroupRequestSubType::Invite => RequestScene::GroupInvite {
                        group_id: group_id.to_string(),
                        user_id: user_id.to_string(),
                        invitor_id: user_id.to_string(),
                    },
                }),
            ),
            EventKind::Notice(_) | EventKind::MetaEvent(_) => return Ok(None),
        };
        let mut scene = behav.create_scene(talker, body);
        scene.time = event.time;
        if let EventKind::Request(
            RequestEvent::Friend { flag, .. } | RequestEvent::Group { flag, .. },
        ) = &event.kind
        {
            scene.id = flag.clone();
        }
        Ok(Some(scene))
    }

    async fn parse_fields(
        &self,
        message_id: &WireId,
        user_id: &WireId,
        sender: &Sender,
        message: &MessageBody,
        raw_message: &str,
    ) -> CodecResult<MessageFields> {
        let segments = message.clone().into_segments(false);
        Ok(MessageFields {
            message_id: message_id.to_string(),
            message: parse_message(&self.messages, &segments).await?,
            original_message: None,
            plain_message: raw_message.to_owned(),
            user_id: user_id.to_string(),
            user_name: sender.nickname.clone(),
        })
    }
}

#[async_trait]
impl EventCodec for V11EventCodec {
    async fn build_event(&self, scene: &Scene) -> CodecResult<Option<Value>> {
        Ok(match self.build(scene).await? {
            Some(event) => Some(
                serde_json::to_value(event)
                    .map_err(|e| CodecError::Malformed(format!("event serialization: {e}")))?,
            ),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use matcha_core::{
        ActiveBot, Behav, BotIdentity, ChatLog, Content, FileCache, Group, Member, MemoryBlobs,
        MemoryStore, Store, User,
    };
    use serde_json::json;

    use crate::config::OneBotConfig;

    async fn setup(format: SegmentFormat) -> (V11EventCodec, Arc<Behav>) {
        let store = Arc::new(MemoryStore::new());
        store.put_user(User::new("10000", "bot")).await.unwrap();
        store.put_user(User::new("10001", "alice")).await.unwrap();
        store.put_group(Group::new("123", "tea")).await.unwrap();
        store.put_member(Member::new("123", "10000", Role::Owner)).await.unwrap();
        store.put_member(Member::new("123", "10001", Role::Member)).await.unwrap();

        let bot = ActiveBot::new(Some(BotIdentity::new("10000", "bot")));
        let behav = Arc::new(Behav::new(store.clone(), Arc::new(ChatLog::new()), bot));
        let files = Arc::new(FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache"));
        let config = OneBotConfig {
            message_format: format,
            ..Default::default()
        };
        let ctx = OneBotContext::new(behav.clone(), files.clone(), config);
        (V11EventCodec::new(ctx, V11MessageCodec::new(files)), behav)
    }

    #[tokio::test]
    async fn test_group_message_event() {
        let (codec, behav) = setup(SegmentFormat::Array).await;
        let alice = behav.require_user("10001").await.unwrap();
        let group = behav.require_group("123").await.unwrap();
        let scene = behav
            .send_group_message(&alice, &group, vec![Content::text("hi")], None, None)
            .await
            .unwrap();

        let event = codec.build_event(&scene).await.unwrap().unwrap();
        assert_eq!(event["post_type"], "message");
        assert_eq!(event["message_type"], "group");
        assert_eq!(event["self_id"], 10000);
        assert_eq!(event["group_id"], 123);
        assert_eq!(event["anonymous"], Value::Null);
        assert_eq!(event["font"], 0);
        assert_eq!(event["sender"]["role"], "member");
        assert_eq!(event["sender"]["sex"], "unknown");
        assert_eq!(event["message"], json!([{"type": "text", "data": {"text": "hi"}}]));
    }

    #[tokio::test]
    async fn test_self_id_follows_active_bot() {
        let (codec, behav) = setup(SegmentFormat::Array).await;
        let scene = behav.request_friend("10001", "hello").await.unwrap();
        behav.bot().assign(Some(BotIdentity::new("20000", "other")));

        let event = codec.build_event(&scene).await.unwrap().unwrap();
        assert_eq!(event["self_id"], 20000);
        assert_eq!(event["request_type"], "friend");
        assert_eq!(event["flag"], json!(scene.id));
    }

    #[tokio::test]
    async fn test_string_message_format() {
        let (codec, behav) = setup(SegmentFormat::String).await;
        let alice = behav.require_user("10001").await.unwrap();
        let bot = behav.require_user("10000").await.unwrap();
        let scene = behav
            .send_private_message(&alice, &bot, vec![Content::text("a"), Content::mention("10000")], None)
            .await
            .unwrap();

        let event = codec.build_event(&scene).await.unwrap().unwrap();
        assert_eq!(event["sub_type"], "group");
        assert_eq!(event["message"], "a[CQ:at,qq=10000]");
    }

    #[tokio::test]
    async fn test_notice_mapping() {
        let (codec, behav) = setup(SegmentFormat::Array).await;
        let kicked = behav.kick_member("123", "10001", "10000").await.unwrap();
        let event = codec.build_event(&kicked).await.unwrap().unwrap();
        assert_eq!(event["notice_type"], "group_decrease");
        assert_eq!(event["sub_type"], "kick");

        let whole = behav.set_whole_ban("123", "10000", true).await.unwrap();
        let event = codec.build_event(&whole).await.unwrap().unwrap();
        assert_eq!(event["notice_type"], "group_ban");
        assert_eq!(event["user_id"], 0);

        let renamed = behav.rename_group("123", "10000", "coffee").await.unwrap();
        assert!(codec.build_event(&renamed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_maps_other_to_temp() {
        let (codec, _) = setup(SegmentFormat::Array).await;
        let event: Event = serde_json::from_value(json!({
            "time": 1,
            "self_id": 10000,
            "post_type": "message",
            "message_type": "private",
            "sub_type": "other",
            "message_id": 10001,
            "user_id": 10002,
            "message": "hello",
            "sender": {"user_id": 10002, "nickname": "bob"}
        }))
        .unwrap();

        let scene = codec.parse(&event).await.unwrap().unwrap();
        let Some(MessageScene::Private(p)) = scene.as_message() else {
            panic!("expected private message");
        };
        assert_eq!(p.sub_type, PrivateKind::Temp);
        assert_eq!(p.fields.user_id, "10002");
        assert_eq!(p.fields.message, vec![Content::text("hello")]);
        assert_eq!(scene.time, 1);
    }

    #[tokio::test]
    async fn test_parse_request_keeps_flag() {
        let (codec, _) = setup(SegmentFormat::Array).await;
        let event: Event = serde_json::from_value(json!({
            "time": 1,
            "self_id": 10000,
            "post_type": "request",
            "request_type": "group",
            "sub_type": "add",
            "group_id": 123,
            "user_id": 10002,
            "comment": "let me in",
            "flag": "abc"
        }))
        .unwrap();

        let scene = codec.parse(&event).await.unwrap().unwrap();
        assert_eq!(scene.id, "abc");
        assert!(matches!(scene.as_request(), Some(RequestScene::JoinGroup { .. })));
    }

    #[test]
    fn test_heartbeat_shape() {
        let event = Event {
            time: 5,
            self_id: WireId::from("10000"),
            kind: EventKind::MetaEvent(MetaEvent::Heartbeat {
                status: HeartbeatStatus {
                    online: true,
                    good: true,
                },
                interval: 3000,
            }),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "time": 5,
                "self_id": 10000,
                "post_type": "meta_event",
                "meta_event_type": "heartbeat",
                "status": {"online": true, "good": true},
                "interval": 3000
            })
        );
    }
}
