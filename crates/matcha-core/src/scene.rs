//! Canonical, protocol-agnostic records of things that happened.
//!
//! # Hierarchy
//!
//! ```text
//! Scene { id, time, self, talker }
//! └── SceneBody (type dispatch)
//!     ├── Message(MessageScene)   detail_type: private | group
//!     ├── Notice(NoticeScene)     detail_type: friend_increase | group_member_ban | ...
//!     └── Request(RequestScene)   detail_type: add_friend | join_group | group_invite
//! ```
//!
//! A scene is rendered at most once per protocol by the active event codec.
//! Its `self` block records who was logged in when it was created; codecs
//! ignore it and stamp the bot identity that is active at render time.

use serde::Serialize;
use serde_json::Value;

use crate::content::Content;
use crate::store::Role;

/// Platform name stamped on every scene.
pub const PLATFORM: &str = "matcha";

// ============================================================================
// Scene (root)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    /// Opaque unique token.
    pub id: String,
    /// Unix seconds.
    pub time: i64,
    #[serde(rename = "self")]
    pub self_info: SceneSelf,
    /// Which conversation this scene belongs to, for display.
    pub talker: String,
    #[serde(flatten)]
    pub body: SceneBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSelf {
    pub platform: String,
    pub bot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneBody {
    Message(MessageScene),
    Notice(NoticeScene),
    Request(RequestScene),
}

/// Coarse scene classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneType {
    Message,
    Notice,
    Request,
}

impl SceneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Request => "request",
        }
    }
}

impl Scene {
    pub fn scene_type(&self) -> SceneType {
        match self.body {
            SceneBody::Message(_) => SceneType::Message,
            SceneBody::Notice(_) => SceneType::Notice,
            SceneBody::Request(_) => SceneType::Request,
        }
    }

    pub fn detail_type(&self) -> &'static str {
        match &self.body {
            SceneBody::Message(m) => m.detail_type(),
            SceneBody::Notice(n) => n.detail_type(),
            SceneBody::Request(r) => r.detail_type(),
        }
    }

    /// Composite key such as `message.group` or `notice.group_member_ban`.
    pub fn key(&self) -> String {
        join_key(&[self.scene_type().as_str(), self.detail_type()])
    }

    /// The user whose action produced this scene.
    pub fn actor_id(&self) -> Option<&str> {
        match &self.body {
            SceneBody::Message(m) => Some(&m.fields().user_id),
            SceneBody::Notice(n) => n.actor_id(),
            SceneBody::Request(r) => Some(r.user_id()),
        }
    }

    pub fn as_message(&self) -> Option<&MessageScene> {
        match &self.body {
            SceneBody::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_notice(&self) -> Option<&NoticeScene> {
        match &self.body {
            SceneBody::Notice(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestScene> {
        match &self.body {
            SceneBody::Request(r) => Some(r),
            _ => None,
        }
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Joins the non-empty parts with `.`.
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

// ============================================================================
// Message scenes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum MessageScene {
    Private(PrivateMessage),
    Group(GroupMessage),
}

impl MessageScene {
    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::Private(_) => "private",
            Self::Group(_) => "group",
        }
    }

    pub fn fields(&self) -> &MessageFields {
        match self {
            Self::Private(p) => &p.fields,
            Self::Group(g) => &g.fields,
        }
    }
}

/// Fields shared by every message scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageFields {
    pub message_id: String,
    pub message: Vec<Content>,
    /// Wire segments as the sending bot submitted them, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message: Option<Value>,
    pub plain_message: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateKind {
    Friend,
    Group,
    Temp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateMessage {
    pub sub_type: PrivateKind,
    /// Receiving user.
    pub target_id: String,
    #[serde(flatten)]
    pub fields: MessageFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMessageKind {
    Normal,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnonymousSender {
    pub id: String,
    pub name: String,
}

/// Membership snapshot taken when the message was sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSnapshot {
    pub card: String,
    pub role: Role,
    pub level: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMessage {
    pub sub_type: GroupMessageKind,
    pub group_id: String,
    pub group_name: String,
    pub anonymous: Option<AnonymousSender>,
    pub member: MemberSnapshot,
    #[serde(flatten)]
    pub fields: MessageFields,
}

// ============================================================================
// Notice scenes
// ============================================================================

/// File descriptor attached to upload notices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncreaseKind {
    Join,
    Invite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecreaseKind {
    Leave,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteKind {
    Recall,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminKind {
    Set,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BanKind {
    Ban,
    LiftBan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WholeBanKind {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousKind {
    Allow,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HonorKind {
    Talkative,
    Performer,
    Emotion,
}

impl HonorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Talkative => "talkative",
            Self::Performer => "performer",
            Self::Emotion => "emotion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EssenceKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum NoticeScene {
    FriendIncrease {
        user_id: String,
    },
    FriendDecrease {
        user_id: String,
    },
    PrivateMessageDelete {
        user_id: String,
        message_id: String,
    },
    FriendPoke {
        user_id: String,
        target_id: String,
    },
    OfflineFile {
        user_id: String,
        file: SceneFile,
    },
    GroupMemberIncrease {
        sub_type: IncreaseKind,
        group_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupMemberDecrease {
        sub_type: DecreaseKind,
        group_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupMessageDelete {
        sub_type: DeleteKind,
        group_id: String,
        message_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupPoke {
        group_id: String,
        user_id: String,
        target_id: String,
    },
    GroupAdmin {
        sub_type: AdminKind,
        group_id: String,
        user_id: String,
        operator_id: String,
    },
    GroupMemberBan {
        sub_type: BanKind,
        group_id: String,
        user_id: String,
        operator_id: String,
        /// Seconds; absent when lifting.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<i64>,
    },
    GroupWholeBan {
        sub_type: WholeBanKind,
        group_id: String,
        operator_id: String,
    },
    GroupAnonymous {
        sub_type: AnonymousKind,
        group_id: String,
        operator_id: String,
    },
    GroupName {
        group_id: String,
        operator_id: String,
        name: String,
    },
    GroupMemberCard {
        group_id: String,
        user_id: String,
        operator_id: String,
        card: String,
        /// Card before the change.
        old_card: String,
    },
    GroupMemberTitle {
        group_id: String,
        user_id: String,
        operator_id: String,
        title: String,
    },
    GroupMemberHonor {
        group_id: String,
        user_id: String,
        honor: HonorKind,
    },
    GroupEssence {
        sub_type: EssenceKind,
        group_id: String,
        message_id: String,
        /// Author of the message.
        user_id: String,
        operator_id: String,
    },
    GroupHongbaoLucky {
        group_id: String,
        user_id: String,
        target_id: String,
    },
    GroupFileUpload {
        group_id: String,
        user_id: String,
        file: SceneFile,
    },
}

impl NoticeScene {
    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::FriendIncrease { .. } => "friend_increase",
            Self::FriendDecrease { .. } => "friend_decrease",
            Self::PrivateMessageDelete { .. } => "private_message_delete",
            Self::FriendPoke { .. } => "friend_poke",
            Self::OfflineFile { .. } => "offline_file",
            Self::GroupMemberIncrease { .. } => "group_member_increase",
            Self::GroupMemberDecrease { .. } => "group_member_decrease",
            Self::GroupMessageDelete { .. } => "group_message_delete",
            Self::GroupPoke { .. } => "group_poke",
            Self::GroupAdmin { .. } => "group_admin",
            Self::GroupMemberBan { .. } => "group_member_ban",
            Self::GroupWholeBan { .. } => "group_whole_ban",
            Self::GroupAnonymous { .. } => "group_anonymous",
            Self::GroupName { .. } => "group_name",
            Self::GroupMemberCard { .. } => "group_member_card",
            Self::GroupMemberTitle { .. } => "group_member_title",
            Self::GroupMemberHonor { .. } => "group_member_honor",
            Self::GroupEssence { .. } => "group_essence",
            Self::GroupHongbaoLucky { .. } => "group_hongbao_lucky",
            Self::GroupFileUpload { .. } => "group_file_upload",
        }
    }

    /// Who caused the notice: the operator when there is one, else the subject.
    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Self::GroupMemberIncrease { operator_id, .. }
            | Self::GroupMemberDecrease { operator_id, .. }
            | Self::GroupMessageDelete { operator_id, .. }
            | Self::GroupAdmin { operator_id, .. }
            | Self::GroupMemberBan { operator_id, .. }
            | Self::GroupWholeBan { operator_id, .. }
            | Self::GroupAnonymous { operator_id, .. }
            | Self::GroupName { operator_id, .. }
            | Self::GroupMemberCard { operator_id, .. }
            | Self::GroupMemberTitle { operator_id, .. }
            | Self::GroupEssence { operator_id, .. } => Some(operator_id),
            Self::FriendIncrease { user_id }
            | Self::FriendDecrease { user_id }
            | Self::PrivateMessageDelete { user_id, .. }
            | Self::FriendPoke { user_id, .. }
            | Self::OfflineFile { user_id, .. }
            | Self::GroupPoke { user_id, .. }
            | Self::GroupMemberHonor { user_id, .. }
            | Self::GroupHongbaoLucky { user_id, .. }
            | Self::GroupFileUpload { user_id, .. } => Some(user_id),
        }
    }
}

// ============================================================================
// Request scenes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum RequestScene {
    AddFriend {
        user_id: String,
        comment: String,
    },
    JoinGroup {
        group_id: String,
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        invitor_id: Option<String>,
        comment: String,
    },
    GroupInvite {
        group_id: String,
        user_id: String,
        invitor_id: String,
    },
}

impl RequestScene {
    pub fn detail_type(&self) -> &'static str {
        match self {
            Self::AddFriend { .. } => "add_friend",
            Self::JoinGroup { .. } => "join_group",
            Self::GroupInvite { .. } => "group_invite",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::AddFriend { user_id, .. }
            | Self::JoinGroup { user_id, .. }
            | Self::GroupInvite { user_id, .. } => user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene(body: SceneBody) -> Scene {
        Scene {
            id: "s-1".into(),
            time: 1_700_000_000,
            self_info: SceneSelf {
                platform: PLATFORM.into(),
                bot_id: "10000".into(),
            },
            talker: "123".into(),
            body,
        }
    }

    #[test]
    fn test_key_construction() {
        let ban = scene(SceneBody::Notice(NoticeScene::GroupMemberBan {
            sub_type: BanKind::Ban,
            group_id: "123".into(),
            user_id: "2".into(),
            operator_id: "1".into(),
            duration: Some(60),
        }));
        assert_eq!(ban.key(), "notice.group_member_ban");
        assert_eq!(ban.actor_id(), Some("1"));
        assert_eq!(join_key(&["message", "", "group"]), "message.group");
    }

    #[test]
    fn test_serialized_shape() {
        let request = scene(SceneBody::Request(RequestScene::AddFriend {
            user_id: "2".into(),
            comment: "hi".into(),
        }));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], json!("request"));
        assert_eq!(value["detail_type"], json!("add_friend"));
        assert_eq!(value["self"]["bot_id"], json!("10000"));
        assert_eq!(value["comment"], json!("hi"));
    }
}
