//! Canonical rich-message elements.
//!
//! Every protocol codec maps its own segment shapes to and from this set.
//! The wire layout (`{"type": ..., "data": {...}}`) matches the segment
//! layout so that content lists can be logged and stored as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `target` of a mention that addresses everyone.
pub const MENTION_ALL: &str = "all";

// ============================================================================
// Content
// ============================================================================

/// A canonical message element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Content {
    Text(TextContent),
    Mention(MentionContent),
    Reply(ReplyContent),
    Face(FaceContent),
    Dice(DiceContent),
    Rps(RpsContent),
    Poke(PokeContent),
    Shake(ShakeContent),
    Anonymous(AnonymousContent),
    Share(ShareContent),
    Contact(ContactContent),
    Location(LocationContent),
    File(FileContent),
    Image(ImageContent),
    Voice(FileContent),
    Video(FileContent),
    Forward(ForwardContent),
    Node(NodeContent),
}

/// Discriminator of a [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Mention,
    Reply,
    Face,
    Dice,
    Rps,
    Poke,
    Shake,
    Anonymous,
    Share,
    Contact,
    Location,
    File,
    Image,
    Voice,
    Video,
    Forward,
    Node,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Mention => "mention",
            Self::Reply => "reply",
            Self::Face => "face",
            Self::Dice => "dice",
            Self::Rps => "rps",
            Self::Poke => "poke",
            Self::Shake => "shake",
            Self::Anonymous => "anonymous",
            Self::Share => "share",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::File => "file",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Forward => "forward",
            Self::Node => "node",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Data records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// Mention of a user, or of everyone when `target` is [`MENTION_ALL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionContent {
    pub target: String,
}

impl MentionContent {
    pub fn is_all(&self) -> bool {
        self.target == MENTION_ALL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyContent {
    pub message_id: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceContent {
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceContent {
    /// Face value, 1 to 6.
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpsContent {
    /// 0 rock, 1 scissors, 2 paper.
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokeContent {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShakeContent {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnonymousContent {}

/// A shared link or music card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShareContent {
    Link(LinkShare),
    Music(MusicShare),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkShare {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Music platform of a music share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicKind {
    #[serde(rename = "qq")]
    Qq,
    #[serde(rename = "163")]
    NetEase,
    #[serde(rename = "xm")]
    Xiami,
    #[serde(rename = "custom")]
    Custom,
}

impl MusicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qq => "qq",
            Self::NetEase => "163",
            Self::Xiami => "xm",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qq" => Some(Self::Qq),
            "163" => Some(Self::NetEase),
            "xm" => Some(Self::Xiami),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicShare {
    pub sub_type: MusicKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactContent {
    #[serde(rename = "type")]
    pub kind: ContactKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationContent {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// A cached file reference: opaque file id plus its retrievable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    #[default]
    Normal,
    Emoji,
    Flash,
    Show,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sub_type: ImageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardContent {
    pub content: Vec<NodeContent>,
}

/// One entry of a forwarded message bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContent {
    pub user_id: String,
    pub user_name: String,
    pub message: Vec<Content>,
    pub time: i64,
}

// ============================================================================
// Construction
// ============================================================================

impl Content {
    /// Stamps `kind` onto `data`, validating the shape.
    ///
    /// The data is moved in unchanged; reading it back with [`Content::data`]
    /// yields the same record.
    pub fn from_parts(kind: ContentType, data: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "type": kind, "data": data }))
    }

    /// The data record as a JSON value.
    pub fn data(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text(_) => ContentType::Text,
            Self::Mention(_) => ContentType::Mention,
            Self::Reply(_) => ContentType::Reply,
            Self::Face(_) => ContentType::Face,
            Self::Dice(_) => ContentType::Dice,
            Self::Rps(_) => ContentType::Rps,
            Self::Poke(_) => ContentType::Poke,
            Self::Shake(_) => ContentType::Shake,
            Self::Anonymous(_) => ContentType::Anonymous,
            Self::Share(_) => ContentType::Share,
            Self::Contact(_) => ContentType::Contact,
            Self::Location(_) => ContentType::Location,
            Self::File(_) => ContentType::File,
            Self::Image(_) => ContentType::Image,
            Self::Voice(_) => ContentType::Voice,
            Self::Video(_) => ContentType::Video,
            Self::Forward(_) => ContentType::Forward,
            Self::Node(_) => ContentType::Node,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent { text: text.into() })
    }

    pub fn mention(target: impl Into<String>) -> Self {
        Self::Mention(MentionContent {
            target: target.into(),
        })
    }

    pub fn mention_all() -> Self {
        Self::mention(MENTION_ALL)
    }

    pub fn reply(message_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::Reply(ReplyContent {
            message_id: message_id.into(),
            user_id: user_id.into(),
        })
    }

    pub fn face(id: i32, name: impl Into<String>) -> Self {
        Self::Face(FaceContent {
            id,
            name: name.into(),
        })
    }

    pub fn image(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            id: id.into(),
            url: url.into(),
            sub_type: ImageKind::Normal,
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            _ => None,
        }
    }
}
