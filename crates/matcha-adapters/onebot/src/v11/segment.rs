//! OneBot v11 message segments and their CQ code form.
//!
//! Each segment type corresponds to a CQ code in the string format:
//! - `text` → plain text (escaped, no CQ code)
//! - `face` → `[CQ:face,id=123]`
//! - `image` → `[CQ:image,file=xxx,url=yyy]`
//! - etc.
//!
//! Identifier fields accept numbers as well as strings, since bot programs
//! routinely send `"qq": 10001`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::common::de::{opt_string_like, string_like};

// ============================================================================
// Segment
// ============================================================================

/// A OneBot v11 message segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    Text(TextData),
    Face(FaceData),
    Image(ImageData),
    Record(RecordData),
    Video(VideoData),
    At(AtData),
    Rps(EmptyData),
    Dice(EmptyData),
    Shake(EmptyData),
    Poke(PokeData),
    Anonymous(EmptyData),
    Share(ShareData),
    Contact(ContactData),
    Location(LocationData),
    Music(MusicData),
    Reply(ReplyData),
    Forward(ForwardData),
    Node(NodeData),
    /// Accepted on input so that a message containing one still decodes.
    Xml(RawData),
    Json(RawData),
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(TextData { text: text.into() })
    }

    pub fn at(qq: impl Into<String>) -> Self {
        Segment::At(AtData { qq: qq.into() })
    }

    pub fn face(id: i32) -> Self {
        Segment::Face(FaceData { id: id.to_string() })
    }

    pub fn image(file: impl Into<String>) -> Self {
        Segment::Image(ImageData {
            file: file.into(),
            url: None,
            image_type: None,
        })
    }

    pub fn reply(id: impl Into<String>) -> Self {
        Segment::Reply(ReplyData { id: id.into() })
    }

    pub fn segment_type(&self) -> &'static str {
        match self {
            Segment::Text(_) => "text",
            Segment::Face(_) => "face",
            Segment::Image(_) => "image",
            Segment::Record(_) => "record",
            Segment::Video(_) => "video",
            Segment::At(_) => "at",
            Segment::Rps(_) => "rps",
            Segment::Dice(_) => "dice",
            Segment::Shake(_) => "shake",
            Segment::Poke(_) => "poke",
            Segment::Anonymous(_) => "anonymous",
            Segment::Share(_) => "share",
            Segment::Contact(_) => "contact",
            Segment::Location(_) => "location",
            Segment::Music(_) => "music",
            Segment::Reply(_) => "reply",
            Segment::Forward(_) => "forward",
            Segment::Node(_) => "node",
            Segment::Xml(_) => "xml",
            Segment::Json(_) => "json",
        }
    }

    /// Formats the segment as a CQ code; text is escaped instead.
    pub fn to_cq_code(&self) -> String {
        if let Segment::Text(data) = self {
            return escape_cq_text(&data.text);
        }
        let mut cq = format!("[CQ:{}", self.segment_type());
        if let Ok(Value::Object(mut outer)) = serde_json::to_value(self)
            && let Some(Value::Object(data)) = outer.remove("data")
        {
            for (key, value) in data {
                let value = match value {
                    Value::Null => continue,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                cq.push_str(&format!(",{key}={}", escape_cq_value(&value)));
            }
        }
        cq.push(']');
        cq
    }
}

// ============================================================================
// Segment Data Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    #[serde(deserialize_with = "string_like")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// File id, URL, path or Base64.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `flash` or `show`; absent for a normal image.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Voice change flag; implementations send `0`/`1` or booleans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtData {
    /// User id or `all`.
    #[serde(deserialize_with = "string_like")]
    pub qq: String,
}

/// Data of segments that carry no fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyData {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PokeData {
    #[serde(rename = "type", default)]
    pub poke_type: String,
    #[serde(deserialize_with = "string_like")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareData {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactData {
    /// `qq` or `group`.
    #[serde(rename = "type")]
    pub contact_type: String,
    #[serde(deserialize_with = "string_like")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    #[serde(deserialize_with = "string_like")]
    pub lat: String,
    #[serde(deserialize_with = "string_like")]
    pub lon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicData {
    /// `qq`, `163`, `xm` or `custom`.
    #[serde(rename = "type")]
    pub music_type: String,
    #[serde(default, deserialize_with = "opt_string_like", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyData {
    #[serde(deserialize_with = "string_like")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardData {
    #[serde(deserialize_with = "string_like")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, deserialize_with = "opt_string_like", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub data: String,
}

// ============================================================================
// Message body
// ============================================================================

/// A `message` field as bot programs send it: a CQ string, an array, or a
/// lone segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Segments(Vec<Segment>),
    Single(Segment),
}

impl MessageBody {
    /// With `auto_escape` a string is taken literally instead of as CQ code.
    pub fn into_segments(self, auto_escape: bool) -> Vec<Segment> {
        match self {
            MessageBody::Text(text) if auto_escape => vec![Segment::text(text)],
            MessageBody::Text(text) => parse_cq_string(&text),
            MessageBody::Segments(segments) => segments,
            MessageBody::Single(segment) => vec![segment],
        }
    }
}

pub fn to_cq_string(segments: &[Segment]) -> String {
    segments.iter().map(Segment::to_cq_code).collect()
}

// ============================================================================
// CQ code parsing
// ============================================================================

/// Parses a CQ-coded string into segments.
///
/// An unknown or malformed CQ code is kept verbatim as text.
pub fn parse_cq_string(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        match rest.find("[CQ:") {
            Some(0) => {
                let Some(end) = rest.find(']') else {
                    push_text(&mut segments, rest);
                    break;
                };
                let code = &rest[..=end];
                segments.push(cq_to_segment(&rest[4..end]).unwrap_or_else(|| Segment::text(code)));
                rest = &rest[end + 1..];
            }
            Some(start) => {
                push_text(&mut segments, &rest[..start]);
                rest = &rest[start..];
            }
            None => {
                push_text(&mut segments, rest);
                break;
            }
        }
    }
    segments
}

fn push_text(segments: &mut Vec<Segment>, raw: &str) {
    let text = unescape_cq_text(raw);
    if !text.is_empty() {
        segments.push(Segment::text(text));
    }
}

/// `code` is the inside of `[CQ:...]`, e.g. `face,id=14`.
fn cq_to_segment(code: &str) -> Option<Segment> {
    let mut parts = code.split(',');
    let kind = parts.next().filter(|k| !k.is_empty())?;
    let data: Map<String, Value> = parts
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.to_owned(), Value::String(unescape_cq_value(v))))
        .collect();
    serde_json::from_value(json!({ "type": kind, "data": data })).ok()
}

// ============================================================================
// CQ Code Escaping Utilities
// ============================================================================

/// Escapes: `&` → `&amp;`, `[` → `&#91;`, `]` → `&#93;`
pub fn escape_cq_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('[', "&#91;")
        .replace(']', "&#93;")
}

pub fn unescape_cq_text(text: &str) -> String {
    text.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

/// Like [`escape_cq_text`], plus `,` → `&#44;`.
pub fn escape_cq_value(value: &str) -> String {
    escape_cq_text(value).replace(',', "&#44;")
}

pub fn unescape_cq_value(value: &str) -> String {
    unescape_cq_text(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_serialize() {
        let json = serde_json::to_string(&Segment::at("10001000")).unwrap();
        assert_eq!(json, r#"{"type":"at","data":{"qq":"10001000"}}"#);

        let json = serde_json::to_string(&Segment::face(178)).unwrap();
        assert_eq!(json, r#"{"type":"face","data":{"id":"178"}}"#);
    }

    #[test]
    fn test_segment_deserialize_numeric_ids() {
        let segment: Segment = serde_json::from_str(r#"{"type":"at","data":{"qq":123}}"#).unwrap();
        assert_eq!(segment, Segment::at("123"));

        let segment: Segment =
            serde_json::from_str(r#"{"type":"location","data":{"lat":31.5,"lon":"121"}}"#).unwrap();
        assert!(matches!(segment, Segment::Location(LocationData { lat, .. }) if lat == "31.5"));
    }

    #[test]
    fn test_cq_code_conversion() {
        assert_eq!(Segment::text("a[b]").to_cq_code(), "a&#91;b&#93;");
        assert_eq!(Segment::face(178).to_cq_code(), "[CQ:face,id=178]");
        assert_eq!(Segment::at("all").to_cq_code(), "[CQ:at,qq=all]");
        assert_eq!(Segment::Dice(EmptyData {}).to_cq_code(), "[CQ:dice]");
        assert_eq!(
            Segment::image("http://example.com/1,2.jpg").to_cq_code(),
            "[CQ:image,file=http://example.com/1&#44;2.jpg]"
        );
    }

    #[test]
    fn test_parse_cq_string() {
        let segments = parse_cq_string("hi [CQ:at,qq=10001] &#91;x&#93;[CQ:face,id=14]");
        assert_eq!(
            segments,
            vec![
                Segment::text("hi "),
                Segment::at("10001"),
                Segment::text(" [x]"),
                Segment::face(14),
            ]
        );
    }

    #[test]
    fn test_parse_cq_string_unknown_code_is_text() {
        let segments = parse_cq_string("[CQ:unknown,a=1]tail[CQ:broken");
        assert_eq!(
            segments,
            vec![
                Segment::text("[CQ:unknown,a=1]"),
                Segment::text("tail"),
                Segment::text("[CQ:broken"),
            ]
        );
    }

    #[test]
    fn test_cq_string_survives_reparse() {
        let original = vec![
            Segment::text("a, b & c"),
            Segment::reply("42"),
            Segment::image("base64://AAAA"),
        ];
        assert_eq!(parse_cq_string(&to_cq_string(&original)), original);
    }

    #[test]
    fn test_message_body() {
        let body: MessageBody = serde_json::from_str(r#""[CQ:at,qq=1] hi""#).unwrap();
        assert_eq!(body.clone().into_segments(false).len(), 2);
        assert_eq!(
            body.into_segments(true),
            vec![Segment::text("[CQ:at,qq=1] hi")]
        );

        let body: MessageBody =
            serde_json::from_str(r#"[{"type":"text","data":{"text":"x"}}]"#).unwrap();
        assert_eq!(body.into_segments(false), vec![Segment::text("x")]);

        let body: MessageBody =
            serde_json::from_str(r#"{"type":"face","data":{"id":1}}"#).unwrap();
        assert_eq!(body.into_segments(false), vec![Segment::face(1)]);
    }
}
