//! OneBot v12 message segments and their content mapping.
//!
//! Files travel as `file_id` references into the file cache. Content types
//! without a v12 segment (faces, shares, pokes...) are dropped when building.

use std::sync::Arc;

use async_trait::async_trait;
use matcha_core::content::{FileContent, ImageContent, ImageKind, LocationContent, ReplyContent};
use matcha_core::{CodecResult, Content, FileCache, MessageCodec};
use serde::{Deserialize, Serialize};

use crate::common::de::string_like;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    Text {
        text: String,
    },
    Mention {
        #[serde(deserialize_with = "string_like")]
        user_id: String,
    },
    MentionAll {},
    Reply {
        #[serde(deserialize_with = "string_like")]
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        title: String,
        #[serde(default)]
        content: String,
    },
    File {
        file_id: String,
    },
    Image {
        file_id: String,
    },
    Voice {
        file_id: String,
    },
    Audio {
        file_id: String,
    },
    Video {
        file_id: String,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn mention(user_id: impl Into<String>) -> Self {
        Self::Mention {
            user_id: user_id.into(),
        }
    }
}

#[derive(Clone)]
pub struct V12MessageCodec {
    files: Arc<FileCache>,
}

impl V12MessageCodec {
    pub fn new(files: Arc<FileCache>) -> Self {
        Self { files }
    }

    async fn file(&self, file_id: &str) -> CodecResult<FileContent> {
        Ok(FileContent {
            id: file_id.to_owned(),
            url: self.files.url(file_id).await?,
        })
    }
}

#[async_trait]
impl MessageCodec for V12MessageCodec {
    type Segment = Segment;

    async fn build_one(&self, content: &Content) -> CodecResult<Option<Segment>> {
        Ok(Some(match content {
            Content::Text(t) => Segment::text(t.text.clone()),
            Content::Mention(m) if m.is_all() => Segment::MentionAll {},
            Content::Mention(m) => Segment::mention(m.target.clone()),
            Content::Reply(r) => Segment::Reply {
                message_id: r.message_id.clone(),
                user_id: Some(r.user_id.clone()).filter(|id| !id.is_empty()),
            },
            Content::Location(l) => Segment::Location {
                latitude: l.latitude,
                longitude: l.longitude,
                title: l.title.clone(),
                content: l.content.clone(),
            },
            Content::File(f) => Segment::File {
                file_id: f.id.clone(),
            },
            Content::Image(i) => Segment::Image {
                file_id: i.id.clone(),
            },
            Content::Voice(v) => Segment::Voice {
                file_id: v.id.clone(),
            },
            Content::Video(v) => Segment::Video {
                file_id: v.id.clone(),
            },
            _ => return Ok(None),
        }))
    }

    async fn parse_one(&self, segment: &Segment) -> CodecResult<Option<Content>> {
        Ok(Some(match segment {
            Segment::Text { text } => Content::text(text.clone()),
            Segment::Mention { user_id } => Content::mention(user_id.clone()),
            Segment::MentionAll {} => Content::mention_all(),
            Segment::Reply {
                message_id,
                user_id,
            } => Content::Reply(ReplyContent {
                message_id: message_id.clone(),
                user_id: user_id.clone().unwrap_or_default(),
            }),
            Segment::Location {
                latitude,
                longitude,
                title,
                content,
            } => Content::Location(LocationContent {
                latitude: *latitude,
                longitude: *longitude,
                title: title.clone(),
                content: content.clone(),
            }),
            Segment::File { file_id } => Content::File(self.file(file_id).await?),
            Segment::Image { file_id } => {
                let file = self.file(file_id).await?;
                Content::Image(ImageContent {
                    id: file.id,
                    url: file.url,
                    sub_type: ImageKind::Normal,
                })
            }
            Segment::Voice { file_id } | Segment::Audio { file_id } => {
                Content::Voice(self.file(file_id).await?)
            }
            Segment::Video { file_id } => Content::Video(self.file(file_id).await?),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcha_core::{FileSource, MemoryBlobs, MemoryStore, build_message, parse_message};
    use serde_json::json;

    fn codec() -> (V12MessageCodec, Arc<FileCache>) {
        let store = Arc::new(MemoryStore::new());
        let files = Arc::new(FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache"));
        (V12MessageCodec::new(files.clone()), files)
    }

    #[test]
    fn test_segment_wire_shape() {
        let segments: Vec<Segment> = serde_json::from_value(json!([
            {"type": "text", "data": {"text": "hi"}},
            {"type": "mention_all", "data": {}},
            {"type": "mention", "data": {"user_id": 10001}},
            {"type": "reply", "data": {"message_id": "10003"}},
        ]))
        .unwrap();
        assert_eq!(segments[1], Segment::MentionAll {});
        assert_eq!(segments[2], Segment::mention("10001"));
        assert_eq!(
            serde_json::to_value(&segments[3]).unwrap(),
            json!({"type": "reply", "data": {"message_id": "10003"}})
        );
    }

    #[tokio::test]
    async fn test_mention_all_split() {
        let (codec, _) = codec();
        let segments = build_message(&codec, &[Content::mention_all(), Content::mention("7")])
            .await
            .unwrap();
        assert_eq!(segments, vec![Segment::MentionAll {}, Segment::mention("7")]);
    }

    #[tokio::test]
    async fn test_unmapped_content_is_dropped() {
        let (codec, _) = codec();
        let segments = build_message(&codec, &[Content::face(14, "smile"), Content::text("a")])
            .await
            .unwrap();
        assert_eq!(segments, vec![Segment::text("a")]);
    }

    #[tokio::test]
    async fn test_audio_parses_as_voice() {
        let (codec, files) = codec();
        let cached = files
            .create(FileSource::Bytes(b"ogg".to_vec()), Some("a.ogg".into()), None)
            .await
            .unwrap();
        let contents = parse_message(&codec, &[Segment::Audio {
            file_id: cached.id.clone(),
        }])
        .await
        .unwrap();
        assert_eq!(
            contents,
            vec![Content::Voice(FileContent {
                id: cached.id,
                url: cached.url,
            })]
        );
    }

    #[tokio::test]
    async fn test_unknown_file_id_drops_element() {
        let (codec, _) = codec();
        let contents = parse_message(&codec, &[Segment::Image {
            file_id: "missing".into(),
        }])
        .await
        .unwrap();
        assert!(contents.is_empty());
    }
}
