//! Content ⇄ v11 segment conversion.

use std::sync::Arc;

use async_trait::async_trait;
use matcha_core::content::{
    ContactContent, ContactKind, DiceContent, FaceContent, FileContent, ImageContent, ImageKind,
    LinkShare, LocationContent, MusicKind, MusicShare, PokeContent, ReplyContent, RpsContent,
    ShareContent,
};
use matcha_core::{CodecError, CodecResult, Content, FileCache, FileSource, MessageCodec};
use rand::Rng;
use serde_json::Value;

use super::segment::*;

/// V11 message codec. File-bearing segments go through the file cache.
#[derive(Clone)]
pub struct V11MessageCodec {
    files: Arc<FileCache>,
}

impl V11MessageCodec {
    pub fn new(files: Arc<FileCache>) -> Self {
        Self { files }
    }

    async fn file_url(&self, id: &str, url: &str) -> CodecResult<String> {
        if url.is_empty() {
            Ok(self.files.url(id).await?)
        } else {
            Ok(url.to_owned())
        }
    }

    async fn cache(&self, file: &str) -> CodecResult<(String, String)> {
        let cached = self
            .files
            .create(FileSource::Str(file.to_owned()), None, None)
            .await?;
        Ok((cached.id, cached.url))
    }
}

fn malformed(segment: &Segment, what: &str) -> CodecError {
    CodecError::Malformed(format!("{} segment: {what}", segment.segment_type()))
}

#[async_trait]
impl MessageCodec for V11MessageCodec {
    type Segment = Segment;

    async fn build_one(&self, content: &Content) -> CodecResult<Option<Segment>> {
        let segment = match content {
            Content::Text(t) => Segment::text(t.text.clone()),
            Content::Mention(m) => Segment::at(m.target.clone()),
            Content::Reply(r) => Segment::reply(r.message_id.clone()),
            Content::Face(f) => Segment::face(f.id),
            Content::Dice(_) => Segment::Dice(EmptyData {}),
            Content::Rps(_) => Segment::Rps(EmptyData {}),
            Content::Poke(p) => Segment::Poke(PokeData {
                poke_type: String::new(),
                id: p.user_id.clone(),
                name: Some(String::new()),
            }),
            Content::Shake(_) => Segment::Shake(EmptyData {}),
            Content::Anonymous(_) => Segment::Anonymous(EmptyData {}),
            Content::Share(ShareContent::Link(link)) => Segment::Share(ShareData {
                url: link.url.clone(),
                title: link.title.clone(),
                content: link.content.clone(),
                image: link.image.clone(),
            }),
            Content::Share(ShareContent::Music(music)) => Segment::Music(MusicData {
                music_type: music.sub_type.as_str().to_owned(),
                id: music.id.clone(),
                url: Some(music.url.clone()),
                audio: None,
                title: Some(music.title.clone()),
                content: music.content.clone(),
                image: music.image.clone(),
            }),
            Content::Contact(c) => Segment::Contact(ContactData {
                contact_type: match c.kind {
                    ContactKind::User => "qq",
                    ContactKind::Group => "group",
                }
                .to_owned(),
                id: c.id.clone(),
            }),
            Content::Location(l) => Segment::Location(LocationData {
                lat: l.latitude.to_string(),
                lon: l.longitude.to_string(),
                title: Some(l.title.clone()),
                content: Some(l.content.clone()),
            }),
            // v11 has no generic file segment
            Content::File(_) => return Ok(None),
            Content::Image(image) => Segment::Image(ImageData {
                file: image.id.clone(),
                url: Some(self.file_url(&image.id, &image.url).await?),
                image_type: match image.sub_type {
                    ImageKind::Flash => Some("flash".to_owned()),
                    ImageKind::Show => Some("show".to_owned()),
                    ImageKind::Normal | ImageKind::Emoji => None,
                },
            }),
            Content::Voice(voice) => Segment::Record(RecordData {
                file: voice.id.clone(),
                url: Some(self.file_url(&voice.id, &voice.url).await?),
                magic: Some(Value::Bool(false)),
            }),
            Content::Video(video) => Segment::Video(VideoData {
                file: video.id.clone(),
                url: Some(self.file_url(&video.id, &video.url).await?),
            }),
            Content::Forward(_) => return Err(CodecError::NotImplemented("forward")),
            Content::Node(_) => return Err(CodecError::NotImplemented("node")),
        };
        Ok(Some(segment))
    }

    async fn parse_one(&self, segment: &Segment) -> CodecResult<Option<Content>> {
        let content = match segment {
            Segment::Text(t) => Content::text(t.text.clone()),
            Segment::At(at) => Content::mention(at.qq.clone()),
            Segment::Reply(r) => Content::Reply(ReplyContent {
                message_id: r.id.clone(),
                user_id: String::new(),
            }),
            Segment::Face(f) => Content::Face(FaceContent {
                id: f.id.parse().map_err(|_| malformed(segment, "id is not a number"))?,
                name: String::new(),
            }),
            // The bot only asks for a throw; the result is rolled here.
            Segment::Dice(_) => Content::Dice(DiceContent {
                value: rand::rng().random_range(1..=6),
            }),
            Segment::Rps(_) => Content::Rps(RpsContent {
                value: rand::rng().random_range(0..=2),
            }),
            Segment::Poke(p) => Content::Poke(PokeContent {
                user_id: p.id.clone(),
            }),
            Segment::Shake(_) => Content::Shake(Default::default()),
            Segment::Anonymous(_) => Content::Anonymous(Default::default()),
            Segment::Share(s) => Content::Share(ShareContent::Link(LinkShare {
                url: s.url.clone(),
                title: s.title.clone(),
                content: s.content.clone(),
                image: s.image.clone(),
            })),
            Segment::Music(m) => Content::Share(ShareContent::Music(MusicShare {
                sub_type: MusicKind::parse(&m.music_type)
                    .ok_or_else(|| malformed(segment, "unknown music type"))?,
                id: m.id.clone(),
                url: m.url.clone().unwrap_or_default(),
                title: m.title.clone().unwrap_or_default(),
                content: m.content.clone(),
                image: m.image.clone(),
            })),
            Segment::Contact(c) => Content::Contact(ContactContent {
                kind: match c.contact_type.as_str() {
                    "qq" => ContactKind::User,
                    "group" => ContactKind::Group,
                    _ => return Err(malformed(segment, "unknown contact type")),
                },
                id: c.id.clone(),
            }),
            Segment::Location(l) => Content::Location(LocationContent {
                latitude: l.lat.parse().map_err(|_| malformed(segment, "bad latitude"))?,
                longitude: l.lon.parse().map_err(|_| malformed(segment, "bad longitude"))?,
                title: l.title.clone().unwrap_or_default(),
                content: l.content.clone().unwrap_or_default(),
            }),
            Segment::Image(image) => {
                let (id, url) = self.cache(&image.file).await?;
                Content::Image(ImageContent {
                    id,
                    url,
                    sub_type: match image.image_type.as_deref() {
                        Some("flash") => ImageKind::Flash,
                        Some("show") => ImageKind::Show,
                        _ => ImageKind::Normal,
                    },
                })
            }
            Segment::Record(record) => {
                let (id, url) = self.cache(&record.file).await?;
                Content::Voice(FileContent { id, url })
            }
            Segment::Video(video) => {
                let (id, url) = self.cache(&video.file).await?;
                Content::Video(FileContent { id, url })
            }
            Segment::Forward(_) => return Err(CodecError::NotImplemented("forward")),
            Segment::Node(_) => return Err(CodecError::NotImplemented("node")),
            Segment::Xml(_) | Segment::Json(_) => return Ok(None),
        };
        Ok(Some(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcha_core::{MemoryBlobs, MemoryStore, build_message, parse_message};

    fn codec() -> V11MessageCodec {
        let store = Arc::new(MemoryStore::new());
        let files = FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache");
        V11MessageCodec::new(Arc::new(files))
    }

    #[tokio::test]
    async fn test_build_basic_segments() {
        let codec = codec();
        let contents = vec![
            Content::text("hi"),
            Content::mention_all(),
            Content::face(14, "smile"),
            Content::Contact(ContactContent {
                kind: ContactKind::User,
                id: "7".into(),
            }),
        ];
        let segments = build_message(&codec, &contents).await.unwrap();
        assert_eq!(
            serde_json::to_value(&segments).unwrap(),
            serde_json::json!([
                {"type": "text", "data": {"text": "hi"}},
                {"type": "at", "data": {"qq": "all"}},
                {"type": "face", "data": {"id": "14"}},
                {"type": "contact", "data": {"type": "qq", "id": "7"}},
            ])
        );
    }

    #[tokio::test]
    async fn test_forward_is_not_implemented() {
        let codec = codec();
        let err = parse_message(&codec, &[Segment::text("a"), Segment::Forward(ForwardData { id: "1".into() })])
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::NotImplemented("forward")));
    }

    #[tokio::test]
    async fn test_parse_drops_malformed_element() {
        let codec = codec();
        let segments = vec![
            Segment::text("a"),
            Segment::Face(FaceData { id: "x".into() }),
            Segment::at("10001"),
        ];
        let contents = parse_message(&codec, &segments).await.unwrap();
        assert_eq!(contents, vec![Content::text("a"), Content::mention("10001")]);
    }

    #[tokio::test]
    async fn test_image_goes_through_cache() {
        let codec = codec();
        let contents = parse_message(&codec, &[Segment::image("base64://aGVsbG8=")])
            .await
            .unwrap();
        let Content::Image(image) = &contents[0] else {
            panic!("expected image, got {contents:?}");
        };
        assert!(image.url.starts_with("http://cache/"));

        let rebuilt = build_message(&codec, &contents).await.unwrap();
        assert!(matches!(&rebuilt[0], Segment::Image(data) if data.file == image.id));
    }

    #[tokio::test]
    async fn test_dice_value_in_range() {
        let codec = codec();
        for _ in 0..20 {
            let content = codec.parse_one(&Segment::Dice(EmptyData {})).await.unwrap();
            let Some(Content::Dice(dice)) = content else {
                panic!("expected dice");
            };
            assert!((1..=6).contains(&dice.value));
        }
    }
}
