//! Codec and protocol seams implemented once per protocol version.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::warn;

use crate::action::{ActionRequest, ActionResponse};
use crate::content::Content;
use crate::error::{CodecError, CodecResult};
use crate::scene::Scene;

// =============================================================================
// Message codec
// =============================================================================

/// Converts single content elements to and from wire segments.
///
/// `Ok(None)` means the element type has no mapping in this direction and is
/// dropped from the batch.
#[async_trait]
pub trait MessageCodec: Send + Sync {
    type Segment: Send + Sync;

    async fn build_one(&self, content: &Content) -> CodecResult<Option<Self::Segment>>;

    async fn parse_one(&self, segment: &Self::Segment) -> CodecResult<Option<Content>>;
}

/// Builds a whole message. Elements convert concurrently; output keeps input
/// order. An unimplemented element aborts the batch, other failures only drop
/// the element.
pub async fn build_message<C>(codec: &C, contents: &[Content]) -> CodecResult<Vec<C::Segment>>
where
    C: MessageCodec + ?Sized,
{
    collect(join_all(contents.iter().map(|c| codec.build_one(c))).await)
}

/// Parses a whole message with the same batch rules as [`build_message`].
pub async fn parse_message<C>(codec: &C, segments: &[C::Segment]) -> CodecResult<Vec<Content>>
where
    C: MessageCodec + ?Sized,
{
    collect(join_all(segments.iter().map(|s| codec.parse_one(s))).await)
}

fn collect<T>(results: Vec<CodecResult<Option<T>>>) -> CodecResult<Vec<T>> {
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(Some(item)) => out.push(item),
            Ok(None) => {}
            Err(err @ CodecError::NotImplemented(_)) => return Err(err),
            Err(err) => warn!(error = %err, "Dropping message element"),
        }
    }
    Ok(out)
}

// =============================================================================
// Event codec
// =============================================================================

/// Renders scenes as wire events.
#[async_trait]
pub trait EventCodec: Send + Sync {
    /// `Ok(None)` when the scene has no representation in this protocol.
    async fn build_event(&self, scene: &Scene) -> CodecResult<Option<Value>>;
}

// =============================================================================
// Protocol binding
// =============================================================================

/// One protocol version: its handshake, meta events, event codec and action
/// dispatcher.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handshake headers, including the bearer token if one is set.
    fn connect_headers(&self, access_token: Option<&str>) -> Vec<(String, String)>;

    /// Meta events pushed right after the handshake.
    fn connect_events(&self, heartbeat: Duration) -> Vec<Value>;

    fn heartbeat_event(&self, heartbeat: Duration) -> Value;

    async fn render(&self, scene: &Scene) -> CodecResult<Option<Value>>;

    /// Runs one action. Never fails: errors are rendered as responses.
    async fn dispatch(&self, request: &ActionRequest) -> (ActionResponse, Vec<Scene>);
}

/// `Authorization` header value for a configured token.
pub fn bearer(access_token: Option<&str>) -> Option<(String, String)> {
    access_token
        .filter(|t| !t.is_empty())
        .map(|t| ("Authorization".to_owned(), format!("Bearer {t}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ForwardContent;

    struct Upper;

    #[async_trait]
    impl MessageCodec for Upper {
        type Segment = String;

        async fn build_one(&self, content: &Content) -> CodecResult<Option<String>> {
            match content {
                Content::Text(t) if t.text == "bad" => Err(CodecError::Malformed("bad".into())),
                Content::Text(t) => {
                    tokio::task::yield_now().await;
                    Ok(Some(t.text.to_uppercase()))
                }
                Content::Forward(_) => Err(CodecError::NotImplemented("forward")),
                _ => Ok(None),
            }
        }

        async fn parse_one(&self, segment: &String) -> CodecResult<Option<Content>> {
            Ok(Some(Content::text(segment.to_lowercase())))
        }
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_drops() {
        let contents = vec![
            Content::text("a"),
            Content::mention("1"),
            Content::text("bad"),
            Content::text("b"),
        ];
        let built = build_message(&Upper, &contents).await.unwrap();
        assert_eq!(built, vec!["A".to_owned(), "B".to_owned()]);

        let parsed = parse_message(&Upper, &built).await.unwrap();
        assert_eq!(parsed, vec![Content::text("a"), Content::text("b")]);
    }

    #[tokio::test]
    async fn test_unimplemented_aborts_batch() {
        let contents = vec![Content::text("a"), Content::Forward(ForwardContent { content: vec![] })];
        let err = build_message(&Upper, &contents).await.unwrap_err();
        assert!(matches!(err, CodecError::NotImplemented("forward")));
    }

    #[test]
    fn test_bearer() {
        assert_eq!(bearer(None), None);
        assert_eq!(bearer(Some("")), None);
        assert_eq!(
            bearer(Some("t")),
            Some(("Authorization".to_owned(), "Bearer t".to_owned()))
        );
    }
}
