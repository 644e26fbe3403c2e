//! OneBot v12 binding.

pub mod action;
pub mod event;
pub mod fragment;
pub mod message;

use std::time::Duration;

use async_trait::async_trait;
use matcha_core::{
    ActionError, ActionRequest, ActionResponse, CodecResult, EventCodec, Protocol, RetcodeTable,
    Scene, bearer, normalize_action,
};
use serde_json::Value;
use tracing::debug;

use crate::common::{self, IMPL_VERSION, OneBotContext};

pub use action::{Action, V12Actions};
pub use event::{Event, V12EventCodec};
pub use fragment::FragmentSessions;
pub use message::{Segment, V12MessageCodec};

pub const PROTOCOL_NAME: &str = "onebot-v12";

/// v12 retcodes. Every response carries `message`.
pub const RETCODES: RetcodeTable = RetcodeTable {
    bad_request: 10001,
    unsupported_action: 10002,
    bad_param: 10003,
    invalid_stage: 10004,
    not_found: 1404,
    forbidden: 1403,
    file: 32000,
    internal: 20002,
    with_message: true,
};

pub fn user_agent() -> String {
    format!(
        "OneBot/12 (standard) {}/{} Matcha/{IMPL_VERSION}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[derive(Clone)]
pub struct OneBotV12 {
    events: V12EventCodec,
    actions: V12Actions,
}

impl OneBotV12 {
    pub fn new(ctx: OneBotContext) -> Self {
        let messages = V12MessageCodec::new(ctx.files.clone());
        let events = V12EventCodec::new(ctx.clone(), messages.clone());
        let actions = V12Actions::new(ctx, messages, events.clone());
        Self { events, actions }
    }
}

#[async_trait]
impl Protocol for OneBotV12 {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn connect_headers(&self, access_token: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_owned(), user_agent()),
            ("Sec-WebSocket-Protocol".to_owned(), "12.matcha".to_owned()),
        ];
        headers.extend(bearer(access_token));
        headers
    }

    fn connect_events(&self, _heartbeat: Duration) -> Vec<Value> {
        [self.events.connect(), self.events.status_update()]
            .into_iter()
            .filter_map(|event| serde_json::to_value(event).ok())
            .collect()
    }

    fn heartbeat_event(&self, heartbeat: Duration) -> Value {
        serde_json::to_value(self.events.heartbeat(heartbeat)).unwrap_or_default()
    }

    async fn render(&self, scene: &Scene) -> CodecResult<Option<Value>> {
        self.events.build_event(scene).await
    }

    async fn dispatch(&self, request: &ActionRequest) -> (ActionResponse, Vec<Scene>) {
        debug!(protocol = PROTOCOL_NAME, action = %request.action, "Action request");
        let name = normalize_action(&request.action);
        let result = match Action::from_name(name) {
            Some(action) => self.actions.call(action, request).await,
            None => Err(ActionError::unsupported(name)),
        };
        common::finish(PROTOCOL_NAME, &RETCODES, request, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use matcha_core::files::sha256_hex;
    use matcha_core::{
        ActiveBot, Behav, BotIdentity, ChatLog, FileCache, Friend, Group, Member, MemoryBlobs,
        MemoryStore, Payload, Role, Status, Store, User,
    };
    use serde_json::json;

    use crate::config::OneBotConfig;

    async fn setup() -> (OneBotV12, Arc<Behav>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [("10000", "bot"), ("10001", "alice")] {
            store.put_user(User::new(id, name)).await.unwrap();
        }
        store
            .put_friend(Friend {
                user_id: "10000".into(),
                friend_id: "10001".into(),
                remark: "ally".into(),
            })
            .await
            .unwrap();
        store.put_group(Group::new("123", "tea")).await.unwrap();
        store.put_member(Member::new("123", "10000", Role::Admin)).await.unwrap();
        let mut alice = Member::new("123", "10001", Role::Member);
        alice.card = "Al".into();
        store.put_member(alice).await.unwrap();

        let bot = ActiveBot::new(Some(BotIdentity::new("10000", "bot")));
        let behav = Arc::new(Behav::new(store.clone(), Arc::new(ChatLog::new()), bot));
        let files = Arc::new(FileCache::new(
            store.clone(),
            Arc::new(MemoryBlobs::new()),
            "http://cache",
        ));
        let ctx = OneBotContext::new(behav.clone(), files, OneBotConfig::default());
        (OneBotV12::new(ctx), behav, store)
    }

    async fn call(protocol: &OneBotV12, action: &str, params: Value) -> (ActionResponse, Vec<Scene>) {
        protocol.dispatch(&ActionRequest::new(action, params)).await
    }

    #[tokio::test]
    async fn test_send_message() {
        let (protocol, _, _) = setup().await;
        let (response, scenes) = call(
            &protocol,
            "send_message",
            json!({
                "detail_type": "group",
                "group_id": "123",
                "message": [{"type": "text", "data": {"text": "hi"}}]
            }),
        )
        .await;

        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.message.as_deref(), Some(""));
        let data = response.data.into_json();
        assert!(data["message_id"].is_string());
        assert!(data["time"].is_number());
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].detail_type(), "group");
    }

    #[tokio::test]
    async fn test_send_message_unknown_user() {
        let (protocol, _, _) = setup().await;
        let (response, scenes) = call(
            &protocol,
            "send_message",
            json!({"detail_type": "private", "user_id": "404", "message": []}),
        )
        .await;
        assert_eq!(response.retcode, 1404);
        assert!(response.message.is_some_and(|m| !m.is_empty()));
        assert!(scenes.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let (protocol, _, _) = setup().await;
        let mut request = ActionRequest::new("send_group_msg", json!({}));
        request.echo = Some(Payload::from("abc"));
        let (response, _) = protocol.dispatch(&request).await;
        assert_eq!(response.retcode, 10002);
        assert_eq!(response.echo, Some(Payload::from("abc")));
    }

    #[tokio::test]
    async fn test_supported_actions_listed() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(&protocol, "get_supported_actions", json!({})).await;
        let data = response.data.into_json();
        let names = data.as_array().unwrap();
        assert_eq!(names.len(), Action::ALL.len());
        assert!(names.contains(&json!("upload_file_fragmented")));
    }

    #[tokio::test]
    async fn test_user_and_member_info() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(&protocol, "get_user_info", json!({"user_id": "10001"})).await;
        assert_eq!(response.data.into_json()["user_remark"], "ally");

        let (response, _) = call(&protocol, "get_group_member_list", json!({"group_id": "123"})).await;
        let data = response.data.into_json();
        assert_eq!(data[1], json!({"user_id": "10001", "user_name": "alice", "user_displayname": "Al"}));
    }

    #[tokio::test]
    async fn test_upload_and_get_file() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(
            &protocol,
            "upload_file",
            json!({"type": "data", "name": "hello.txt", "data": "aGVsbG8="}),
        )
        .await;
        assert_eq!(response.retcode, 0);
        let file_id = response.data.into_json()["file_id"].clone();

        let (response, _) = call(&protocol, "get_file", json!({"file_id": file_id, "type": "data"})).await;
        assert_eq!(response.data.get("data"), Some(&Payload::Bytes(b"hello".to_vec())));
        assert_eq!(response.data.get("name"), Some(&Payload::from("hello.txt")));

        let (response, _) = call(&protocol, "get_file", json!({"file_id": file_id, "type": "nope"})).await;
        assert_eq!(response.retcode, 10004);
    }

    #[tokio::test]
    async fn test_upload_with_known_sha256_reuses_file() {
        let (protocol, _, _) = setup().await;
        let (first, _) = call(
            &protocol,
            "upload_file",
            json!({"type": "data", "name": "a", "data": "aGVsbG8="}),
        )
        .await;
        let (second, _) = call(
            &protocol,
            "upload_file",
            json!({"type": "url", "name": "a", "url": "http://unreachable", "sha256": sha256_hex(b"hello")}),
        )
        .await;
        assert_eq!(first.data.into_json()["file_id"], second.data.into_json()["file_id"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_error() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(&protocol, "get_file", json!({"file_id": "missing", "type": "url"})).await;
        assert_eq!(response.retcode, 32000);
    }

    #[tokio::test]
    async fn test_fragmented_upload_and_download() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(
            &protocol,
            "upload_file_fragmented",
            json!({"stage": "prepare", "name": "f.bin", "total_size": 5}),
        )
        .await;
        let file_id = response.data.into_json()["file_id"].clone();

        for (offset, data) in [(0, "aGVs"), (3, "bG8=")] {
            let (response, _) = call(
                &protocol,
                "upload_file_fragmented",
                json!({"stage": "transfer", "file_id": file_id, "offset": offset, "data": data}),
            )
            .await;
            assert_eq!(response.retcode, 0);
        }
        let (response, _) = call(
            &protocol,
            "upload_file_fragmented",
            json!({"stage": "finish", "file_id": file_id, "sha256": sha256_hex(b"hello")}),
        )
        .await;
        assert_eq!(response.retcode, 0);

        let (response, _) = call(
            &protocol,
            "get_file_fragmented",
            json!({"stage": "prepare", "file_id": file_id}),
        )
        .await;
        assert_eq!(response.data.into_json()["total_size"], 5);

        let (response, _) = call(
            &protocol,
            "get_file_fragmented",
            json!({"stage": "transfer", "file_id": file_id, "offset": 1, "size": 3}),
        )
        .await;
        assert_eq!(response.data.get("data"), Some(&Payload::Bytes(b"ell".to_vec())));

        let (response, _) = call(&protocol, "upload_file_fragmented", json!({"stage": "resume"})).await;
        assert_eq!(response.retcode, 10004);
    }

    #[tokio::test]
    async fn test_fragmented_upload_rejects_oversized_total() {
        let (protocol, _, _) = setup().await;
        let (response, _) = call(
            &protocol,
            "upload_file_fragmented",
            json!({"stage": "prepare", "name": "huge.bin", "total_size": u64::MAX}),
        )
        .await;
        assert_eq!(response.retcode, 10003);

        let (response, _) = call(
            &protocol,
            "upload_file_fragmented",
            json!({"stage": "prepare", "name": "f.bin", "total_size": 2}),
        )
        .await;
        let file_id = response.data.into_json()["file_id"].clone();
        let (response, _) = call(
            &protocol,
            "upload_file_fragmented",
            json!({"stage": "transfer", "file_id": file_id, "offset": 0, "data": "aGVs"}),
        )
        .await;
        assert_eq!(response.retcode, 10003);
    }

    #[tokio::test]
    async fn test_connect_events_and_headers() {
        let (protocol, _, _) = setup().await;
        let events = protocol.connect_events(Duration::from_secs(3));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["detail_type"], "connect");
        assert_eq!(events[1]["detail_type"], "status_update");

        let headers = protocol.connect_headers(None);
        assert!(headers.iter().any(|(k, v)| k == "User-Agent" && v.starts_with("OneBot/12 (standard)")));
        assert!(headers.contains(&("Sec-WebSocket-Protocol".to_owned(), "12.matcha".to_owned())));
        assert!(!headers.iter().any(|(k, _)| k == "Authorization"));
    }
}
