//! OneBot v11 binding.

pub mod action;
pub mod event;
pub mod message;
pub mod segment;

use std::time::Duration;

use async_trait::async_trait;
use matcha_core::{
    ActionError, ActionRequest, ActionResponse, CodecResult, EventCodec, Protocol, RetcodeTable,
    Scene, bearer, normalize_action,
};
use serde_json::Value;
use tracing::debug;

use crate::common::{self, OneBotContext};

pub use action::{Action, V11Actions};
pub use event::{Event, V11EventCodec, WireId};
pub use message::V11MessageCodec;
pub use segment::{MessageBody, Segment};

pub const PROTOCOL_NAME: &str = "onebot-v11";

/// v11 retcodes. Failed responses carry no `message`.
pub const RETCODES: RetcodeTable = RetcodeTable {
    bad_request: 1400,
    unsupported_action: 1404,
    bad_param: 1400,
    invalid_stage: 1400,
    not_found: 1404,
    forbidden: 1403,
    file: 1404,
    internal: 1000,
    with_message: false,
};

/// The v11 protocol: event codec plus action table.
#[derive(Clone)]
pub struct OneBotV11 {
    ctx: OneBotContext,
    events: V11EventCodec,
    actions: V11Actions,
}

impl OneBotV11 {
    pub fn new(ctx: OneBotContext) -> Self {
        let messages = V11MessageCodec::new(ctx.files.clone());
        let events = V11EventCodec::new(ctx.clone(), messages.clone());
        let actions = V11Actions::new(ctx.clone(), messages, events.clone());
        Self {
            ctx,
            events,
            actions,
        }
    }

    pub fn events(&self) -> &V11EventCodec {
        &self.events
    }
}

#[async_trait]
impl Protocol for OneBotV11 {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn connect_headers(&self, access_token: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-Self-ID".to_owned(), self.ctx.bot_id()),
            ("X-Client-Role".to_owned(), "Universal".to_owned()),
        ];
        headers.extend(bearer(access_token));
        headers
    }

    fn connect_events(&self, _heartbeat: Duration) -> Vec<Value> {
        serde_json::to_value(self.events.lifecycle())
            .into_iter()
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
