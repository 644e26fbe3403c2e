//! Pieces shared by both protocol versions.

use std::sync::Arc;

use matcha_core::{
    ActionRequest, ActionResponse, ActionResult, Behav, FileCache, RetcodeTable, Scene, User,
};
use tracing::{debug, error};

use crate::config::OneBotConfig;

/// Implementation name reported in version info and handshake headers.
pub const IMPL_NAME: &str = "matcha";

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Collaborators every binding needs.
#[derive(Clone)]
pub struct OneBotContext {
    pub behav: Arc<Behav>,
    pub files: Arc<FileCache>,
    pub config: OneBotConfig,
}

impl OneBotContext {
    pub fn new(behav: Arc<Behav>, files: Arc<FileCache>, config: OneBotConfig) -> Self {
        Self {
            behav,
            files,
            config,
        }
    }

    /// Id of the active bot, read at call time.
    pub fn bot_id(&self) -> String {
        self.behav.bot().id()
    }

    /// The store record of the active bot.
    pub async fn bot_user(&self) -> ActionResult<User> {
        self.behav.require_user(&self.bot_id()).await
    }
}

/// Turns a handler result into the wire response, logging the outcome.
pub(crate) fn finish(
    protocol: &'static str,
    table: &RetcodeTable,
    request: &ActionRequest,
    result: ActionResult,
) -> (ActionResponse, Vec<Scene>) {
    match result {
        Ok(outcome) => {
            debug!(protocol, action = %request.action, scenes = outcome.scenes.len(), "Action succeeded");
            (
                table.success(outcome.data).with_echo(request.echo.clone()),
                outcome.scenes,
            )
        }
        Err(err) => {
            let response = table.failure(&err).with_echo(request.echo.clone());
            if err.is_client_error() {
                debug!(protocol, action = %request.action, retcode = response.retcode, error = %err, "Action rejected");
            } else {
                error!(protocol, action = %request.action, retcode = response.retcode, error = %err, "Action handler failed");
            }
            (response, Vec::new())
        }
    }
}

/// Lenient field decoders: bot programs send ids as numbers or strings.
pub mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringLike {
        Str(String),
        Int(i64),
        UInt(u64),
        Float(f64),
        Bool(bool),
    }

    impl From<StringLike> for String {
        fn from(value: StringLike) -> Self {
            match value {
                StringLike::Str(s) => s,
                StringLike::Int(i) => i.to_string(),
                StringLike::UInt(u) => u.to_string(),
                StringLike::Float(f) => f.to_string(),
                StringLike::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn string_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        StringLike::deserialize(deserializer).map(String::from)
    }

    pub fn opt_string_like<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(Option::<StringLike>::deserialize(deserializer)?.map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Ids {
        #[serde(deserialize_with = "de::string_like")]
        user_id: String,
        #[serde(default, deserialize_with = "de::opt_string_like")]
        group_id: Option<String>,
    }

    #[test]
    fn test_string_like_ids() {
        let ids: Ids = serde_json::from_value(json!({"user_id": 10001})).unwrap();
        assert_eq!(ids.user_id, "10001");
        assert_eq!(ids.group_id, None);

        let ids: Ids = serde_json::from_value(json!({"user_id": "abc", "group_id": 7})).unwrap();
        assert_eq!(ids.user_id, "abc");
        assert_eq!(ids.group_id.as_deref(), Some("7"));
    }
}
