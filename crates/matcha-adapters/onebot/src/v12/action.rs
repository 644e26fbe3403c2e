//! OneBot v12 action table.

use std::sync::Arc;

use futures::future::join_all;
use matcha_core::{
    ActionError, ActionOutcome, ActionRequest, ActionResult, FileSource, Payload, parse_message,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::event::{V12EventCodec, VersionInfo};
use super::fragment::FragmentSessions;
use super::message::{Segment, V12MessageCodec};
use crate::common::OneBotContext;
use crate::common::de::{opt_string_like, string_like};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetSupportedActions,
    GetStatus,
    GetVersion,
    SendMessage,
    DeleteMessage,
    GetSelfInfo,
    GetUserInfo,
    GetFriendList,
    GetGroupInfo,
    GetGroupList,
    GetGroupMemberInfo,
    GetGroupMemberList,
    SetGroupName,
    LeaveGroup,
    UploadFile,
    UploadFileFragmented,
    GetFile,
    GetFileFragmented,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::GetSupportedActions,
        Action::GetStatus,
        Action::GetVersion,
        Action::SendMessage,
        Action::DeleteMessage,
        Action::GetSelfInfo,
        Action::GetUserInfo,
        Action::GetFriendList,
        Action::GetGroupInfo,
        Action::GetGroupList,
        Action::GetGroupMemberInfo,
        Action::GetGroupMemberList,
        Action::SetGroupName,
        Action::LeaveGroup,
        Action::UploadFile,
        Action::UploadFileFragmented,
        Action::GetFile,
        Action::GetFileFragmented,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::GetSupportedActions => "get_supported_actions",
            Action::GetStatus => "get_status",
            Action::GetVersion => "get_version",
            Action::SendMessage => "send_message",
            Action::DeleteMessage => "delete_message",
            Action::GetSelfInfo => "get_self_info",
            Action::GetUserInfo => "get_user_info",
            Action::GetFriendList => "get_friend_list",
            Action::GetGroupInfo => "get_group_info",
            Action::GetGroupList => "get_group_list",
            Action::GetGroupMemberInfo => "get_group_member_info",
            Action::GetGroupMemberList => "get_group_member_list",
            Action::SetGroupName => "set_group_name",
            Action::LeaveGroup => "leave_group",
            Action::UploadFile => "upload_file",
            Action::UploadFileFragmented => "upload_file_fragmented",
            Action::GetFile => "get_file",
            Action::GetFileFragmented => "get_file_fragmented",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendMessageParams {
    pub detail_type: String,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub group_id: Option<String>,
    pub message: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
pub struct MessageIdParams {
    #[serde(deserialize_with = "string_like")]
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupNameParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFileParams {
    #[serde(rename = "type")]
    pub source_type: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub path: Option<String>,
    /// Base64 text; msgpack bytes arrive already encoded.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StageParams {
    stage: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadPrepareParams {
    pub name: String,
    pub total_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct UploadTransferParams {
    pub file_id: String,
    pub offset: u64,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFinishParams {
    pub file_id: String,
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
pub struct GetFileParams {
    pub file_id: String,
    #[serde(rename = "type")]
    pub fetch_type: String,
}

#[derive(Debug, Deserialize)]
pub struct FileIdParams {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadRangeParams {
    pub file_id: String,
    pub offset: u64,
    pub size: u64,
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Clone)]
pub struct V12Actions {
    ctx: OneBotContext,
    messages: V12MessageCodec,
    events: V12EventCodec,
    fragments: Arc<FragmentSessions>,
}

impl V12Actions {
    pub fn new(ctx: OneBotContext, messages: V12MessageCodec, events: V12EventCodec) -> Self {
        let fragments = Arc::new(FragmentSessions::new(
            ctx.files.clone(),
            ctx.config.fragment_ttl(),
            ctx.config.max_upload_size,
        ));
        Self {
            ctx,
            messages,
            events,
            fragments,
        }
    }

    pub async fn call(&self, action: Action, request: &ActionRequest) -> ActionResult {
        match action {
            Action::GetSupportedActions => Ok(ActionOutcome::data(json!(
                Action::ALL.iter().map(|a| a.name()).collect::<Vec<_>>()
            ))),
            Action::GetStatus => Ok(ActionOutcome::data(json!(self.events.status()))),
            Action::GetVersion => Ok(ActionOutcome::data(json!(VersionInfo::current()))),
            Action::SendMessage => self.send_message(request.parse_params()?).await,
            Action::DeleteMessage => self.delete_message(request.parse_params()?).await,
            Action::GetSelfInfo => self.get_self_info(),
            Action::GetUserInfo => self.get_user_info(request.parse_params()?).await,
            Action::GetFriendList => self.get_friend_list().await,
            Action::GetGroupInfo => self.get_group_info(request.parse_params()?).await,
            Action::GetGroupList => self.get_group_list().await,
            Action::GetGroupMemberInfo => self.get_group_member_info(request.parse_params()?).await,
            Action::GetGroupMemberList => self.get_group_member_list(request.parse_params()?).await,
            Action::SetGroupName => self.set_group_name(request.parse_params()?).await,
            Action::LeaveGroup => self.leave_group(request.parse_params()?).await,
            Action::UploadFile => self.upload_file(request.parse_params()?).await,
            Action::UploadFileFragmented => self.upload_file_fragmented(request).await,
            Action::GetFile => self.get_file(request.parse_params()?).await,
            Action::GetFileFragmented => self.get_file_fragmented(request).await,
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_message(&self, params: SendMessageParams) -> ActionResult {
        let behav = &self.ctx.behav;
        let missing = |field: &str| ActionError::bad_param(format!("{field} is required"));
        let original =
            serde_json::to_value(&params.message).map_err(|e| ActionError::internal(e.to_string()))?;

        let scene = match params.detail_type.as_str() {
            "private" => {
                let user_id = params.user_id.ok_or_else(|| missing("user_id"))?;
                let target = behav.require_user(&user_id).await?;
                let bot = self.ctx.bot_user().await?;
                let contents = self.read_message(&params.message).await?;
                behav
                    .send_private_message(&bot, &target, contents, Some(original))
                    .await?
            }
            "group" => {
                let group_id = params.group_id.ok_or_else(|| missing("group_id"))?;
                let group = behav.require_group(&group_id).await?;
                let bot = self.ctx.bot_user().await?;
                let contents = self.read_message(&params.message).await?;
                behav
                    .send_group_message(&bot, &group, contents, Some(original), None)
                    .await?
            }
            other => {
                return Err(ActionError::bad_param(format!("unsupported detail_type: {other}")));
            }
        };
        let message_id = scene
            .as_message()
            .map(|m| m.fields().message_id.clone())
            .unwrap_or_default();
        Ok(ActionOutcome::data(json!({
            "message_id": message_id,
            "time": scene.time,
        }))
        .with_scene(scene))
    }

    async fn read_message(&self, segments: &[Segment]) -> ActionResult<Vec<matcha_core::Content>> {
        let contents = parse_message(&self.messages, segments).await?;
        if contents.is_empty() {
            return Err(ActionError::bad_param("message is empty"));
        }
        Ok(contents)
    }

    pub async fn delete_message(&self, params: MessageIdParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .recall_message(&params.message_id, &self.ctx.bot_id())
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    // ------------------------------------------------------------------
    // Users and groups
    // ------------------------------------------------------------------

    fn get_self_info(&self) -> ActionResult {
        let bot = self
            .ctx
            .behav
            .bot()
            .get()
            .ok_or_else(|| ActionError::not_found("no bot is assigned"))?;
        Ok(ActionOutcome::data(json!({
            "user_id": bot.id,
            "user_name": bot.name,
            "user_displayname": "",
        })))
    }

    pub async fn get_user_info(&self, params: UserParams) -> ActionResult {
        let user = self.ctx.behav.require_user(&params.user_id).await?;
        let remark = self
            .ctx
            .behav
            .store()
            .friend(&self.ctx.bot_id(), &user.id)
            .await?
            .map(|f| f.remark)
            .unwrap_or_default();
        Ok(ActionOutcome::data(json!({
            "user_id": user.id,
            "user_name": user.name,
            "user_displayname": "",
            "user_remark": remark,
        })))
    }

    pub async fn get_friend_list(&self) -> ActionResult {
        let store = self.ctx.behav.store();
        let friends = store.friends_of(&self.ctx.bot_id()).await?;
        let users = join_all(friends.iter().map(|f| store.user(&f.friend_id))).await;
        let mut list = Vec::with_capacity(friends.len());
        for (friend, user) in friends.iter().zip(users) {
            let Some(user) = user? else { continue };
            list.push(json!({
                "user_id": user.id,
                "user_name": user.name,
                "user_displayname": "",
                "user_remark": friend.remark,
            }));
        }
        Ok(ActionOutcome::data(json!(list)))
    }

    pub async fn get_group_info(&self, params: GroupParams) -> ActionResult {
        let group = self.ctx.behav.require_group(&params.group_id).await?;
        Ok(ActionOutcome::data(json!({
            "group_id": group.id,
            "group_name": group.name,
        })))
    }

    pub async fn get_group_list(&self) -> ActionResult {
        let store = self.ctx.behav.store();
        let memberships = store.memberships_of_user(&self.ctx.bot_id()).await?;
        let groups = join_all(memberships.iter().map(|m| store.group(&m.group_id))).await;
        let mut list = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(group) = group? else { continue };
            list.push(json!({ "group_id": group.id, "group_name": group.name }));
        }
        Ok(ActionOutcome::data(json!(list)))
    }

    pub async fn get_group_member_info(&self, params: MemberParams) -> ActionResult {
        let behav = &self.ctx.behav;
        let member = behav.require_member(&params.group_id, &params.user_id).await?;
        let user = behav.require_user(&params.user_id).await?;
        Ok(ActionOutcome::data(json!({
            "user_id": user.id,
            "user_name": user.name,
            "user_displayname": member.card,
        })))
    }

    pub async fn get_group_member_list(&self, params: GroupParams) -> ActionResult {
        let behav = &self.ctx.behav;
        behav.require_group(&params.group_id).await?;
        let store = behav.store();
        let members = store.members_of_group(&params.group_id).await?;
        let users = join_all(members.iter().map(|m| store.user(&m.user_id))).await;
        let mut list = Vec::with_capacity(members.len());
        for (member, user) in members.iter().zip(users) {
            let Some(user) = user? else { continue };
            list.push(json!({
                "user_id": user.id,
                "user_name": user.name,
                "user_displayname": member.card,
            }));
        }
        Ok(ActionOutcome::data(json!(list)))
    }

    pub async fn set_group_name(&self, params: SetGroupNameParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .rename_group(&params.group_id, &self.ctx.bot_id(), &params.group_name)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn leave_group(&self, params: GroupParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .leave_group(&params.group_id, &self.ctx.bot_id())
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    pub async fn upload_file(&self, params: UploadFileParams) -> ActionResult {
        if let Some(sha256) = &params.sha256
            && let Some(file) = self.ctx.behav.store().file_by_sha256(sha256).await?
        {
            return Ok(ActionOutcome::data(json!({ "file_id": file.id })));
        }
        let source = match params.source_type.as_str() {
            "url" => {
                if params.headers.is_some() {
                    debug!(name = %params.name, "Ignoring upload headers");
                }
                params.url
            }
            "path" => params.path.map(|p| {
                if p.starts_with("file://") {
                    p
                } else {
                    format!("file://{p}")
                }
            }),
            "data" => params.data,
            other => return Err(ActionError::bad_param(format!("unknown upload type: {other}"))),
        }
        .ok_or_else(|| {
            ActionError::bad_param(format!("{} upload without its field", params.source_type))
        })?;

        let cached = self
            .ctx
            .files
            .create(
                FileSource::Str(source),
                Some(params.name),
                params.sha256.as_deref(),
            )
            .await?;
        Ok(ActionOutcome::data(json!({ "file_id": cached.id })))
    }

    pub async fn upload_file_fragmented(&self, request: &ActionRequest) -> ActionResult {
        let StageParams { stage } = request.parse_params()?;
        match stage.as_str() {
            "prepare" => {
                let params: UploadPrepareParams = request.parse_params()?;
                let file_id = self.fragments.prepare(params.name, params.total_size).await?;
                Ok(ActionOutcome::data(json!({ "file_id": file_id })))
            }
            "transfer" => {
                let params: UploadTransferParams = request.parse_params()?;
                self.fragments
                    .transfer(&params.file_id, params.offset, FileSource::Str(params.data))
                    .await?;
                Ok(ActionOutcome::empty())
            }
            "finish" => {
                let params: UploadFinishParams = request.parse_params()?;
                let file = self.fragments.finish(&params.file_id, &params.sha256).await?;
                Ok(ActionOutcome::data(json!({ "file_id": file.id })))
            }
            other => Err(ActionError::invalid_stage(format!("unknown upload stage: {other}"))),
        }
    }

    pub async fn get_file(&self, params: GetFileParams) -> ActionResult {
        let files = &self.ctx.files;
        let info = files.info(&params.file_id).await?;
        let (key, value) = match params.fetch_type.as_str() {
            "url" => ("url", Payload::from(files.url(&info.id).await?)),
            "path" => ("path", Payload::from(files.path(&info.id).await?)),
            "data" => ("data", Payload::Bytes(files.data(&info.id).await?)),
            other => return Err(ActionError::invalid_stage(format!("unknown fetch type: {other}"))),
        };
        Ok(ActionOutcome::data(Payload::map([
            ("name", Payload::from(info.name)),
            ("sha256", Payload::from(info.sha256)),
            (key, value),
        ])))
    }

    pub async fn get_file_fragmented(&self, request: &ActionRequest) -> ActionResult {
        let StageParams { stage } = request.parse_params()?;
        match stage.as_str() {
            "prepare" => {
                let params: FileIdParams = request.parse_params()?;
                let info = self.ctx.files.info(&params.file_id).await?;
                Ok(ActionOutcome::data(json!({
                    "name": info.name,
                    "total_size": info.size,
                    "sha256": info.sha256,
                })))
            }
            "transfer" => {
                let params: ReadRangeParams = request.parse_params()?;
                let data = self
                    .ctx
                    .files
                    .read_range(&params.file_id, params.offset, params.size)
                    .await?;
                Ok(ActionOutcome::data(Payload::map([("data", Payload::Bytes(data))])))
            }
            other => Err(ActionError::invalid_stage(format!("unknown fetch stage: {other}"))),
        }
    }
}
