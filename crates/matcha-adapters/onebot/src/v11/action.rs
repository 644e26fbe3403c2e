//! OneBot v11 action table.
//!
//! Handlers take typed parameter records and return an [`ActionOutcome`]:
//! response data plus the scenes the call produced. Commands act as the
//! active bot.

use futures::future::join_all;
use matcha_core::scene::MessageScene;
use matcha_core::{
    ActionError, ActionOutcome, ActionRequest, ActionResult, Content, Member, Role, SceneBody,
    parse_message, unix_now,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::event::{Event, V11EventCodec, WireId};
use super::message::V11MessageCodec;
use super::segment::{MessageBody, Segment};
use crate::common::de::{opt_string_like, string_like};
use crate::common::{IMPL_NAME, IMPL_VERSION, OneBotContext};

// ============================================================================
// Action names
// ============================================================================

/// Every action the v11 binding answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendPrivateMsg,
    SendGroupMsg,
    SendMsg,
    DeleteMsg,
    GetMsg,
    SendLike,
    SetGroupKick,
    SetGroupBan,
    SetGroupWholeBan,
    SetGroupAdmin,
    SetGroupAnonymous,
    SetGroupCard,
    SetGroupName,
    SetGroupLeave,
    SetGroupSpecialTitle,
    SetFriendAddRequest,
    SetGroupAddRequest,
    GetLoginInfo,
    GetStrangerInfo,
    GetFriendList,
    GetGroupInfo,
    GetGroupList,
    GetGroupMemberInfo,
    GetGroupMemberList,
    GetImage,
    GetRecord,
    CanSendImage,
    CanSendRecord,
    GetStatus,
    GetVersionInfo,
    CleanCache,
    HandleQuickOperation,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::SendPrivateMsg,
        Action::SendGroupMsg,
        Action::SendMsg,
        Action::DeleteMsg,
        Action::GetMsg,
        Action::SendLike,
        Action::SetGroupKick,
        Action::SetGroupBan,
        Action::SetGroupWholeBan,
        Action::SetGroupAdmin,
        Action::SetGroupAnonymous,
        Action::SetGroupCard,
        Action::SetGroupName,
        Action::SetGroupLeave,
        Action::SetGroupSpecialTitle,
        Action::SetFriendAddRequest,
        Action::SetGroupAddRequest,
        Action::GetLoginInfo,
        Action::GetStrangerInfo,
        Action::GetFriendList,
        Action::GetGroupInfo,
        Action::GetGroupList,
        Action::GetGroupMemberInfo,
        Action::GetGroupMemberList,
        Action::GetImage,
        Action::GetRecord,
        Action::CanSendImage,
        Action::CanSendRecord,
        Action::GetStatus,
        Action::GetVersionInfo,
        Action::CleanCache,
        Action::HandleQuickOperation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::SendPrivateMsg => "send_private_msg",
            Action::SendGroupMsg => "send_group_msg",
            Action::SendMsg => "send_msg",
            Action::DeleteMsg => "delete_msg",
            Action::GetMsg => "get_msg",
            Action::SendLike => "send_like",
            Action::SetGroupKick => "set_group_kick",
            Action::SetGroupBan => "set_group_ban",
            Action::SetGroupWholeBan => "set_group_whole_ban",
            Action::SetGroupAdmin => "set_group_admin",
            Action::SetGroupAnonymous => "set_group_anonymous",
            Action::SetGroupCard => "set_group_card",
            Action::SetGroupName => "set_group_name",
            Action::SetGroupLeave => "set_group_leave",
            Action::SetGroupSpecialTitle => "set_group_special_title",
            Action::SetFriendAddRequest => "set_friend_add_request",
            Action::SetGroupAddRequest => "set_group_add_request",
            Action::GetLoginInfo => "get_login_info",
            Action::GetStrangerInfo => "get_stranger_info",
            Action::GetFriendList => "get_friend_list",
            Action::GetGroupInfo => "get_group_info",
            Action::GetGroupList => "get_group_list",
            Action::GetGroupMemberInfo => "get_group_member_info",
            Action::GetGroupMemberList => "get_group_member_list",
            Action::GetImage => "get_image",
            Action::GetRecord => "get_record",
            Action::CanSendImage => "can_send_image",
            Action::CanSendRecord => "can_send_record",
            Action::GetStatus => "get_status",
            Action::GetVersionInfo => "get_version_info",
            Action::CleanCache => "clean_cache",
            Action::HandleQuickOperation => ".handle_quick_operation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }
}

// ============================================================================
// Parameters
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_ban_duration() -> i64 {
    30 * 60
}

fn default_title_duration() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
pub struct SendPrivateMsgParams {
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
    pub message: MessageBody,
    #[serde(default)]
    pub auto_escape: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendGroupMsgParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    pub message: MessageBody,
    #[serde(default)]
    pub auto_escape: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMsgParams {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub group_id: Option<String>,
    pub message: MessageBody,
    #[serde(default)]
    pub auto_escape: bool,
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
pub struct SetGroupBanParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
    #[serde(default = "default_ban_duration")]
    pub duration: i64,
}

#[derive(Debug, Deserialize)]
pub struct GroupToggleParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(default = "default_true")]
    pub enable: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupAdminParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
    #[serde(default = "default_true")]
    pub enable: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupCardParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
    #[serde(default)]
    pub card: String,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupNameParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupSpecialTitleParams {
    #[serde(deserialize_with = "string_like")]
    pub group_id: String,
    #[serde(deserialize_with = "string_like")]
    pub user_id: String,
    #[serde(default)]
    pub special_title: String,
    #[serde(default = "default_title_duration")]
    pub duration: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetFriendAddRequestParams {
    pub flag: String,
    #[serde(default = "default_true")]
    pub approve: bool,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Deserialize)]
pub struct SetGroupAddRequestParams {
    pub flag: String,
    #[serde(default = "default_true")]
    pub approve: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub file: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickOperationParams {
    pub context: Event,
    pub operation: QuickOperation,
}

/// Shortcut operations on an event the bot received.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuickOperation {
    pub reply: Option<MessageBody>,
    pub auto_escape: bool,
    /// Mention the sender in a group reply; defaults to true.
    pub at_sender: Option<bool>,
    pub delete: bool,
    pub kick: bool,
    pub ban: bool,
    pub ban_duration: Option<i64>,
    pub approve: Option<bool>,
    pub remark: String,
    pub reason: String,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The v11 handlers.
#[derive(Clone)]
pub struct V11Actions {
    ctx: OneBotContext,
    messages: V11MessageCodec,
    events: V11EventCodec,
}

fn message_sent(scene: matcha_core::Scene) -> ActionOutcome {
    let message_id = scene
        .as_message()
        .map(|m| WireId::from(&m.fields().message_id))
        .unwrap_or_default();
    ActionOutcome::data(json!({ "message_id": message_id })).with_scene(scene)
}

impl V11Actions {
    pub fn new(ctx: OneBotContext, messages: V11MessageCodec, events: V11EventCodec) -> Self {
        Self {
            ctx,
            messages,
            events,
        }
    }

    pub async fn call(&self, action: Action, request: &ActionRequest) -> ActionResult {
        match action {
            Action::SendPrivateMsg => self.send_private_msg(request.parse_params()?).await,
            Action::SendGroupMsg => self.send_group_msg(request.parse_params()?).await,
            Action::SendMsg => self.send_msg(request.parse_params()?).await,
            Action::DeleteMsg => self.delete_msg(request.parse_params()?).await,
            Action::GetMsg => self.get_msg(request.parse_params()?).await,
            Action::SendLike => self.send_like(request.parse_params()?).await,
            Action::SetGroupKick => self.set_group_kick(request.parse_params()?).await,
            Action::SetGroupBan => self.set_group_ban(request.parse_params()?).await,
            Action::SetGroupWholeBan => self.set_group_whole_ban(request.parse_params()?).await,
            Action::SetGroupAdmin => self.set_group_admin(request.parse_params()?).await,
            Action::SetGroupAnonymous => self.set_group_anonymous(request.parse_params()?).await,
            Action::SetGroupCard => self.set_group_card(request.parse_params()?).await,
            Action::SetGroupName => self.set_group_name(request.parse_params()?).await,
            Action::SetGroupLeave => self.set_group_leave(request.parse_params()?).await,
            Action::SetGroupSpecialTitle => {
                self.set_group_special_title(request.parse_params()?).await
            }
            Action::SetFriendAddRequest => {
                self.set_friend_add_request(request.parse_params()?).await
            }
            Action::SetGroupAddRequest => self.set_group_add_request(request.parse_params()?).await,
            Action::GetLoginInfo => self.get_login_info(),
            Action::GetStrangerInfo => self.get_stranger_info(request.parse_params()?).await,
            Action::GetFriendList => self.get_friend_list().await,
            Action::GetGroupInfo => self.get_group_info(request.parse_params()?).await,
            Action::GetGroupList => self.get_group_list().await,
            Action::GetGroupMemberInfo => self.get_group_member_info(request.parse_params()?).await,
            Action::GetGroupMemberList => self.get_group_member_list(request.parse_params()?).await,
            Action::GetImage | Action::GetRecord => self.get_file(request.parse_params()?).await,
            Action::CanSendImage | Action::CanSendRecord => {
                Ok(ActionOutcome::data(json!({ "yes": true })))
            }
            Action::GetStatus => Ok(ActionOutcome::data(json!({ "online": true, "good": true }))),
            Action::GetVersionInfo => Ok(ActionOutcome::data(json!({
                "app_name": IMPL_NAME,
                "app_version": IMPL_VERSION,
                "protocol_version": "v11",
            }))),
            Action::CleanCache => Ok(ActionOutcome::empty()),
            Action::HandleQuickOperation => {
                self.handle_quick_operation(request.parse_params()?).await
            }
        }
    }

    /// Segments as submitted (after CQ parsing) plus their canonical contents.
    async fn read_message(
        &self,
        body: MessageBody,
        auto_escape: bool,
    ) -> ActionResult<(Vec<Content>, Value)> {
        let segments = body.into_segments(auto_escape);
        let original =
            serde_json::to_value(&segments).map_err(|e| ActionError::internal(e.to_string()))?;
        let contents = parse_message(&self.messages, &segments).await?;
        if contents.is_empty() {
            return Err(ActionError::bad_param("message is empty"));
        }
        Ok((contents, original))
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_private_msg(&self, params: SendPrivateMsgParams) -> ActionResult {
        let behav = &self.ctx.behav;
        let target = behav.require_user(&params.user_id).await?;
        let bot = self.ctx.bot_user().await?;
        let (contents, original) = self.read_message(params.message, params.auto_escape).await?;
        let scene = behav
            .send_private_message(&bot, &target, contents, Some(original))
            .await?;
        Ok(message_sent(scene))
    }

    pub async fn send_group_msg(&self, params: SendGroupMsgParams) -> ActionResult {
        let behav = &self.ctx.behav;
        let group = behav.require_group(&params.group_id).await?;
        let bot = self.ctx.bot_user().await?;
        let (contents, original) = self.read_message(params.message, params.auto_escape).await?;
        let scene = behav
            .send_group_message(&bot, &group, contents, Some(original), None)
            .await?;
        Ok(message_sent(scene))
    }

    pub async fn send_msg(&self, params: SendMsgParams) -> ActionResult {
        let to_group = match params.message_type.as_deref() {
            Some("group") => true,
            Some("private") => false,
            Some(other) => {
                return Err(ActionError::bad_param(format!("unknown message_type: {other}")));
            }
            None => params.group_id.is_some(),
        };
        if to_group {
            let group_id = params
                .group_id
                .ok_or_else(|| ActionError::bad_param("group_id is required"))?;
            self.send_group_msg(SendGroupMsgParams {
                group_id,
                message: params.message,
                auto_escape: params.auto_escape,
            })
            .await
        } else {
            let user_id = params
                .user_id
                .ok_or_else(|| ActionError::bad_param("user_id is required"))?;
            self.send_private_msg(SendPrivateMsgParams {
                user_id,
                message: params.message,
                auto_escape: params.auto_escape,
            })
            .await
        }
    }

    pub async fn delete_msg(&self, params: MessageIdParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .recall_message(&params.message_id, &self.ctx.bot_id())
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn get_msg(&self, params: MessageIdParams) -> ActionResult {
        let entry = self
            .ctx
            .behav
            .chat()
            .find_message(&params.message_id)
            .ok_or_else(|| ActionError::not_found(format!("message {} not found", params.message_id)))?;
        let Some(message) = entry.scene.as_message() else {
            return Err(ActionError::not_found("not a message"));
        };
        let fields = message.fields();
        let sender = self.events.sender(fields).await?;
        let body = self.events.message_body(fields).await?;
        Ok(ActionOutcome::data(json!({
            "time": entry.scene.time,
            "message_type": message.detail_type(),
            "message_id": WireId::from(&fields.message_id),
            "real_id": WireId::from(&fields.message_id),
            "sender": { "user_id": sender.user_id, "nickname": sender.nickname },
            "message": body,
        })))
    }

    pub async fn send_like(&self, params: UserParams) -> ActionResult {
        self.ctx.behav.require_user(&params.user_id).await?;
        debug!(user_id = %params.user_id, "Like sent");
        Ok(ActionOutcome::empty())
    }

    // ------------------------------------------------------------------
    // Group management
    // ------------------------------------------------------------------

    pub async fn set_group_kick(&self, params: MemberParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .kick_member(&params.group_id, &params.user_id, &self.ctx.bot_id())
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_ban(&self, params: SetGroupBanParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_member_ban(&params.group_id, &params.user_id, &self.ctx.bot_id(), params.duration)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_whole_ban(&self, params: GroupToggleParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_whole_ban(&params.group_id, &self.ctx.bot_id(), params.enable)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_admin(&self, params: SetGroupAdminParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_admin(&params.group_id, &params.user_id, &self.ctx.bot_id(), params.enable)
            .await?;
        Ok(ActionOutcome::empty().with_scenes(scene))
    }

    pub async fn set_group_anonymous(&self, params: GroupToggleParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_anonymous(&params.group_id, &self.ctx.bot_id(), params.enable)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_card(&self, params: SetGroupCardParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_card(&params.group_id, &params.user_id, &self.ctx.bot_id(), &params.card)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_name(&self, params: SetGroupNameParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .rename_group(&params.group_id, &self.ctx.bot_id(), &params.group_name)
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_leave(&self, params: GroupParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .leave_group(&params.group_id, &self.ctx.bot_id())
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    pub async fn set_group_special_title(&self, params: SetGroupSpecialTitleParams) -> ActionResult {
        let scene = self
            .ctx
            .behav
            .set_title(
                &params.group_id,
                &params.user_id,
                &self.ctx.bot_id(),
                &params.special_title,
                params.duration,
            )
            .await?;
        Ok(ActionOutcome::empty().with_scene(scene))
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    pub async fn set_friend_add_request(&self, params: SetFriendAddRequestParams) -> ActionResult {
        let follow_up = self
            .ctx
            .behav
            .resolve_request(&params.flag, params.approve, &self.ctx.bot_id(), &params.remark)
            .await?;
        Ok(ActionOutcome::empty().with_scenes(follow_up))
    }

    pub async fn set_group_add_request(&self, params: SetGroupAddRequestParams) -> ActionResult {
        if !params.approve && !params.reason.is_empty() {
            debug!(flag = %params.flag, reason = %params.reason, "Group request refused");
        }
        let follow_up = self
            .ctx
            .behav
            .resolve_request(&params.flag, params.approve, &self.ctx.bot_id(), "")
            .await?;
        Ok(ActionOutcome::empty().with_scenes(follow_up))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    fn get_login_info(&self) -> ActionResult {
        let bot = self
            .ctx
            .behav
            .bot()
            .get()
            .ok_or_else(|| ActionError::not_found("no bot is assigned"))?;
        Ok(ActionOutcome::data(json!({
            "user_id": WireId::from(&bot.id),
            "nickname": bot.name,
        })))
    }

    pub async fn get_stranger_info(&self, params: UserParams) -> ActionResult {
        let user = self.ctx.behav.require_user(&params.user_id).await?;
        Ok(ActionOutcome::data(json!({
            "user_id": WireId::from(&user.id),
            "nickname": user.name,
            "sex": user.sex.as_str(),
            "age": user.age(unix_now()),
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
                "user_id": WireId::from(&user.id),
                "nickname": user.name,
                "remark": friend.remark,
            }));
        }
        Ok(ActionOutcome::data(Value::Array(list)))
    }

    async fn group_info(&self, group_id: &str) -> ActionResult<Value> {
        let store = self.ctx.behav.store();
        let group = self.ctx.behav.require_group(group_id).await?;
        let member_count = store.members_of_group(group_id).await?.len();
        Ok(json!({
            "group_id": WireId::from(&group.id),
            "group_name": group.name,
            "member_count": member_count,
            "max_member_count": group.max_member_count,
        }))
    }

    pub async fn get_group_info(&self, params: GroupParams) -> ActionResult {
        Ok(ActionOutcome::data(self.group_info(&params.group_id).await?))
    }

    pub async fn get_group_list(&self) -> ActionResult {
        let memberships = self
            .ctx
            .behav
            .store()
            .memberships_of_user(&self.ctx.bot_id())
            .await?;
        let groups = join_all(memberships.iter().map(|m| self.group_info(&m.group_id)))
            .await
            .into_iter()
            .collect::<ActionResult<Vec<_>>>()?;
        Ok(ActionOutcome::data(Value::Array(groups)))
    }

    async fn member_info(&self, member: &Member) -> ActionResult<Value> {
        let user = self.ctx.behav.store().user(&member.user_id).await?;
        let (nickname, sex, age) = user.map_or((String::new(), "unknown", 0), |u| {
            (u.name.clone(), u.sex.as_str(), u.age(unix_now()))
        });
        Ok(json!({
            "group_id": WireId::from(&member.group_id),
            "user_id": WireId::from(&member.user_id),
            "nickname": nickname,
            "card": member.card,
            "sex": sex,
            "age": age,
            "area": "",
            "join_time": member.join_time,
            "last_sent_time": member.last_sent_time,
            "level": member.level.to_string(),
            "role": member.role,
            "unfriendly": false,
            "title": member.title,
            "title_expire_time": member.title_expire_time,
            "card_changeable": true,
        }))
    }

    pub async fn get_group_member_info(&self, params: MemberParams) -> ActionResult {
        let member = self
            .ctx
            .behav
            .require_member(&params.group_id, &params.user_id)
            .await?;
        Ok(ActionOutcome::data(self.member_info(&member).await?))
    }

    pub async fn get_group_member_list(&self, params: GroupParams) -> ActionResult {
        self.ctx.behav.require_group(&params.group_id).await?;
        let members = self
            .ctx
            .behav
            .store()
            .members_of_group(&params.group_id)
            .await?;
        let list = join_all(members.iter().map(|m| self.member_info(m)))
            .await
            .into_iter()
            .collect::<ActionResult<Vec<_>>>()?;
        Ok(ActionOutcome::data(Value::Array(list)))
    }

    /// Answers `get_image` and `get_record` with the cached file's local path.
    pub async fn get_file(&self, params: FileParams) -> ActionResult {
        let path = self.ctx.files.path(&params.file).await?;
        Ok(ActionOutcome::data(json!({ "file": path })))
    }

    // ------------------------------------------------------------------
    // Quick operation
    // ------------------------------------------------------------------

    /// Applies a quick operation by calling the named handlers.
    pub async fn handle_quick_operation(&self, params: QuickOperationParams) -> ActionResult {
        let scene = self
            .events
            .parse(&params.context)
            .await?
            .ok_or_else(|| ActionError::bad_param("quick operation needs a message or request event"))?;
        let op = params.operation;
        let mut outcome = ActionOutcome::empty();

        match &scene.body {
            SceneBody::Message(MessageScene::Private(p)) => {
                if let Some(reply) = op.reply {
                    let sent = self
                        .send_private_msg(SendPrivateMsgParams {
                            user_id: p.fields.user_id.clone(),
                            message: reply,
                            auto_escape: op.auto_escape,
                        })
                        .await?;
                    outcome.scenes.extend(sent.scenes);
                }
            }
            SceneBody::Message(MessageScene::Group(g)) => {
                let user_id = &g.fields.user_id;
                let bot_id = self.ctx.bot_id();
                // nothing is sent unless every requested step is permitted
                if op.kick || op.ban || (op.delete && *user_id != bot_id) {
                    self.ctx
                        .behav
                        .require_manage(Role::Admin, &g.group_id, &bot_id, user_id)
                        .await?;
                }
                if let Some(reply) = op.reply {
                    let mut segments = reply.into_segments(op.auto_escape);
                    if op.at_sender.unwrap_or(true) {
                        segments.splice(0..0, [Segment::at(user_id.clone()), Segment::text(" ")]);
                    }
                    let sent = self
                        .send_group_msg(SendGroupMsgParams {
                            group_id: g.group_id.clone(),
                            message: MessageBody::Segments(segments),
                            auto_escape: false,
                        })
                        .await?;
                    outcome.scenes.extend(sent.scenes);
                }
                if op.delete {
                    let deleted = self
                        .delete_msg(MessageIdParams {
                            message_id: g.fields.message_id.clone(),
                        })
                        .await?;
                    outcome.scenes.extend(deleted.scenes);
                }
                if op.kick {
                    let kicked = self
                        .set_group_kick(MemberParams {
                            group_id: g.group_id.clone(),
                            user_id: user_id.clone(),
                        })
                        .await?;
                    outcome.scenes.extend(kicked.scenes);
                } else if op.ban {
                    let banned = self
                        .set_group_ban(SetGroupBanParams {
                            group_id: g.group_id.clone(),
                            user_id: user_id.clone(),
                            duration: op.ban_duration.unwrap_or_else(default_ban_duration),
                        })
                        .await?;
                    outcome.scenes.extend(banned.scenes);
                }
            }
            SceneBody::Request(request) => {
                if let Some(approve) = op.approve {
                    let resolved = if request.detail_type() == "add_friend" {
                        self.set_friend_add_request(SetFriendAddRequestParams {
                            flag: scene.id.clone(),
                            approve,
                            remark: op.remark,
                        })
                        .await?
                    } else {
                        self.set_group_add_request(SetGroupAddRequestParams {
                            flag: scene.id.clone(),
                            approve,
                            reason: op.reason,
                        })
                        .await?
                    };
                    outcome.scenes.extend(resolved.scenes);
                }
            }
            SceneBody::Notice(_) => {}
        }
        Ok(outcome)
    }
}
