//! Behaviour layer: state-changing operations that produce scenes.
//!
//! Every operation validates permissions against the store, applies the
//! mutation and returns the scene describing it. Publishing the scene (event
//! rendering, chat log, wire push) is the caller's job.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::action::{ActionError, ActionResult};
use crate::bot::ActiveBot;
use crate::chat::{ChatLog, RequestAction};
use crate::content::Content;
use crate::guard::{EntityLocks, SYSTEM_OPERATOR, can_manage, role_check};
use crate::plain::plain_message;
use crate::scene::*;
use crate::store::{CacheFile, Friend, Group, Member, Role, Store, User};

pub struct Behav {
    store: Arc<dyn Store>,
    chat: Arc<ChatLog>,
    bot: ActiveBot,
    locks: EntityLocks,
}

impl Behav {
    pub fn new(store: Arc<dyn Store>, chat: Arc<ChatLog>, bot: ActiveBot) -> Self {
        Self {
            store,
            chat,
            bot,
            locks: EntityLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn chat(&self) -> &Arc<ChatLog> {
        &self.chat
    }

    pub fn bot(&self) -> &ActiveBot {
        &self.bot
    }

    /// Stamps id, time and the current bot onto a scene body.
    pub fn create_scene(&self, talker: impl Into<String>, body: SceneBody) -> Scene {
        Scene {
            id: uuid::Uuid::new_v4().to_string(),
            time: unix_now(),
            self_info: SceneSelf {
                platform: PLATFORM.to_owned(),
                bot_id: self.bot.id(),
            },
            talker: talker.into(),
            body,
        }
    }

    fn notice(&self, talker: &str, notice: NoticeScene) -> Scene {
        self.create_scene(talker, SceneBody::Notice(notice))
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub async fn require_user(&self, id: &str) -> ActionResult<User> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| ActionError::not_found(format!("user {id} not found")))
    }

    pub async fn require_group(&self, id: &str) -> ActionResult<Group> {
        self.store
            .group(id)
            .await?
            .ok_or_else(|| ActionError::not_found(format!("group {id} not found")))
    }

    pub async fn require_member(&self, group_id: &str, user_id: &str) -> ActionResult<Member> {
        self.store.member(group_id, user_id).await?.ok_or_else(|| {
            ActionError::not_found(format!("user {user_id} is not a member of group {group_id}"))
        })
    }

    async fn require_role(&self, required: Role, group_id: &str, operator_id: &str) -> ActionResult<()> {
        if role_check(self.store.as_ref(), required, group_id, operator_id).await? {
            Ok(())
        } else {
            Err(ActionError::forbidden(format!(
                "{operator_id} needs {} in group {group_id}",
                required.as_str()
            )))
        }
    }

    /// Fails with forbidden unless `operator_id` may act on `target_id` as `required`.
    pub async fn require_manage(
        &self,
        required: Role,
        group_id: &str,
        operator_id: &str,
        target_id: &str,
    ) -> ActionResult<()> {
        if can_manage(self.store.as_ref(), required, group_id, operator_id, target_id).await? {
            Ok(())
        } else {
            Err(ActionError::forbidden(format!(
                "{operator_id} may not manage {target_id} in group {group_id}"
            )))
        }
    }

    /// Relationship of two users for a private chat.
    pub async fn private_kind(&self, a: &str, b: &str) -> ActionResult<PrivateKind> {
        if self.store.friend(a, b).await?.is_some() {
            return Ok(PrivateKind::Friend);
        }
        let theirs = self.store.memberships_of_user(b).await?;
        let shared = self
            .store
            .memberships_of_user(a)
            .await?
            .iter()
            .any(|m| theirs.iter().any(|t| t.group_id == m.group_id));
        Ok(if shared { PrivateKind::Group } else { PrivateKind::Temp })
    }

    fn talker_for(&self, a: &str, b: &str) -> String {
        if a == self.bot.id() { b.to_owned() } else { a.to_owned() }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_private_message(
        &self,
        sender: &User,
        receiver: &User,
        contents: Vec<Content>,
        original_message: Option<Value>,
    ) -> ActionResult<Scene> {
        let sub_type = self.private_kind(&sender.id, &receiver.id).await?;
        let plain = plain_message(self.store.as_ref(), &contents, None).await;
        let scene = self.create_scene(
            self.talker_for(&sender.id, &receiver.id),
            SceneBody::Message(MessageScene::Private(PrivateMessage {
                sub_type,
                target_id: receiver.id.clone(),
                fields: MessageFields {
                    message_id: self.chat.next_message_id().to_string(),
                    message: contents,
                    original_message,
                    plain_message: plain,
                    user_id: sender.id.clone(),
                    user_name: sender.name.clone(),
                },
            })),
        );
        debug!(from = %sender.id, to = %receiver.id, "Private message scene created");
        Ok(scene)
    }

    pub async fn send_group_message(
        &self,
        sender: &User,
        group: &Group,
        contents: Vec<Content>,
        original_message: Option<Value>,
        anonymous: Option<AnonymousSender>,
    ) -> ActionResult<Scene> {
        let _guard = self.locks.lock(&group.id, &sender.id).await;
        let mut member = self.store.member(&group.id, &sender.id).await?.ok_or_else(|| {
            ActionError::forbidden(format!("{} is not a member of group {}", sender.id, group.id))
        })?;
        let now = unix_now();
        if member.is_banned(now) {
            return Err(ActionError::forbidden(format!("{} is muted", sender.id)));
        }
        if group.whole_banned && member.role == Role::Member {
            return Err(ActionError::forbidden(format!("group {} is muted", group.id)));
        }
        if anonymous.is_some() && !group.anonymous_enabled {
            return Err(ActionError::forbidden(format!(
                "anonymous chat is disabled in group {}",
                group.id
            )));
        }

        let plain = plain_message(self.store.as_ref(), &contents, Some(&group.id)).await;
        let scene = self.create_scene(
            group.id.clone(),
            SceneBody::Message(MessageScene::Group(GroupMessage {
                sub_type: if anonymous.is_some() {
                    GroupMessageKind::Anonymous
                } else {
                    GroupMessageKind::Normal
                },
                group_id: group.id.clone(),
                group_name: group.name.clone(),
                anonymous,
                member: MemberSnapshot {
                    card: member.card.clone(),
                    role: member.role,
                    level: member.level,
                    title: member.title.clone(),
                },
                fields: MessageFields {
                    message_id: self.chat.next_message_id().to_string(),
                    message: contents,
                    original_message,
                    plain_message: plain,
                    user_id: sender.id.clone(),
                    user_name: sender.name.clone(),
                },
            })),
        );
        member.last_sent_time = now;
        self.store.put_member(member).await?;
        debug!(from = %sender.id, group = %group.id, "Group message scene created");
        Ok(scene)
    }

    /// Recalls a logged message. Authors may recall their own messages;
    /// group managers may delete messages of members they outrank.
    pub async fn recall_message(&self, message_id: &str, operator_id: &str) -> ActionResult<Scene> {
        let message = self
            .chat
            .find_message_scene(message_id)
            .ok_or_else(|| ActionError::not_found(format!("message {message_id} not found")))?;
        let author = message.fields().user_id.clone();
        let scene = match &message {
            MessageScene::Private(p) => {
                if operator_id != author && operator_id != SYSTEM_OPERATOR {
                    return Err(ActionError::forbidden("only the author may recall a private message"));
                }
                self.notice(
                    &self.talker_for(&author, &p.target_id),
                    NoticeScene::PrivateMessageDelete {
                        user_id: author.clone(),
                        message_id: message_id.to_owned(),
                    },
                )
            }
            MessageScene::Group(g) => {
                let sub_type = if operator_id == author {
                    DeleteKind::Recall
                } else {
                    self.require_manage(Role::Admin, &g.group_id, operator_id, &author)
                        .await?;
                    DeleteKind::Delete
                };
                self.notice(
                    &g.group_id,
                    NoticeScene::GroupMessageDelete {
                        sub_type,
                        group_id: g.group_id.clone(),
                        message_id: message_id.to_owned(),
                        user_id: author.clone(),
                        operator_id: operator_id.to_owned(),
                    },
                )
            }
        };
        if !self.chat.mark_recalled(message_id) {
            return Err(ActionError::bad_param(format!("message {message_id} already recalled")));
        }
        Ok(scene)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub async fn kick_member(&self, group_id: &str, user_id: &str, operator_id: &str) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        self.require_member(group_id, user_id).await?;
        self.require_manage(Role::Admin, group_id, operator_id, user_id).await?;
        self.store.delete_member(group_id, user_id).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberDecrease {
                sub_type: DecreaseKind::Remove,
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
            },
        ))
    }

    pub async fn leave_group(&self, group_id: &str, user_id: &str) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        self.require_member(group_id, user_id).await?;
        self.store.delete_member(group_id, user_id).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberDecrease {
                sub_type: DecreaseKind::Leave,
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: user_id.to_owned(),
            },
        ))
    }

    /// Adds a member directly (no request). Fails if already a member.
    pub async fn add_member(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
        sub_type: IncreaseKind,
    ) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        self.require_user(user_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        if self.store.member(group_id, user_id).await?.is_some() {
            return Err(ActionError::bad_param(format!(
                "user {user_id} is already in group {group_id}"
            )));
        }
        let mut member = Member::new(group_id, user_id, Role::Member);
        member.join_time = unix_now();
        member.level = 1;
        self.store.put_member(member).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberIncrease {
                sub_type,
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
            },
        ))
    }

    /// Bans a member for `duration` seconds; zero lifts the ban.
    pub async fn set_member_ban(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
        duration: i64,
    ) -> ActionResult<Scene> {
        if duration < 0 {
            return Err(ActionError::bad_param("duration must not be negative"));
        }
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        let mut member = self.require_member(group_id, user_id).await?;
        self.require_manage(Role::Admin, group_id, operator_id, user_id).await?;
        let (sub_type, duration) = if duration == 0 {
            member.ban_expire_time = 0;
            (BanKind::LiftBan, None)
        } else {
            member.ban_expire_time = unix_now() + duration;
            (BanKind::Ban, Some(duration))
        };
        self.store.put_member(member).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberBan {
                sub_type,
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
                duration,
            },
        ))
    }

    pub async fn set_whole_ban(&self, group_id: &str, operator_id: &str, enable: bool) -> ActionResult<Scene> {
        let _guard = self.locks.lock(group_id, "").await;
        let mut group = self.require_group(group_id).await?;
        self.require_role(Role::Admin, group_id, operator_id).await?;
        group.whole_banned = enable;
        self.store.put_group(group).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupWholeBan {
                sub_type: if enable { WholeBanKind::Open } else { WholeBanKind::Close },
                group_id: group_id.to_owned(),
                operator_id: operator_id.to_owned(),
            },
        ))
    }

    pub async fn set_anonymous(&self, group_id: &str, operator_id: &str, enable: bool) -> ActionResult<Scene> {
        let _guard = self.locks.lock(group_id, "").await;
        let mut group = self.require_group(group_id).await?;
        self.require_role(Role::Admin, group_id, operator_id).await?;
        group.anonymous_enabled = enable;
        self.store.put_group(group).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupAnonymous {
                sub_type: if enable { AnonymousKind::Allow } else { AnonymousKind::Block },
                group_id: group_id.to_owned(),
                operator_id: operator_id.to_owned(),
            },
        ))
    }

    /// Promotes or demotes an admin. Only the owner may do this; returns
    /// `None` when the role is already as requested.
    pub async fn set_admin(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
        enable: bool,
    ) -> ActionResult<Option<Scene>> {
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        let mut member = self.require_member(group_id, user_id).await?;
        self.require_role(Role::Owner, group_id, operator_id).await?;
        if member.role == Role::Owner {
            return Err(ActionError::forbidden("the owner's role cannot be changed"));
        }
        let role = if enable { Role::Admin } else { Role::Member };
        if member.role == role {
            return Ok(None);
        }
        member.role = role;
        self.store.put_member(member).await?;
        Ok(Some(self.notice(
            group_id,
            NoticeScene::GroupAdmin {
                sub_type: if enable { AdminKind::Set } else { AdminKind::Unset },
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
            },
        )))
    }

    /// Changes a group card. Members may change their own.
    pub async fn set_card(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
        card: &str,
    ) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        let mut member = self.require_member(group_id, user_id).await?;
        if operator_id != user_id {
            self.require_manage(Role::Admin, group_id, operator_id, user_id).await?;
        }
        let old_card = std::mem::replace(&mut member.card, card.to_owned());
        self.store.put_member(member).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberCard {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
                card: card.to_owned(),
                old_card,
            },
        ))
    }

    /// Grants a special title; a non-positive `duration` means permanent.
    pub async fn set_title(
        &self,
        group_id: &str,
        user_id: &str,
        operator_id: &str,
        title: &str,
        duration: i64,
    ) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        let _guard = self.locks.lock(group_id, user_id).await;
        let mut member = self.require_member(group_id, user_id).await?;
        self.require_role(Role::Owner, group_id, operator_id).await?;
        member.title = title.to_owned();
        member.title_expire_time = if duration > 0 { unix_now() + duration } else { 0 };
        self.store.put_member(member).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberTitle {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                operator_id: operator_id.to_owned(),
                title: title.to_owned(),
            },
        ))
    }

    pub async fn rename_group(&self, group_id: &str, operator_id: &str, name: &str) -> ActionResult<Scene> {
        let _guard = self.locks.lock(group_id, "").await;
        let mut group = self.require_group(group_id).await?;
        self.require_role(Role::Admin, group_id, operator_id).await?;
        group.name = name.to_owned();
        self.store.put_group(group).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupName {
                group_id: group_id.to_owned(),
                operator_id: operator_id.to_owned(),
                name: name.to_owned(),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    /// Makes two users friends in both directions.
    pub async fn add_friend(&self, user_id: &str, friend_id: &str, remark: &str) -> ActionResult<Scene> {
        self.require_user(user_id).await?;
        self.require_user(friend_id).await?;
        if self.store.friend(user_id, friend_id).await?.is_some() {
            return Err(ActionError::bad_param(format!("{user_id} and {friend_id} are already friends")));
        }
        self.store
            .put_friend(Friend {
                user_id: user_id.to_owned(),
                friend_id: friend_id.to_owned(),
                remark: remark.to_owned(),
            })
            .await?;
        self.store
            .put_friend(Friend {
                user_id: friend_id.to_owned(),
                friend_id: user_id.to_owned(),
                remark: String::new(),
            })
            .await?;
        Ok(self.notice(
            &self.talker_for(user_id, friend_id),
            NoticeScene::FriendIncrease {
                user_id: friend_id.to_owned(),
            },
        ))
    }

    pub async fn delete_friend(&self, user_id: &str, friend_id: &str) -> ActionResult<Scene> {
        let removed = self.store.delete_friend(user_id, friend_id).await?;
        self.store.delete_friend(friend_id, user_id).await?;
        if !removed {
            return Err(ActionError::not_found(format!("{friend_id} is not a friend of {user_id}")));
        }
        Ok(self.notice(
            &self.talker_for(user_id, friend_id),
            NoticeScene::FriendDecrease {
                user_id: friend_id.to_owned(),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------

    pub async fn poke(&self, group_id: Option<&str>, user_id: &str, target_id: &str) -> ActionResult<Scene> {
        match group_id {
            Some(group_id) => {
                self.require_member(group_id, user_id).await?;
                self.require_member(group_id, target_id).await?;
                Ok(self.notice(
                    group_id,
                    NoticeScene::GroupPoke {
                        group_id: group_id.to_owned(),
                        user_id: user_id.to_owned(),
                        target_id: target_id.to_owned(),
                    },
                ))
            }
            None => Ok(self.notice(
                &self.talker_for(user_id, target_id),
                NoticeScene::FriendPoke {
                    user_id: user_id.to_owned(),
                    target_id: target_id.to_owned(),
                },
            )),
        }
    }

    pub async fn set_essence(&self, message_id: &str, operator_id: &str, add: bool) -> ActionResult<Scene> {
        let Some(MessageScene::Group(message)) = self.chat.find_message_scene(message_id) else {
            return Err(ActionError::not_found(format!("group message {message_id} not found")));
        };
        self.require_role(Role::Admin, &message.group_id, operator_id).await?;
        Ok(self.notice(
            &message.group_id,
            NoticeScene::GroupEssence {
                sub_type: if add { EssenceKind::Add } else { EssenceKind::Remove },
                group_id: message.group_id.clone(),
                message_id: message_id.to_owned(),
                user_id: message.fields.user_id.clone(),
                operator_id: operator_id.to_owned(),
            },
        ))
    }

    pub async fn grant_honor(&self, group_id: &str, user_id: &str, honor: HonorKind) -> ActionResult<Scene> {
        self.require_member(group_id, user_id).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupMemberHonor {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                honor,
            },
        ))
    }

    /// `target_id` drew the largest share of `user_id`'s red packet.
    pub async fn hongbao_lucky(&self, group_id: &str, user_id: &str, target_id: &str) -> ActionResult<Scene> {
        self.require_member(group_id, target_id).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupHongbaoLucky {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                target_id: target_id.to_owned(),
            },
        ))
    }

    pub async fn upload_group_file(
        &self,
        group_id: &str,
        user_id: &str,
        file: &CacheFile,
        url: Option<String>,
    ) -> ActionResult<Scene> {
        self.require_member(group_id, user_id).await?;
        Ok(self.notice(
            group_id,
            NoticeScene::GroupFileUpload {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                file: scene_file(file, url),
            },
        ))
    }

    pub async fn send_offline_file(&self, user_id: &str, file: &CacheFile, url: Option<String>) -> ActionResult<Scene> {
        self.require_user(user_id).await?;
        Ok(self.notice(
            user_id,
            NoticeScene::OfflineFile {
                user_id: user_id.to_owned(),
                file: scene_file(file, url),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    pub async fn request_friend(&self, user_id: &str, comment: &str) -> ActionResult<Scene> {
        self.require_user(user_id).await?;
        Ok(self.create_scene(
            user_id,
            SceneBody::Request(RequestScene::AddFriend {
                user_id: user_id.to_owned(),
                comment: comment.to_owned(),
            }),
        ))
    }

    pub async fn request_join(
        &self,
        group_id: &str,
        user_id: &str,
        comment: &str,
        invitor_id: Option<String>,
    ) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        self.require_user(user_id).await?;
        Ok(self.create_scene(
            group_id,
            SceneBody::Request(RequestScene::JoinGroup {
                group_id: group_id.to_owned(),
                user_id: user_id.to_owned(),
                invitor_id,
                comment: comment.to_owned(),
            }),
        ))
    }

    /// `invitor_id` invites the bot into `group_id`.
    pub async fn invite_bot(&self, group_id: &str, invitor_id: &str) -> ActionResult<Scene> {
        self.require_group(group_id).await?;
        self.require_member(group_id, invitor_id).await?;
        Ok(self.create_scene(
            group_id,
            SceneBody::Request(RequestScene::GroupInvite {
                group_id: group_id.to_owned(),
                user_id: invitor_id.to_owned(),
                invitor_id: invitor_id.to_owned(),
            }),
        ))
    }

    /// Approves or refuses a pending request identified by its scene id.
    ///
    /// Approval applies the relationship and yields the follow-up notice.
    pub async fn resolve_request(
        &self,
        flag: &str,
        approve: bool,
        operator_id: &str,
        remark: &str,
    ) -> ActionResult<Option<Scene>> {
        let pending = self
            .chat
            .entries()
            .into_iter()
            .find(|e| e.scene.id == flag && e.action == Some(RequestAction::Await))
            .and_then(|e| match e.scene.body {
                SceneBody::Request(r) => Some(r),
                _ => None,
            });
        if let Some(RequestScene::JoinGroup { group_id, .. }) = &pending {
            self.require_role(Role::Admin, group_id, operator_id).await?;
        }

        let action = if approve { RequestAction::Agree } else { RequestAction::Refuse };
        let scene = self.chat.resolve_request(flag, action)?;
        let Some(request) = scene.as_request() else {
            return Ok(None);
        };
        if !approve {
            return Ok(None);
        }
        let applied = match request {
            RequestScene::AddFriend { user_id, .. } => self.add_friend(operator_id, user_id, remark).await,
            RequestScene::JoinGroup { group_id, user_id, .. } => {
                self.add_member(group_id, user_id, operator_id, IncreaseKind::Join)
                    .await
            }
            RequestScene::GroupInvite {
                group_id,
                invitor_id,
                ..
            } => {
                let bot_id = self.bot.id();
                self.add_member(group_id, &bot_id, invitor_id, IncreaseKind::Invite)
                    .await
            }
        };
        match applied {
            Ok(follow_up) => Ok(Some(follow_up)),
            Err(e) => {
                // the request stays answerable
                self.chat.reopen_request(flag);
                debug!(flag, error = %e, "Approval failed, request reopened");
                Err(e)
            }
        }
    }
}

fn scene_file(file: &CacheFile, url: Option<String>) -> SceneFile {
    SceneFile {
        id: file.id.clone(),
        name: file.name.clone(),
        size: file.size,
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ErrorKind;
    use crate::bot::BotIdentity;
    use crate::store::MemoryStore;

    async fn world() -> Behav {
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [("10000", "bot"), ("1", "owner"), ("2", "admin"), ("3", "member"), ("4", "outsider")] {
            store.put_user(User::new(id, name)).await.unwrap();
        }
        store.put_group(Group::new("123", "test group")).await.unwrap();
        store.put_member(Member::new("123", "1", Role::Owner)).await.unwrap();
        store.put_member(Member::new("123", "2", Role::Admin)).await.unwrap();
        store.put_member(Member::new("123", "3", Role::Member)).await.unwrap();
        store.put_member(Member::new("123", "10000", Role::Member)).await.unwrap();
        Behav::new(
            store,
            Arc::new(ChatLog::new()),
            ActiveBot::new(Some(BotIdentity::new("10000", "bot"))),
        )
    }

    #[tokio::test]
    async fn test_private_kind() {
        let behav = world().await;
        assert_eq!(behav.private_kind("3", "1").await.unwrap(), PrivateKind::Group);
        assert_eq!(behav.private_kind("3", "4").await.unwrap(), PrivateKind::Temp);
        behav.add_friend("3", "4", "").await.unwrap();
        assert_eq!(behav.private_kind("4", "3").await.unwrap(), PrivateKind::Friend);
    }

    #[tokio::test]
    async fn test_group_message_requires_membership() {
        let behav = world().await;
        let group = behav.require_group("123").await.unwrap();
        let outsider = behav.require_user("4").await.unwrap();
        let err = behav
            .send_group_message(&outsider, &group, vec![Content::text("hi")], None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);

        let member = behav.require_user("3").await.unwrap();
        let scene = behav
            .send_group_message(&member, &group, vec![Content::text("hi")], None, None)
            .await
            .unwrap();
        assert_eq!(scene.key(), "message.group");
        assert_eq!(scene.self_info.bot_id, "10000");
        let message = scene.as_message().unwrap();
        assert_eq!(message.fields().plain_message, "hi");
    }

    #[tokio::test]
    async fn test_ban_permissions() {
        let behav = world().await;
        let err = behav.set_member_ban("123", "2", "3", 60).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
        let untouched = behav.store().member("123", "2").await.unwrap().unwrap();
        assert_eq!(untouched.ban_expire_time, 0);

        let err = behav.set_member_ban("123", "1", "2", 60).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);

        let scene = behav.set_member_ban("123", "3", "2", 60).await.unwrap();
        assert!(matches!(
            scene.as_notice(),
            Some(NoticeScene::GroupMemberBan { sub_type: BanKind::Ban, duration: Some(60), .. })
        ));
        let banned = behav.store().member("123", "3").await.unwrap().unwrap();
        assert!(banned.is_banned(unix_now()));

        let lifted = behav.set_member_ban("123", "3", "2", 0).await.unwrap();
        assert!(matches!(
            lifted.as_notice(),
            Some(NoticeScene::GroupMemberBan { sub_type: BanKind::LiftBan, duration: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_banned_member_cannot_send() {
        let behav = world().await;
        behav.set_member_ban("123", "3", SYSTEM_OPERATOR, 600).await.unwrap();
        let group = behav.require_group("123").await.unwrap();
        let member = behav.require_user("3").await.unwrap();
        let err = behav
            .send_group_message(&member, &group, vec![Content::text("x")], None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_kick_and_admin_carve_out() {
        let behav = world().await;
        assert_eq!(
            behav.kick_member("123", "1", "2").await.unwrap_err().kind,
            ErrorKind::Forbidden
        );
        assert_eq!(
            behav.set_admin("123", "3", "2", true).await.unwrap_err().kind,
            ErrorKind::Forbidden
        );
        assert!(behav.set_admin("123", "3", "1", true).await.unwrap().is_some());
        assert!(behav.set_admin("123", "3", "1", true).await.unwrap().is_none());

        let scene = behav.kick_member("123", "3", "1").await.unwrap();
        assert_eq!(scene.key(), "notice.group_member_decrease");
        assert!(behav.store().member("123", "3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recall() {
        let behav = world().await;
        let group = behav.require_group("123").await.unwrap();
        let member = behav.require_user("3").await.unwrap();
        let scene = behav
            .send_group_message(&member, &group, vec![Content::text("oops")], None, None)
            .await
            .unwrap();
        let message_id = scene.as_message().unwrap().fields().message_id.clone();
        behav.chat().append(scene, None, false);

        let recall = behav.recall_message(&message_id, "2").await.unwrap();
        assert!(matches!(
            recall.as_notice(),
            Some(NoticeScene::GroupMessageDelete { sub_type: DeleteKind::Delete, .. })
        ));
        assert!(behav.chat().find_message(&message_id).unwrap().recalled);
        assert_eq!(
            behav.recall_message(&message_id, "3").await.unwrap_err().kind,
            ErrorKind::BadParam
        );
    }

    #[tokio::test]
    async fn test_join_request_approval() {
        let behav = world().await;
        let request = behav.request_join("123", "4", "let me in", None).await.unwrap();
        let flag = request.id.clone();
        behav.chat().append(request, None, false);

        assert_eq!(
            behav.resolve_request(&flag, true, "3", "").await.unwrap_err().kind,
            ErrorKind::Forbidden
        );
        let follow_up = behav.resolve_request(&flag, true, "2", "").await.unwrap().unwrap();
        assert_eq!(follow_up.key(), "notice.group_member_increase");
        assert!(behav.store().member("123", "4").await.unwrap().is_some());
        assert!(behav.resolve_request(&flag, false, "2", "").await.is_err());
    }

    #[tokio::test]
    async fn test_friend_request_refused() {
        let behav = world().await;
        let request = behav.request_friend("4", "hello").await.unwrap();
        let flag = request.id.clone();
        behav.chat().append(request, None, false);
        assert!(behav.resolve_request(&flag, false, "10000", "").await.unwrap().is_none());
        assert!(behav.store().friend("10000", "4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_approval_keeps_request_pending() {
        let behav = world().await;
        behav.add_friend("10000", "4", "").await.unwrap();
        let request = behav.request_friend("4", "again").await.unwrap();
        let flag = request.id.clone();
        behav.chat().append(request, None, false);

        let err = behav.resolve_request(&flag, true, "10000", "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadParam);
        let entry = behav
            .chat()
            .entries()
            .into_iter()
            .find(|e| e.scene.id == flag)
            .unwrap();
        assert_eq!(entry.action, Some(RequestAction::Await));

        assert!(behav.resolve_request(&flag, false, "10000", "").await.unwrap().is_none());
    }
}
