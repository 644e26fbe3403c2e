//! Persistent contact and membership store capability.
//!
//! The simulator never owns persistence; it reads and mutates users, groups,
//! memberships, friendships and cached-file metadata through [`Store`].
//! [`MemoryStore`] is a complete in-process implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

// ============================================================================
// Records
// ============================================================================

/// Member role within a group. Ordered so that `Owner > Admin > Member`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sex: Sex,
    /// Unix seconds.
    #[serde(default)]
    pub birthday: Option<i64>,
    #[serde(default)]
    pub level: u32,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whole years between `birthday` and `now`.
    pub fn age(&self, now: i64) -> u32 {
        self.birthday
            .filter(|b| *b < now)
            .map_or(0, |b| ((now - b) / 31_557_600) as u32)
    }
}

/// One direction of a friendship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub user_id: String,
    pub friend_id: String,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default = "default_max_member_count")]
    pub max_member_count: u32,
    #[serde(default)]
    pub whole_banned: bool,
    #[serde(default = "default_true")]
    pub anonymous_enabled: bool,
}

fn default_max_member_count() -> u32 {
    200
}

fn default_true() -> bool {
    true
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_member_count: default_max_member_count(),
            whole_banned: false,
            anonymous_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub group_id: String,
    pub user_id: String,
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub join_time: i64,
    #[serde(default)]
    pub last_sent_time: i64,
    /// Unix seconds; 0 means no expiry.
    #[serde(default)]
    pub title_expire_time: i64,
    /// Unix seconds; 0 or a past time means not banned.
    #[serde(default)]
    pub ban_expire_time: i64,
}

impl Member {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
            role,
            ..Default::default()
        }
    }

    pub fn is_banned(&self, now: i64) -> bool {
        self.ban_expire_time > now
    }
}

/// Metadata of a cached file; contents are addressed by `sha256`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    pub id: String,
    pub name: String,
    pub sha256: String,
    pub size: u64,
}

// ============================================================================
// Store capability
// ============================================================================

/// Lookup and mutation capability over the persisted world.
///
/// `put_*` methods upsert. List methods return records in a stable order.
#[async_trait]
pub trait Store: Send + Sync {
    async fn user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn put_user(&self, user: User) -> StoreResult<()>;

    async fn group(&self, id: &str) -> StoreResult<Option<Group>>;
    async fn groups(&self) -> StoreResult<Vec<Group>>;
    async fn put_group(&self, group: Group) -> StoreResult<()>;

    async fn member(&self, group_id: &str, user_id: &str) -> StoreResult<Option<Member>>;
    async fn members_of_group(&self, group_id: &str) -> StoreResult<Vec<Member>>;
    async fn memberships_of_user(&self, user_id: &str) -> StoreResult<Vec<Member>>;
    async fn put_member(&self, member: Member) -> StoreResult<()>;
    /// Returns whether a membership was removed.
    async fn delete_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool>;

    async fn friend(&self, user_id: &str, friend_id: &str) -> StoreResult<Option<Friend>>;
    async fn friends_of(&self, user_id: &str) -> StoreResult<Vec<Friend>>;
    async fn put_friend(&self, friend: Friend) -> StoreResult<()>;
    async fn delete_friend(&self, user_id: &str, friend_id: &str) -> StoreResult<bool>;

    async fn file(&self, id: &str) -> StoreResult<Option<CacheFile>>;
    async fn file_by_sha256(&self, sha256: &str) -> StoreResult<Option<CacheFile>>;
    async fn put_file(&self, file: CacheFile) -> StoreResult<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    groups: BTreeMap<String, Group>,
    members: BTreeMap<(String, String), Member>,
    friends: BTreeMap<(String, String), Friend>,
    files: BTreeMap<String, CacheFile>,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn put_user(&self, user: User) -> StoreResult<()> {
        self.tables.write().users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn group(&self, id: &str) -> StoreResult<Option<Group>> {
        Ok(self.tables.read().groups.get(id).cloned())
    }

    async fn groups(&self) -> StoreResult<Vec<Group>> {
        Ok(self.tables.read().groups.values().cloned().collect())
    }

    async fn put_group(&self, group: Group) -> StoreResult<()> {
        self.tables.write().groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn member(&self, group_id: &str, user_id: &str) -> StoreResult<Option<Member>> {
        let key = (group_id.to_owned(), user_id.to_owned());
        Ok(self.tables.read().members.get(&key).cloned())
    }

    async fn members_of_group(&self, group_id: &str) -> StoreResult<Vec<Member>> {
        Ok(self
            .tables
            .read()
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn memberships_of_user(&self, user_id: &str) -> StoreResult<Vec<Member>> {
        Ok(self
            .tables
            .read()
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn put_member(&self, member: Member) -> StoreResult<()> {
        let key = (member.group_id.clone(), member.user_id.clone());
        self.tables.write().members.insert(key, member);
        Ok(())
    }

    async fn delete_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool> {
        let key = (group_id.to_owned(), user_id.to_owned());
        Ok(self.tables.write().members.remove(&key).is_some())
    }

    async fn friend(&self, user_id: &str, friend_id: &str) -> StoreResult<Option<Friend>> {
        let key = (user_id.to_owned(), friend_id.to_owned());
        Ok(self.tables.read().friends.get(&key).cloned())
    }

    async fn friends_of(&self, user_id: &str) -> StoreResult<Vec<Friend>> {
        Ok(self
            .tables
            .read()
            .friends
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn put_friend(&self, friend: Friend) -> StoreResult<()> {
        let key = (friend.user_id.clone(), friend.friend_id.clone());
        self.tables.write().friends.insert(key, friend);
        Ok(())
    }

    async fn delete_friend(&self, user_id: &str, friend_id: &str) -> StoreResult<bool> {
        let key = (user_id.to_owned(), friend_id.to_owned());
        Ok(self.tables.write().friends.remove(&key).is_some())
    }

    async fn file(&self, id: &str) -> StoreResult<Option<CacheFile>> {
        Ok(self.tables.read().files.get(id).cloned())
    }

    async fn file_by_sha256(&self, sha256: &str) -> StoreResult<Option<CacheFile>> {
        Ok(self
            .tables
            .read()
            .files
            .values()
            .find(|f| f.sha256 == sha256)
            .cloned())
    }

    async fn put_file(&self, file: CacheFile) -> StoreResult<()> {
        self.tables.write().files.insert(file.id.clone(), file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Member);
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_age() {
        let mut user = User::new("1", "a");
        assert_eq!(user.age(1_000), 0);
        user.birthday = Some(0);
        assert_eq!(user.age(31_557_600 * 20 + 5), 20);
    }

    #[tokio::test]
    async fn test_membership_scans() {
        let store = MemoryStore::new();
        store.put_member(Member::new("g1", "u1", Role::Owner)).await.unwrap();
        store.put_member(Member::new("g1", "u2", Role::Member)).await.unwrap();
        store.put_member(Member::new("g2", "u1", Role::Admin)).await.unwrap();

        assert_eq!(store.members_of_group("g1").await.unwrap().len(), 2);
        assert_eq!(store.memberships_of_user("u1").await.unwrap().len(), 2);
        assert!(store.delete_member("g1", "u2").await.unwrap());
        assert!(!store.delete_member("g1", "u2").await.unwrap());
        assert!(store.member("g1", "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_lookup_by_digest() {
        let store = MemoryStore::new();
        store
            .put_file(CacheFile {
                id: "f".into(),
                name: "a.png".into(),
                sha256: "abc".into(),
                size: 3,
            })
            .await
            .unwrap();
        assert_eq!(store.file_by_sha256("abc").await.unwrap().unwrap().id, "f");
        assert!(store.file_by_sha256("def").await.unwrap().is_none());
    }
}
