//! # Matcha Core
//!
//! Protocol-agnostic engine of the Matcha bot simulator.
//!
//! ## Layers
//!
//! ### Model
//!
//! - **Scenes**: what happened, independent of any wire protocol ([`Scene`])
//! - **Content**: canonical rich-message elements ([`Content`])
//! - **Payload**: JSON-like tree that can carry raw bytes ([`Payload`])
//!
//! ### Capabilities
//!
//! - **Store**: users, groups, members, friends and cached files ([`Store`])
//! - **File cache**: opaque file ids resolved to URLs and bytes ([`FileCache`])
//! - **Chat log**: ordered record of published scenes ([`ChatLog`])
//!
//! ### Behaviour
//!
//! [`Behav`] validates permissions, mutates the store and yields scenes.
//! Protocol adapters implement [`Protocol`] on top of it and a transport
//! driver carries their traffic through a [`ConnectionHandler`].
//!
//! ```text
//! ┌──────────┐   scene   ┌──────────┐  event   ┌────────┐
//! │  Behav   │──────────▶│ Protocol │─────────▶│ Driver │──▶ bot program
//! └──────────┘           └──────────┘◀─────────└────────┘◀── actions
//! ```

pub mod action;
pub mod behav;
pub mod bot;
pub mod chat;
pub mod codec;
pub mod content;
pub mod error;
pub mod files;
pub mod guard;
pub mod link;
pub mod payload;
pub mod plain;
pub mod scene;
pub mod store;

pub use action::{
    ActionError, ActionOutcome, ActionRequest, ActionResponse, ActionResult, ErrorKind,
    RetcodeTable, Status, normalize_action,
};
pub use behav::Behav;
pub use bot::{ActiveBot, BotIdentity};
pub use chat::{ChatEntry, ChatLog, RequestAction};
pub use codec::{EventCodec, MessageCodec, Protocol, bearer, build_message, parse_message};
pub use content::{Content, ContentType, MENTION_ALL};
pub use error::{
    CodecError, CodecResult, FileError, FileResult, StoreError, StoreResult, TransportError,
    TransportResult,
};
pub use files::{BlobStore, CachedFile, FileCache, FileSource, MemoryBlobs};
pub use guard::{EntityLocks, SYSTEM_OPERATOR, can_manage, role_check};
pub use link::{ConnectionHandle, ConnectionHandler, Frame, LogNotifier, MessageFormat, Notifier};
pub use payload::Payload;
pub use plain::{nickname, plain_message};
pub use scene::{PLATFORM, Scene, SceneBody, SceneType, unix_now};
pub use store::{CacheFile, Friend, Group, Member, MemoryStore, Role, Sex, Store, User};
