//! # Matcha
//!
//! Simulates the chat platform side of OneBot so bot programs can be run
//! and tested without a real account.
//!
//! ## Overview
//!
//! Matcha keeps a small world of users, groups and friendships. Things that
//! happen in it become [`Scene`](core::Scene)s, which the active protocol
//! binding renders as OneBot events and pushes to the bot program over a
//! reverse WebSocket. Actions sent back by the bot program are executed
//! against the same world.
//!
//! ```text
//! ┌──────────┐  scene  ┌──────────────────┐  event   ┌────────────┐
//! │  World   │────────▶│ OneBot v11 / v12 │─────────▶│            │
//! │ (Behav)  │◀────────│    binding       │◀─────────│ bot program│
//! └──────────┘ mutate  └──────────────────┘  action  └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use matcha::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = MatchaRuntime::builder().build().await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `matcha.toml` configuration files
//! - `yaml-config`: `matcha.yaml` configuration files
//! - `json-log`: JSON log output
//! - `ws-client` *(default)*: reverse WebSocket transport
//! - `remote-files` *(default)*: download http(s) file sources

pub use matcha_adapter_onebot as onebot;
pub use matcha_core as core;
pub use matcha_runtime as runtime;
pub use matcha_transport as transport;

/// Commonly used types.
pub mod prelude {
    pub use matcha_runtime::{
        Adapter, AdapterState, MatchaConfig, MatchaRuntime, ProtocolKind, RuntimeError,
        RuntimeResult,
    };

    pub use matcha_core::{
        ActionRequest, ActionResponse, ActiveBot, Behav, BotIdentity, ChatEntry, ChatLog, Content,
        FileCache, Friend, Group, Member, Payload, Role, Scene, Store, User,
    };

    pub use matcha_runtime::prelude::*;
}
