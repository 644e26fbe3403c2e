//! # OneBot Adapter
//!
//! OneBot v11 and v12 bindings for Matcha.
//!
//! Each version provides a message codec, an event codec and an action
//! table, glued together by a [`Protocol`](matcha_core::Protocol)
//! implementation:
//!
//! - [`OneBotV11`]: numeric ids, CQ codes, `.handle_quick_operation`
//! - [`OneBotV12`]: string ids, file actions, fragmented transfer
//!
//! ```ignore
//! let ctx = OneBotContext::new(behav, files, OneBotConfig::default());
//! let protocol: Arc<dyn Protocol> = Arc::new(OneBotV11::new(ctx));
//! ```

pub mod common;
pub mod config;
pub mod v11;
pub mod v12;

pub use common::{IMPL_NAME, IMPL_VERSION, OneBotContext};
pub use config::{OneBotConfig, SegmentFormat};
pub use v11::OneBotV11;
pub use v12::OneBotV12;
