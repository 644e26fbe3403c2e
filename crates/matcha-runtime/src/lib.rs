//! # Matcha Runtime
//!
//! Turns a configuration into a running simulator:
//!
//! - layered configuration loading and validation ([`config`])
//! - `tracing` subscriber setup ([`logging`])
//! - on-disk blob storage for the file cache ([`DiskBlobs`])
//! - the adapter lifecycle binding one protocol to one driver ([`Adapter`])
//! - protocol switching, bot assignment and signal handling ([`MatchaRuntime`])
//!
//! ```ignore
//! use matcha_runtime::MatchaRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = MatchaRuntime::builder().build().await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod blobs;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod runtime;

pub use adapter::{Adapter, AdapterState};
pub use blobs::DiskBlobs;
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, ConnectConfig, FilesConfig, LoggingConfig,
    MatchaConfig, ProtocolKind, TransportKind,
};
pub use error::{RuntimeError, RuntimeResult};
pub use factory::{create_connector, create_protocol};
pub use logging::LoggingBuilder;
pub use runtime::{MatchaRuntime, RuntimeBuilder};

pub use tracing;

/// Logging macros for embedders.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
