//! Configuration for the Matcha runtime.
//!
//! Layered loading (defaults, files, environment) lives in [`loader`], the
//! schema in [`schema`] and the semantic checks in [`validation`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    BotConfig, ConnectConfig, FilesConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    MatchaConfig, ProtocolKind, TransportKind,
};
pub use validation::validate_config;
