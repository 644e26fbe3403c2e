//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Main config file (`matcha.toml` / `matcha.yaml`)
//! 4. Profile-specific config file (`matcha.{profile}.toml`)
//! 5. Environment variables (`MATCHA_*`)
//!
//! Files are searched in the current directory first, then in
//! `<user config dir>/matcha`. The first directory holding a main file wins.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `matcha.toml`
//! - `yaml-config`: `matcha.yaml`, `matcha.yml`
//!
//! # Environment Variable Mapping
//!
//! `MATCHA_` prefix, `__` separates nesting levels:
//!
//! - `MATCHA_CONNECT__URL=ws://host/ws` → `connect.url`
//! - `MATCHA_BOT__ID=10000` → `bot.id`
//! - `MATCHA_LOGGING__LEVEL=debug` → `logging.level`
//!
//! `MATCHA_PROFILE` selects the profile.

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::MatchaConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "MATCHA_";
const PROFILE_VAR: &str = "MATCHA_PROFILE";
const FILE_STEM: &str = "matcha";

/// Reads the profile name from `MATCHA_PROFILE`.
pub fn profile_from_env() -> Option<String> {
    std::env::var(PROFILE_VAR)
        .ok()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
}

/// Configuration loader with figment-based multi-source support.
///
/// ```rust,ignore
/// let config = ConfigLoader::new()
///     .file("./matcha.toml")
///     .profile("ci")
///     .load()?;
/// ```
pub struct ConfigLoader {
    figment: Figment,
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: profile_from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into().to_lowercase());
        self
    }

    /// Adds a search path. Once any is added the default paths are not used.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: MatchaConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<MatchaConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: MatchaConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = profile.as_deref().unwrap_or("-"),
            protocol = %config.connect.protocol,
            url = %config.connect.url,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(MatchaConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_config_file(figment, path)?;
            if let Some(profile_path) = self.profile_variant(path) {
                debug!(path = %profile_path.display(), "Loading profile-specific config");
                figment = merge_config_file(figment, &profile_path)?;
            }
        } else {
            figment = self.load_config_files(figment)?;
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment)
    }

    /// `dir/matcha.toml` → `dir/matcha.{profile}.toml`, if that exists.
    fn profile_variant(&self, path: &Path) -> Option<PathBuf> {
        let profile = self.profile.as_deref()?;
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        let candidate = path.with_file_name(format!("{stem}.{profile}.{ext}"));
        candidate.exists().then_some(candidate)
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(FILE_STEM));
        }
        paths
    }

    fn load_config_files(&self, mut figment: Figment) -> ConfigResult<Figment> {
        let extensions = enabled_extensions();
        for dir in self.resolve_search_paths() {
            let Some(main) = extensions
                .iter()
                .map(|ext| dir.join(format!("{FILE_STEM}.{ext}")))
                .find(|path| path.exists())
            else {
                continue;
            };
            info!(path = %main.display(), "Loading configuration file");
            figment = merge_config_file(figment, &main)?;
            if let Some(profile_path) = self.profile_variant(&main) {
                debug!(path = %profile_path.display(), "Loading profile-specific config");
                figment = merge_config_file(figment, &profile_path)?;
            }
            return Ok(figment);
        }
        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

fn enabled_extensions() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut extensions = Vec::new();
    #[cfg(feature = "toml-config")]
    extensions.push("toml");
    #[cfg(feature = "yaml-config")]
    extensions.extend(["yaml", "yml"]);
    extensions
}

/// Merges one file, dispatching on its extension. Only enabled formats are accepted.
fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::ParseError(format!(
            "Unsupported or disabled configuration file format: .{ext}"
        ))),
    }
}

/// Loads from the default locations with environment overrides.
pub fn load_config() -> ConfigResult<MatchaConfig> {
    ConfigLoader::new().load()
}

/// Loads a specific file with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<MatchaConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolKind;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("matcha-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = scratch_dir();
        let config = ConfigLoader::new()
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.connect.heartbeat_interval, 3);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/matcha.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_and_profile_layering() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("matcha.toml"),
            "[connect]\nprotocol = \"onebot-v12\"\nreconnect_interval = 10\n\n[bot]\nid = \"10000\"\nname = \"tea\"\n",
        )
        .unwrap();
        std::fs::write(dir.join("matcha.ci.toml"), "[connect]\nreconnect_interval = 1\n").unwrap();

        let config = ConfigLoader::new()
            .search_path(&dir)
            .profile("ci")
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.connect.protocol, ProtocolKind::OnebotV12);
        assert_eq!(config.connect.reconnect_interval, 1);
        assert_eq!(config.bot.unwrap().name, "tea");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = scratch_dir();
        let path = dir.join("matcha.toml");
        std::fs::write(&path, "[connect]\nurl = \"http://nope\"\n").unwrap();
        let result = ConfigLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_programmatic_merge() {
        let dir = scratch_dir();
        let mut base = MatchaConfig::default();
        base.connect.url = "ws://10.0.0.1:1/ws".into();
        let config = ConfigLoader::new()
            .search_path(&dir)
            .merge(base)
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.connect.url, "ws://10.0.0.1:1/ws");
    }

    #[test]
    fn test_env_overrides() {
        let dir = scratch_dir();
        // SAFETY: the variable is unique to this test and removed right after
        unsafe {
            std::env::set_var("MATCHA_FILES__FRAGMENT_TTL", "42");
        }
        let config = ConfigLoader::new().search_path(&dir).load();
        unsafe {
            std::env::remove_var("MATCHA_FILES__FRAGMENT_TTL");
        }
        assert_eq!(config.unwrap().files.fragment_ttl, 42);
    }
}
