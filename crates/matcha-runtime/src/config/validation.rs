//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotConfig, ConnectConfig, FilesConfig, LogOutput, LoggingConfig, MatchaConfig, TransportKind,
};

/// Validates the entire configuration.
pub fn validate_config(config: &MatchaConfig) -> ConfigResult<()> {
    validate_connect_config(&config.connect)?;
    if let Some(bot) = &config.bot {
        validate_bot_config(bot)?;
    }
    validate_files_config(&config.files)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_connect_config(connect: &ConnectConfig) -> ConfigResult<()> {
    match connect.transport {
        TransportKind::WsClient => validate_url(&connect.url, &["ws://", "wss://"])?,
    }
    if connect.reconnect_interval == 0 {
        return Err(ConfigError::validation(
            "Reconnect interval must be greater than 0",
        ));
    }
    if connect.heartbeat_interval == 0 {
        return Err(ConfigError::validation(
            "Heartbeat interval must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.id.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.id"));
    }
    if bot.id.contains(char::is_whitespace) {
        return Err(ConfigError::validation("Bot ID cannot contain whitespace"));
    }
    Ok(())
}

fn validate_files_config(files: &FilesConfig) -> ConfigResult<()> {
    validate_url(&files.assets_base_url, &["http://", "https://"])?;
    if files.fragment_ttl == 0 {
        return Err(ConfigError::validation(
            "Fragment TTL must be greater than 0",
        ));
    }
    if files.max_upload_size == 0 {
        return Err(ConfigError::validation(
            "Max upload size must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("url"));
    }
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {schemes:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&MatchaConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_url() {
        let mut config = MatchaConfig::default();
        config.connect.url = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.connect.url = "http://127.0.0.1:8120".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        config.connect.url = "wss://example.com/ws".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = MatchaConfig::default();
        config.connect.heartbeat_interval = 0;
        assert!(validate_config(&config).is_err());

        let mut config = MatchaConfig::default();
        config.files.fragment_ttl = 0;
        assert!(validate_config(&config).is_err());

        let mut config = MatchaConfig::default();
        config.files.max_upload_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bot_id() {
        let mut config = MatchaConfig::default();
        config.bot = Some(BotConfig {
            id: "10 000".into(),
            name: "tea".into(),
        });
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = MatchaConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("matcha.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
