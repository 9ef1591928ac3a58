use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sms: SmsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    /// Title convention that marks a multi-recipient broadcast thread.
    #[serde(default = "default_broadcast_prefix")]
    pub broadcast_title_prefix: String,
    /// Cap on the recent-history window scanned by the digits fallback.
    #[serde(default = "default_history_scan_limit")]
    pub history_scan_limit: u32,
    /// Optional acknowledgement text returned to the sender. When unset the
    /// webhook answers with an empty TwiML response.
    #[serde(default)]
    pub auto_reply: Option<String>,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            broadcast_title_prefix: default_broadcast_prefix(),
            history_scan_limit: default_history_scan_limit(),
            auto_reply: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("parish-sms.db")
}

fn default_broadcast_prefix() -> String {
    "Message to ".to_string()
}

fn default_history_scan_limit() -> u32 {
    200
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
    }
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.storage.database_path, PathBuf::from("parish-sms.db"));
        assert_eq!(config.sms.broadcast_title_prefix, "Message to ");
        assert_eq!(config.sms.history_scan_limit, 200);
        assert!(config.sms.auto_reply.is_none());
    }

    #[test]
    fn test_partial_config_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [sms]
            auto_reply = "Thanks, we got your message."
            history_scan_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.sms.history_scan_limit, 50);
        assert_eq!(
            config.sms.auto_reply.as_deref(),
            Some("Thanks, we got your message.")
        );
    }
}
