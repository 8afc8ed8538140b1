//! Client configuration module
//!
//! Parses and manages session configuration from YAML files.
//!
//! Uses serde_yaml for parsing; every field except the credentials has a
//! default so an empty document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::game::protection::BotProtectionMode;

/// Delay between a death notification and the forced logout (ms)
pub const DEFAULT_FORCED_LOGOUT_DELAY_MS: u64 = 5000;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    // ============================================
    // Gateway
    // ============================================
    /// Reject script-originated actions outside of real input events
    #[serde(default)]
    pub bot_protection: BotProtectionMode,

    /// Dead-man's switch: forced logout this long after death
    #[serde(default = "default_forced_logout_delay_ms")]
    pub forced_logout_delay_ms: u64,

    // ============================================
    // World Server
    // ============================================
    #[serde(default = "default_world_host")]
    pub world_host: String,

    #[serde(default = "default_world_port")]
    pub world_port: u16,

    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub character: Option<String>,

    // ============================================
    // Directory Paths
    // ============================================
    #[serde(default = "default_lua_dir")]
    pub lua_dir: String,
}

fn default_forced_logout_delay_ms() -> u64 {
    DEFAULT_FORCED_LOGOUT_DELAY_MS
}

fn default_world_host() -> String {
    "127.0.0.1".to_string()
}

fn default_world_port() -> u16 {
    7172
}

fn default_lua_dir() -> String {
    "./data/lua/".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bot_protection: BotProtectionMode::default(),
            forced_logout_delay_ms: default_forced_logout_delay_ms(),
            world_host: default_world_host(),
            world_port: default_world_port(),
            account: None,
            password: None,
            character: None,
            lua_dir: default_lua_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    ///
    /// # Example
    /// ```no_run
    /// use worldlink::config::ClientConfig;
    ///
    /// let config = ClientConfig::from_file("conf/client.yaml")
    ///     .expect("Failed to load config");
    /// println!("World: {}:{}", config.world_host, config.world_port);
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ClientConfig = if contents.trim().is_empty() {
            ClientConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML")?
        };

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.world_host.is_empty(), "world_host cannot be empty");
        anyhow::ensure!(self.world_port != 0, "world_port cannot be 0");
        anyhow::ensure!(
            self.forced_logout_delay_ms > 0,
            "forced_logout_delay_ms must be greater than 0"
        );

        if let Some(character) = &self.character {
            anyhow::ensure!(!character.is_empty(), "character cannot be empty when set");
        }

        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClientConfig::from_str("").unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.bot_protection, BotProtectionMode::Enabled);
        assert_eq!(config.forced_logout_delay_ms, 5000);
        assert_eq!(config.world_host, "127.0.0.1");
        assert_eq!(config.world_port, 7172);
        assert_eq!(config.lua_dir, "./data/lua/");
    }

    #[test]
    fn test_full_config() {
        let config_str = r#"
bot_protection: disabled
forced_logout_delay_ms: 2500
world_host: "game.example.org"
world_port: 7171
account: "acc"
password: "pw"
character: "Char"
lua_dir: "./scripts/"
"#;

        let config = ClientConfig::from_str(config_str).unwrap();
        assert_eq!(config.bot_protection, BotProtectionMode::Disabled);
        assert_eq!(config.forced_logout_delay_ms, 2500);
        assert_eq!(config.world_host, "game.example.org");
        assert_eq!(config.world_port, 7171);
        assert_eq!(config.account.as_deref(), Some("acc"));
        assert_eq!(config.character.as_deref(), Some("Char"));
        assert_eq!(config.lua_dir, "./scripts/");
    }

    #[test]
    fn test_unknown_bot_protection_value() {
        let result = ClientConfig::from_str("bot_protection: sometimes\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = ClientConfig::from_str("world_host: [this is not valid yaml\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_zero_delay() {
        let result = ClientConfig::from_str("forced_logout_delay_ms: 0\n");
        let err_msg = format!("{}", result.unwrap_err());
        assert!(err_msg.contains("forced_logout_delay_ms"));
    }

    #[test]
    fn test_validation_empty_host() {
        let result = ClientConfig::from_str("world_host: \"\"\n");
        let err_msg = format!("{}", result.unwrap_err());
        assert!(err_msg.contains("world_host"));
    }

    #[test]
    fn test_save_and_load() {
        let mut config = ClientConfig::default();
        config.character = Some("Char".into());

        let temp_file = std::env::temp_dir().join("worldlink_test_save_config.yaml");

        config.save(&temp_file).unwrap();
        let loaded = ClientConfig::from_file(&temp_file).unwrap();
        assert_eq!(config, loaded);

        std::fs::remove_file(temp_file).ok();
    }
}
