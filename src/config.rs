use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // guild-scoped command registration (development)

    // Paths
    pub scratch_dir: PathBuf,
    pub data_dir: PathBuf,

    // Resolution
    pub allowed_hosts: Vec<String>,
    pub resolve_timeout_secs: u64,

    // Liveness ping (disabled when no channel is configured)
    pub heartbeat_channel_id: Option<u64>,
    pub heartbeat_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            scratch_dir: std::env::var("SCRATCH_DIR")
                .unwrap_or_else(|_| "music".to_string())
                .into(),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),

            allowed_hosts: std::env::var("ALLOWED_HOSTS")
                .unwrap_or_else(|_| "youtube.com,youtu.be,music.youtube.com".to_string())
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            resolve_timeout_secs: std::env::var("RESOLVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,

            heartbeat_channel_id: std::env::var("HEARTBEAT_CHANNEL_ID")
                .ok()
                .and_then(|s| s.parse().ok()),
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.scratch_dir)?;
        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }
        if self.allowed_hosts.is_empty() {
            anyhow::bail!("ALLOWED_HOSTS must list at least one media host");
        }
        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("RESOLVE_TIMEOUT_SECS must be greater than 0");
        }
        if self.heartbeat_channel_id == Some(0) {
            anyhow::bail!("HEARTBEAT_CHANNEL_ID must be a valid channel id");
        }
        if self.heartbeat_interval_secs == 0 {
            anyhow::bail!("HEARTBEAT_INTERVAL_SECS must be greater than 0");
        }
        Ok(())
    }

    /// Token-free summary for startup logging.
    pub fn summary(&self) -> String {
        format!(
            "Config: guild={}, scratch={}, data={}, hosts=[{}], resolve timeout={}s, heartbeat={}",
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            self.scratch_dir.display(),
            self.data_dir.display(),
            self.allowed_hosts.join(", "),
            self.resolve_timeout_secs,
            self.heartbeat_channel_id.map_or("off".to_string(), |id| {
                format!("{}s to {id}", self.heartbeat_interval_secs)
            }),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,
            scratch_dir: "music".into(),
            data_dir: "data".into(),
            allowed_hosts: vec![
                "youtube.com".to_string(),
                "youtu.be".to_string(),
                "music.youtube.com".to_string(),
            ],
            resolve_timeout_secs: 120,
            heartbeat_channel_id: None,
            heartbeat_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let mut config = Config::default();
        config.discord_token = "token".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_host_list_is_rejected() {
        let mut config = Config::default();
        config.discord_token = "token".to_string();
        config.allowed_hosts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_heartbeat_interval_is_rejected() {
        let mut config = Config::default();
        config.discord_token = "token".to_string();
        config.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
