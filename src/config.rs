use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: String,
    pub api_timeout_secs: u64,
    pub owner_id: Option<u64>,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,
    pub scheduler_interval_secs: u64,
    pub config_path: String,

    // Loaded from the optional TOML file
    pub activity: ActivityDefaults,
}

/// Defaults applied to giveaways and raffles unless a command overrides them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivityDefaults {
    pub embed_color: u32,
    pub enter_emoji: String,
    pub default_winners: u32,
    pub max_duration_days: u64,
    pub min_duration_secs: u64,
}

impl Default for ActivityDefaults {
    fn default() -> Self {
        Self {
            embed_color: 0x5865F2,
            enter_emoji: "🎉".to_string(),
            default_winners: 1,
            max_duration_days: 60,
            min_duration_secs: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    activity: ActivityDefaults,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let config_path =
            env::var("STAGEHAND_CONFIG").unwrap_or_else(|_| "stagehand.toml".to_string());
        let activity = Self::load_activity_defaults(&config_path)?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            api_base_url: env::var("API_BASE_URL")
                .map_err(|_| anyhow::anyhow!("API_BASE_URL must be set"))?,
            api_username: env::var("API_USERNAME")
                .map_err(|_| anyhow::anyhow!("API_USERNAME must be set"))?,
            api_password: env::var("API_PASSWORD")
                .map_err(|_| anyhow::anyhow!("API_PASSWORD must be set"))?,
            api_timeout_secs: env::var("API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Running the venue".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            scheduler_interval_secs: env::var("SCHEDULER_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            config_path,
            activity,
        })
    }

    /// A missing file yields the built-in defaults; a malformed one is an error.
    pub fn load_activity_defaults(path: &str) -> anyhow::Result<ActivityDefaults> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse_activity_defaults(&content)
                .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path, e)),
            Err(_) => Ok(ActivityDefaults::default()),
        }
    }

    pub fn parse_activity_defaults(content: &str) -> Result<ActivityDefaults, toml::de::Error> {
        let file: FileConfig = toml::from_str(content)?;
        Ok(file.activity)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("api_username", &self.api_username)
            .field("api_password", &"[REDACTED]")
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("owner_id", &self.owner_id)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("scheduler_interval_secs", &self.scheduler_interval_secs)
            .field("config_path", &self.config_path)
            .field("activity", &self.activity)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("API_BASE_URL");
        env::set_var("STAGEHAND_CONFIG", "/nonexistent/stagehand.toml");
        let result = Config::build();
        assert!(
            result.is_err(),
            "Should fail when required vars are missing"
        );

        env::set_var("DISCORD_TOKEN", "test_token");
        env::set_var("API_BASE_URL", "http://localhost:9000/api");
        env::set_var("API_USERNAME", "bot");
        env::set_var("API_PASSWORD", "hunter2");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.api_timeout_secs, 30);
        assert_eq!(config.activity, ActivityDefaults::default());

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("test_token"));
        assert!(!debug_output.contains("hunter2"));
        assert!(debug_output.contains("[REDACTED]"));

        env::remove_var("DISCORD_TOKEN");
        env::remove_var("API_BASE_URL");
        env::remove_var("API_USERNAME");
        env::remove_var("API_PASSWORD");
        env::remove_var("STAGEHAND_CONFIG");
    }

    #[test]
    fn parses_partial_activity_section() {
        let parsed = Config::parse_activity_defaults(
            "[activity]\nembed_color = 0xFF00AA\ndefault_winners = 3\n",
        )
        .unwrap();
        assert_eq!(parsed.embed_color, 0xFF00AA);
        assert_eq!(parsed.default_winners, 3);
        assert_eq!(parsed.enter_emoji, "🎉");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let parsed = Config::parse_activity_defaults("").unwrap();
        assert_eq!(parsed, ActivityDefaults::default());
    }

    #[test]
    fn rejects_malformed_file() {
        assert!(Config::parse_activity_defaults("[activity]\ndefault_winners = \"two\"").is_err());
    }
}
