use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CampaignError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub send: SendConfig,
}

/// Sender identity used for the From header
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SenderConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl SenderConfig {
    /// RFC 5322 From header value: `Name <email>` when a name is set
    pub fn from_header(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

/// Campaign copy and the label applied to sent mail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub value_prop: String,
    #[serde(default)]
    pub cta: String,
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            value_prop: String::new(),
            cta: String::new(),
            label: default_label(),
        }
    }
}

/// Content generation strategy, selected once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// "template" or "external"
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

/// Throttle and retry policy for outbound sends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    /// Minimum seconds between any two send calls, shared across the run
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Maximum send attempts per recipient (initial + retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff delay after a transient failure, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff delay cap, in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Best-effort cross-run dedup: search existing labeled threads for the
    /// recipient address before generating. Depends on provider search
    /// accuracy, so it is not a guarantee.
    #[serde(default)]
    pub skip_existing_threads: bool,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            skip_existing_threads: false,
        }
    }
}

impl SendConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

fn default_label() -> String {
    "ColdCampaign".to_string()
}

fn default_mode() -> String {
    "template".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    30
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    30
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CampaignError::ConfigError(format!(
                "Config file not found at {:?}. Run: campaign-dispatch init-config",
                path
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CampaignError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CampaignError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CampaignError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CampaignError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| CampaignError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sender.email.is_empty() || !self.sender.email.contains('@') {
            return Err(CampaignError::ConfigError(
                "sender.email must be a valid email address".to_string(),
            ));
        }

        if self.campaign.label.trim().is_empty() {
            return Err(CampaignError::ConfigError(
                "campaign.label cannot be empty".to_string(),
            ));
        }

        match self.generator.mode.as_str() {
            "template" => {}
            "external" => {
                if self.generator.api_key.is_empty() {
                    return Err(CampaignError::ConfigError(
                        "generator.api_key is required when generator.mode is 'external'"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(CampaignError::ConfigError(format!(
                    "Invalid generator.mode: '{}'. Must be 'template' or 'external'",
                    other
                )));
            }
        }

        if self.send.max_attempts == 0 {
            return Err(CampaignError::ConfigError(
                "send.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.send.max_attempts > 10 {
            return Err(CampaignError::ConfigError(
                "send.max_attempts cannot exceed 10".to_string(),
            ));
        }

        if self.send.min_interval_secs > 3600 {
            return Err(CampaignError::ConfigError(
                "send.min_interval_secs cannot exceed 3600 (1 hour)".to_string(),
            ));
        }

        if self.send.base_delay_ms == 0 {
            return Err(CampaignError::ConfigError(
                "send.base_delay_ms must be at least 1".to_string(),
            ));
        }

        if self.generator.timeout_secs == 0 {
            return Err(CampaignError::ConfigError(
                "generator.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Write a commented example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let example = r#"# campaign-dispatch configuration

[sender]
# Identity used for the From header of every campaign email
name = "Your Name"
email = "you@example.com"

[campaign]
# Campaign copy substituted into the template and the external prompt
service_name = "Workflow Automation"
value_prop = "We help small businesses cut manual admin work in half."
cta = "Would a 15-minute call next week work?"
# Label applied to every sent message for later filtering and dedup
label = "ColdCampaign"

[generator]
# "template" uses the built-in copy pattern; "external" delegates to an
# OpenAI-compatible chat completions endpoint
mode = "template"
# Required for external mode
api_key = ""
model = "gpt-4o-mini"
base_url = "https://api.openai.com/v1"
timeout_secs = 30

[send]
# Minimum seconds between any two sends, shared across the whole run
min_interval_secs = 5
# Initial attempt + retries per recipient
max_attempts = 5
base_delay_ms = 1000
max_delay_secs = 30
# Best-effort: skip recipients whose address already appears in a thread
# carrying the campaign label (depends on provider search accuracy)
skip_existing_threads = false
"#;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CampaignError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        tokio::fs::write(path, example)
            .await
            .map_err(|e| CampaignError::ConfigError(format!("Failed to write example config: {}", e)))?;

        Ok(())
    }
}
