use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Asynchronous execution settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Timeout in seconds for a single model call (default: 120)
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    /// Total model-call attempts per dispatched step (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// First retry delay in milliseconds, doubled on each retry (default: 1000)
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single retry delay (default: 30000)
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    /// Seconds a resolved task stays pollable after it was first observed (default: 600)
    #[serde(default = "default_task_retention")]
    pub task_retention_secs: u64,
}

fn default_model_timeout() -> u64 {
    120 // 2 minutes
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_base_delay() -> u64 {
    1000 // 1 second
}

fn default_retry_max_delay() -> u64 {
    30_000 // 30 seconds
}

fn default_task_retention() -> u64 {
    600 // 10 minutes
}

impl EngineConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_timeout_secs: default_model_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            task_retention_secs: default_task_retention(),
        }
    }
}

/// Client polling contract
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PollingConfig {
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
    /// Interval multiplier after each unsuccessful poll, must be >= 1.0
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_interval() -> u64 {
    1000 // 1 second
}

fn default_max_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_max_retries() -> u32 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval(),
            max_interval_ms: default_max_interval(),
            backoff_factor: default_backoff_factor(),
            max_retries: default_max_retries(),
        }
    }
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LlmConfig {
    /// Provider name; only "anthropic" is built in
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Output budget for steps without their own
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the provider endpoint
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> String {
    "ARIZ_ANTHROPIC_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContextConfig {
    /// Most recent accepted steps sent as history (0 = all)
    #[serde(default)]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathsConfig {
    pub state: String,
    /// Directory of `<prompt ref>.hbs` overrides
    #[serde(default)]
    pub prompts: Option<String>,
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7010
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs under `<state>/logs` instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from(".ariz/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so ariz works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/ariz/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ariz").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. ARIZ__ENGINE__MAX_ATTEMPTS=5
        builder = builder.add_source(
            config::Environment::with_prefix("ARIZ")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.engine.max_attempts == 0 {
            anyhow::bail!("engine.max_attempts must be at least 1");
        }
        let factor = self.polling.backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            anyhow::bail!(
                "polling.backoff_factor must be >= 1.0, got {factor}"
            );
        }
        if self.polling.initial_interval_ms > self.polling.max_interval_ms {
            anyhow::bail!("polling.initial_interval_ms must not exceed polling.max_interval_ms");
        }
        Ok(())
    }

    /// Write this config as TOML to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// JSON Schema of the configuration file
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Directory holding one JSON file per session
    pub fn sessions_path(&self) -> PathBuf {
        self.state_path().join("sessions")
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    pub fn prompts_path(&self) -> Option<PathBuf> {
        self.paths.prompts.as_ref().map(|p| {
            let path = PathBuf::from(p);
            if path.is_absolute() {
                path
            } else {
                std::env::current_dir().unwrap_or_default().join(path)
            }
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            polling: PollingConfig::default(),
            llm: LlmConfig::default(),
            context: ContextConfig::default(),
            paths: PathsConfig {
                state: ".ariz".to_string(), // Relative to cwd
                prompts: None,
            },
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
