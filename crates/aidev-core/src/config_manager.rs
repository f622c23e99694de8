use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for the intent service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AidevConfig {
    /// Completion endpoint and credential settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Models-list cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Code generation prompt settings
    #[serde(default)]
    pub codegen: CodegenConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Completion endpoint configuration (OpenRouter by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-style API, without trailing `/chat/completions`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer credential. Usually supplied through `OPENROUTER_API_KEY`
    /// rather than written to disk.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model used when a request does not name one (provider/model-name)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Hard ceiling for a single completion exchange, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for the models-listing call, in seconds
    #[serde(default = "default_models_timeout_secs")]
    pub models_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            models_timeout_secs: default_models_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// The configured key, treating an empty string as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static web assets served at `/`
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Bounded wait for the intent parse stage, in seconds
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,

    /// Bounded wait for the intent execute stage, in seconds
    #[serde(default = "default_execute_timeout_secs")]
    pub execute_timeout_secs: u64,

    /// Fetch the models list in the background at startup
    #[serde(default = "default_true")]
    pub warm_models_cache: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            parse_timeout_secs: default_parse_timeout_secs(),
            execute_timeout_secs: default_execute_timeout_secs(),
            warm_models_cache: true,
        }
    }
}

/// Models-list cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time to live of the cached models list, in seconds (12 hours)
    #[serde(default = "default_models_ttl_secs")]
    pub models_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            models_ttl_secs: default_models_ttl_secs(),
        }
    }
}

/// Code generation prompt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Target language named in the generation prompt
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> usize {
    1000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_models_timeout_secs() -> u64 {
    10
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_parse_timeout_secs() -> u64 {
    30
}
fn default_execute_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_models_ttl_secs() -> u64 {
    12 * 60 * 60
}
fn default_language() -> String {
    "Go".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with smart defaults
pub struct ConfigManager {
    config: AidevConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.aidev.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit config file, still honoring env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();

        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Wrap an already-built configuration (no file or env lookups).
    pub fn from_config(config: AidevConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn finish(config: AidevConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!(
            config_file = %config_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "NONE (using defaults)".to_string()),
            base_url = %config.llm.base_url,
            default_model = %config.llm.default_model,
            credential = if config.llm.api_key().is_some() { "present" } else { "absent" },
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".aidev.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .aidev.env: {}", e);
                } else {
                    info!("Loaded .aidev.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.aidev.toml (current directory)
    /// 2. ~/.aidev/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(AidevConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".aidev.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aidev").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((AidevConfig::default(), None))
    }

    /// Read TOML config file
    fn read_toml_file(path: &Path) -> Result<AidevConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: AidevConfig) -> AidevConfig {
        Self::apply_overrides(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    fn apply_overrides<F>(mut config: AidevConfig, lookup: F) -> AidevConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                config.llm.api_key = Some(key);
            }
        }
        if let Some(model) = lookup("OPENROUTER_DEFAULT_MODEL") {
            if !model.trim().is_empty() {
                config.llm.default_model = model;
            }
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL") {
            config.llm.base_url = url;
        }

        // Server
        if let Some(host) = lookup("AIDEV_HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("AIDEV_PORT") {
            match port.parse() {
                Ok(p) => config.server.port = p,
                Err(_) => warn!("Ignoring invalid AIDEV_PORT value: {}", port),
            }
        }
        if let Some(dir) = lookup("AIDEV_STATIC_DIR") {
            config.server.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(language) = lookup("AIDEV_CODEGEN_LANGUAGE") {
            config.codegen.language = language;
        }

        // Logging
        if let Some(level) = lookup("RUST_LOG") {
            // Only plain levels override; full filter directives are left to EnvFilter
            if is_valid_level(&level) {
                config.logging.level = level;
            }
        }

        config
    }

    /// Validate configuration
    fn validate_config(config: &AidevConfig) -> Result<(), ConfigError> {
        if config.llm.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.base_url must not be empty".to_string(),
            ));
        }
        if config.llm.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.default_model must not be empty".to_string(),
            ));
        }

        if config.llm.timeout_secs == 0
            || config.llm.models_timeout_secs == 0
            || config.server.parse_timeout_secs == 0
            || config.server.execute_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if config.cache.models_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.models_ttl_secs must be greater than zero".to_string(),
            ));
        }

        if !is_valid_level(&config.logging.level) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                config.logging.level
            )));
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AidevConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = AidevConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

fn is_valid_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}
