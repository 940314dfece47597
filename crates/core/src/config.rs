use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub default_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Hex-encoded 32-byte key for the credential cipher.
    pub encryption_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub encryption_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://relay.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            llm: LlmConfig {
                openai_api_key: None,
                anthropic_api_key: None,
                openai_base_url: "https://api.openai.com/v1".to_string(),
                anthropic_base_url: "https://api.anthropic.com".to_string(),
                default_model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            security: SecurityConfig { encryption_key: String::new().into() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(openai_api_key_value) = llm.openai_api_key {
                self.llm.openai_api_key = Some(openai_api_key_value.into());
            }
            if let Some(anthropic_api_key_value) = llm.anthropic_api_key {
                self.llm.anthropic_api_key = Some(anthropic_api_key_value.into());
            }
            if let Some(openai_base_url) = llm.openai_base_url {
                self.llm.openai_base_url = openai_base_url;
            }
            if let Some(anthropic_base_url) = llm.anthropic_base_url {
                self.llm.anthropic_base_url = anthropic_base_url;
            }
            if let Some(default_model) = llm.default_model {
                self.llm.default_model = default_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(security) = patch.security {
            if let Some(encryption_key_value) = security.encryption_key {
                self.security.encryption_key = encryption_key_value.into();
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("RELAY_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("RELAY_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "RELAY_LOG_FORMAT".to_string(),
                value: format,
            })?;
        }
        if let Ok(model) = env::var("RELAY_DEFAULT_MODEL") {
            self.llm.default_model = model;
        }
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key.into());
        }
        if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key.into());
        }
        if let Ok(key) = env::var("RELAY_ENCRYPTION_KEY") {
            self.security.encryption_key = key.into();
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(model) = overrides.default_model {
            self.llm.default_model = model;
        }
        if let Some(openai_api_key_value) = overrides.openai_api_key {
            self.llm.openai_api_key = Some(openai_api_key_value.into());
        }
        if let Some(anthropic_api_key_value) = overrides.anthropic_api_key {
            self.llm.anthropic_api_key = Some(anthropic_api_key_value.into());
        }
        if let Some(encryption_key_value) = overrides.encryption_key {
            self.security.encryption_key = encryption_key_value.into();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.llm.default_model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.default_model must not be empty".to_string(),
            ));
        }
        if self.llm.max_retries > 10 {
            return Err(ConfigError::Validation(
                "llm.max_retries must be 10 or fewer".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    llm: Option<LlmPatch>,
    security: Option<SecurityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
    openai_base_url: Option<String>,
    anthropic_base_url: Option<String>,
    default_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPatch {
    encryption_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("relay.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::load(LoadOptions::default()).expect("default config loads");
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn toml_file_patches_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[database]
url = "sqlite::memory:"
max_connections = 2

[llm]
default_model = "claude-sonnet"
timeout_secs = 10

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.llm.default_model, "claude-sonnet");
        assert_eq!(config.llm.timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/definitely/not/here/relay.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                default_model: Some("gpt-4o".to_string()),
                openai_api_key: Some("sk-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.llm.default_model, "gpt-4o");
        assert_eq!(
            config.llm.openai_api_key.as_ref().map(|key| key.expose_secret().to_string()),
            Some("sk-test".to_string())
        );
    }

    #[test]
    fn empty_model_fails_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                default_model: Some("  ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
