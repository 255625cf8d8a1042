//! Configuration loading from tether.toml and the environment.

use mcp::ServerConfig;
use runtime::GeminiBackend;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Config file looked up in the working directory when none is given.
pub const CONFIG_FILE: &str = "tether.toml";

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MODEL_VAR: &str = "TETHER_MODEL";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub tool_host: ToolHostConfig,
}

/// Model endpoint configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Gemini API key. Usually supplied through `GEMINI_API_KEY` instead.
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// System instruction sent with every request.
    pub system: Option<String>,

    pub max_output_tokens: Option<u32>,

    /// Per-request timeout; unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: default_base_url(),
            system: None,
            max_output_tokens: None,
            timeout_secs: None,
        }
    }
}

/// How to launch the MCP tool server.
#[derive(Debug, Deserialize)]
pub struct ToolHostConfig {
    #[serde(default = "default_host_name")]
    pub name: String,

    #[serde(default = "default_host_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    pub timeout_secs: Option<u64>,
}

impl Default for ToolHostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            command: default_host_command(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: None,
        }
    }
}

impl ToolHostConfig {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            name: self.name.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_base_url() -> String {
    runtime::providers::DEFAULT_BASE_URL.to_string()
}

fn default_host_name() -> String {
    "toolbox".to_string()
}

fn default_host_command() -> String {
    "tether-toolbox".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if given, else `tether.toml` if present, else defaults.
    ///
    /// An explicitly named file must exist.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from the environment; set variables win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var(API_KEY_VAR) {
            self.backend.api_key = Some(key);
        }
        if let Some(model) = var(MODEL_VAR).filter(|m| !m.trim().is_empty()) {
            self.backend.model = model;
        }
    }

    /// The configured API key, if it is set and not blank.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.backend
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Build the model backend from config.
    pub fn backend(&self) -> Result<GeminiBackend, ConfigError> {
        let backend = &self.backend;
        let mut builder = GeminiBackend::builder(self.api_key()?, backend.model.as_str())
            .base_url(backend.base_url.as_str());
        if let Some(system) = &backend.system {
            builder = builder.system(system.as_str());
        }
        if let Some(max) = backend.max_output_tokens {
            builder = builder.max_output_tokens(max);
        }
        if let Some(secs) = backend.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("no API key configured: set {API_KEY_VAR} or backend.api_key")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.model, "gemini-1.5-flash");
        assert_eq!(
            config.backend.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.tool_host.command, "tether-toolbox");
        assert!(config.tool_host.timeout_secs.is_none());
    }

    #[test]
    fn parses_full_file() {
        let config = Config::parse(
            r#"
            [backend]
            model = "gemini-2.0-flash"
            api_key = "from-file"
            system = "Be brief."
            max_output_tokens = 512
            timeout_secs = 60

            [tool_host]
            name = "weather"
            command = "python"
            args = ["server.py"]
            env = { LOG = "1" }
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.model, "gemini-2.0-flash");
        assert_eq!(config.api_key().unwrap(), "from-file");
        assert_eq!(config.backend.max_output_tokens, Some(512));

        let server = config.tool_host.server_config();
        assert_eq!(server.name, "weather");
        assert_eq!(server.command, "python");
        assert_eq!(server.args, ["server.py"]);
        assert_eq!(server.env["LOG"], "1");
        assert_eq!(server.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::parse(
            r#"
            [backend]
            model = "gemini-pro"
            api_key = "from-file"
            "#,
        )
        .unwrap();

        config.apply_env(|name| match name {
            API_KEY_VAR => Some("from-env".to_string()),
            MODEL_VAR => Some("gemini-1.5-pro".to_string()),
            _ => None,
        });

        assert_eq!(config.api_key().unwrap(), "from-env");
        assert_eq!(config.backend.model, "gemini-1.5-pro");
    }

    #[test]
    fn missing_or_blank_key_is_an_error() {
        let mut config = Config::default();
        config.apply_env(no_env);
        assert!(matches!(config.api_key(), Err(ConfigError::MissingApiKey)));

        config.backend.api_key = Some("   ".to_string());
        assert!(matches!(config.backend(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn builds_backend() {
        let mut config = Config::default();
        config.backend.api_key = Some("key".to_string());
        let backend = config.backend().unwrap();
        assert_eq!(backend.to_string(), "gemini(gemini-1.5-flash)");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = Config::parse("[backend\nmodel = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let err = Config::discover(Some(Path::new("/nonexistent/tether.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
