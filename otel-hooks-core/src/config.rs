//! Configuration loading and management
//!
//! Configuration is layered, lowest precedence first:
//!
//! 1. Global: `$XDG_CONFIG_HOME/otel-hooks/config.toml` (~/.config/otel-hooks/config.toml)
//! 2. Project: `.otel-hooks.toml` in the working directory
//! 3. Environment variables (`OTEL_HOOKS_*`, plus the provider-native names
//!    such as `LANGFUSE_PUBLIC_KEY` or `OTEL_EXPORTER_OTLP_ENDPOINT`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! Paths follow the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/otel-hooks/`
//! - State/Logs: `$XDG_STATE_HOME/otel-hooks/` (~/.local/state/otel-hooks/)

use crate::error::{Error, Result};
use crate::paths::{expand_home, home_dir};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default truncation limit (characters) for prompt/response/tool text.
pub const DEFAULT_MAX_CHARS: usize = 20_000;

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Provider name (langfuse, otlp, datadog). No provider means the hook is a no-op.
    #[serde(default)]
    pub provider: Option<String>,

    /// Force debug-level logging
    #[serde(default)]
    pub debug: bool,

    /// Truncation limit for emitted text, in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Override for the directory holding the state file, lock and logs
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Session state retention and locking
    #[serde(default)]
    pub state: StateConfig,

    /// File attribution reporting
    #[serde(default)]
    pub attribution: AttributionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Langfuse provider settings
    #[serde(default)]
    pub langfuse: LangfuseConfig,

    /// OTLP provider settings
    #[serde(default)]
    pub otlp: OtlpConfig,

    /// Datadog provider settings
    #[serde(default)]
    pub datadog: DatadogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            debug: false,
            max_chars: default_max_chars(),
            state_dir: None,
            state: StateConfig::default(),
            attribution: AttributionConfig::default(),
            logging: LoggingConfig::default(),
            langfuse: LangfuseConfig::default(),
            otlp: OtlpConfig::default(),
            datadog: DatadogConfig::default(),
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

/// Session state configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// Entries not updated for this many days are dropped on save (0 keeps everything)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How long to retry the advisory state lock before proceeding without it
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

/// Attribution configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AttributionConfig {
    /// Emit file attribution records after each committed batch
    #[serde(default)]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Langfuse provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LangfuseConfig {
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default = "default_langfuse_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LangfuseConfig {
    fn default() -> Self {
        Self {
            public_key: None,
            secret_key: None,
            base_url: default_langfuse_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LangfuseConfig {
    /// Check if both keys are present
    pub fn is_ready(&self) -> bool {
        self.public_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.secret_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

fn default_langfuse_base_url() -> String {
    "https://cloud.langfuse.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// OTLP/HTTP provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OtlpConfig {
    /// Collector endpoint, e.g. `http://localhost:4318`
    pub endpoint: Option<String>,
    /// Extra headers as `key=value,key2=value2`
    pub headers: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            headers: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OtlpConfig {
    /// Parse the `headers` string into pairs, skipping entries without `=`
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let k = k.trim();
                (!k.is_empty()).then(|| (k.to_string(), v.trim().to_string()))
            })
            .collect()
    }
}

/// Datadog Agent provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatadogConfig {
    #[serde(default = "default_datadog_service")]
    pub service: String,
    pub env: Option<String>,
    #[serde(default = "default_datadog_host")]
    pub agent_host: String,
    #[serde(default = "default_datadog_port")]
    pub agent_port: u16,
    #[serde(default = "default_datadog_timeout")]
    pub timeout_secs: u64,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            service: default_datadog_service(),
            env: None,
            agent_host: default_datadog_host(),
            agent_port: default_datadog_port(),
            timeout_secs: default_datadog_timeout(),
        }
    }
}

fn default_datadog_service() -> String {
    "otel-hooks".to_string()
}

fn default_datadog_host() -> String {
    "localhost".to_string()
}

fn default_datadog_port() -> u16 {
    8126
}

fn default_datadog_timeout() -> u64 {
    2
}

impl Config {
    /// Load the merged global + project configuration with environment overrides.
    ///
    /// Rejected environment values are logged through the current subscriber.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_files()?;
        for invalid in config.apply_env_overrides(|key| std::env::var(key).ok()) {
            tracing::warn!("{}", invalid);
        }
        Ok(config)
    }

    /// Load the merged global + project configuration files only.
    pub fn load_files() -> Result<Self> {
        let project = std::env::current_dir()
            .map(|cwd| cwd.join(Self::PROJECT_FILE_NAME))
            .ok();

        let mut layers = vec![Self::config_path()];
        layers.extend(project);

        Self::load_layers(&layers)
    }

    /// File name of the per-project config layer
    pub const PROJECT_FILE_NAME: &'static str = ".otel-hooks.toml";

    /// Load configuration from a single file, without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layers(&[path.to_path_buf()])
    }

    /// Merge the given TOML files in order; missing files are skipped.
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in paths {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("failed to read config file {:?}: {}", path, e))
            })?;
            let layer: toml::Table = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {:?}: {}", path, e)))?;
            merge_tables(&mut merged, layer);
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }

    /// Apply environment variable overrides using `lookup` to read variables.
    ///
    /// Values that fail to parse leave the setting untouched and are returned
    /// so the caller can report them once logging is up.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<InvalidEnvVar>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut invalid = Vec::new();

        if let Some(v) = get("OTEL_HOOKS_PROVIDER") {
            self.provider = Some(v);
        }
        if let Some(v) = get("OTEL_HOOKS_DEBUG") {
            self.debug = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Some(v) = get("OTEL_HOOKS_MAX_CHARS") {
            match v.parse() {
                Ok(n) => self.max_chars = n,
                Err(_) => invalid.push(InvalidEnvVar::new("OTEL_HOOKS_MAX_CHARS", v)),
            }
        }
        if let Some(v) = get("OTEL_HOOKS_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(v));
        }

        if let Some(v) = get("LANGFUSE_PUBLIC_KEY") {
            self.langfuse.public_key = Some(v);
        }
        if let Some(v) = get("LANGFUSE_SECRET_KEY") {
            self.langfuse.secret_key = Some(v);
        }
        if let Some(v) = get("LANGFUSE_BASE_URL") {
            self.langfuse.base_url = v;
        }

        if let Some(v) = get("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.otlp.endpoint = Some(v);
        }
        if let Some(v) = get("OTEL_EXPORTER_OTLP_HEADERS") {
            self.otlp.headers = Some(v);
        }

        if let Some(v) = get("DD_SERVICE") {
            self.datadog.service = v;
        }
        if let Some(v) = get("DD_ENV") {
            self.datadog.env = Some(v);
        }
        if let Some(v) = get("DD_AGENT_HOST") {
            self.datadog.agent_host = v;
        }
        if let Some(v) = get("DD_TRACE_AGENT_PORT") {
            match v.parse() {
                Ok(port) => self.datadog.agent_port = port,
                Err(_) => invalid.push(InvalidEnvVar::new("DD_TRACE_AGENT_PORT", v)),
            }
        }

        invalid
    }

    /// Returns the global config file path
    ///
    /// `$XDG_CONFIG_HOME/otel-hooks/config.toml` (~/.config/otel-hooks/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("otel-hooks").join("config.toml")
    }

    /// Returns the default state directory path
    ///
    /// `$XDG_STATE_HOME/otel-hooks/` (~/.local/state/otel-hooks/)
    pub fn default_state_dir() -> PathBuf {
        xdg_state_home().join("otel-hooks")
    }

    /// Returns the configured state directory, or the default one
    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => expand_home(&dir.to_string_lossy()),
            None => Self::default_state_dir(),
        }
    }
}

/// An environment override that failed to parse and was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvVar {
    pub key: &'static str,
    pub value: String,
}

impl InvalidEnvVar {
    fn new(key: &'static str, value: String) -> Self {
        Self { key, value }
    }
}

impl fmt::Display for InvalidEnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}={:?}; ignoring", self.key, self.value)
    }
}

/// Merge `overlay` into `base`; nested tables merge key by key, anything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
