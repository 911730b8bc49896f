use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted `audio.filter_half_taps`.
pub const MAX_FILTER_HALF_TAPS: usize = 64;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub asr: AsrConfig,

    #[serde(default)]
    pub destinations: Option<toml::Value>,

    #[serde(default)]
    pub routes: Vec<DestinationRouteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Host advertised in the TwiML stream URL; the request `Host` header otherwise.
    #[serde(default)]
    pub public_host: Option<String>,

    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            public_host: None,
            stream_path: default_stream_path(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Seconds of 16 kHz output the transcoder buffer reserves.
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: u32,

    #[serde(default = "default_filter_half_taps")]
    pub filter_half_taps: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: default_buffer_seconds(),
            filter_half_taps: default_filter_half_taps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AsrConfig {
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default)]
    pub null: Option<NullEngineConfig>,

    #[serde(default)]
    pub vosk: Option<VoskConfig>,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            null: None,
            vosk: None,
        }
    }
}

impl AsrConfig {
    /// Engine-specific table for the selected engine, empty when absent.
    pub fn engine_config(&self) -> Result<toml::Value, ConfigError> {
        let section = match self.engine.as_str() {
            "null" => self.null.as_ref().map(toml::Value::try_from),
            "vosk" => self.vosk.as_ref().map(toml::Value::try_from),
            _ => None,
        };
        match section {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(ConfigError::Invalid(format!(
                "failed to serialize [asr.{}]: {e}",
                self.engine
            ))),
            None => Ok(toml::Value::Table(Default::default())),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NullEngineConfig {
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u32,

    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: i16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VoskConfig {
    pub model_path: String,

    #[serde(default)]
    pub words: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationRouteConfig {
    pub plugin: String,

    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub include_partials: bool,

    #[serde(flatten)]
    pub extra: toml::Value,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_buffer_seconds() -> u32 {
    1
}

fn default_filter_half_taps() -> usize {
    16
}

fn default_close_timeout_ms() -> u64 {
    2000
}

fn default_engine() -> String {
    "null".to_string()
}

fn default_silence_ms() -> u32 {
    500
}

fn default_silence_threshold() -> i16 {
    64
}

/// Interpolate `${VAR}` patterns with environment variable values.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    let mut result = input.to_string();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let val = std::env::var(var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
        result = result.replace(&cap[0], &val);
    }

    Ok(result)
}

impl AppConfig {
    /// Load configuration from a TOML file, with environment variable interpolation.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(s)?;
        let config: AppConfig = toml::from_str(&interpolated)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if !self.server.stream_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.stream_path must start with '/': {:?}",
                self.server.stream_path
            )));
        }
        if matches!(self.server.stream_path.as_str(), "/" | "/voice") {
            return Err(ConfigError::Invalid(format!(
                "server.stream_path {:?} collides with a built-in route",
                self.server.stream_path
            )));
        }
        if self.audio.buffer_seconds == 0 {
            return Err(ConfigError::Invalid("audio.buffer_seconds must be at least 1".into()));
        }
        if self.audio.filter_half_taps == 0 || self.audio.filter_half_taps > MAX_FILTER_HALF_TAPS {
            return Err(ConfigError::Invalid(format!(
                "audio.filter_half_taps must be in 1..={MAX_FILTER_HALF_TAPS}, got {}",
                self.audio.filter_half_taps
            )));
        }
        Ok(())
    }
}
