use crate::error::DetectError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_log_level"
    )]
    pub log_level: LogLevel,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.backend.validate()?;
        Ok(())
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_message_size_mb")]
    pub max_message_size_mb: usize,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_workers() -> usize {
    10
}

fn default_max_message_size_mb() -> usize {
    100
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, DetectError> {
        self.get_address()
            .parse()
            .map_err(|e| DetectError::Config(format!("invalid address {}: {}", self.get_address(), e)))
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size_mb * 1024 * 1024
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("server.workers must be at least 1".to_string());
        }
        if self.max_message_size_mb == 0 {
            return Err("server.max_message_size_mb must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ort,
    #[serde(alias = "open_vino")]
    OpenVino,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ort => "ort",
            BackendKind::OpenVino => "openvino",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model_path: PathBuf,
    #[serde(default = "default_mode")]
    pub mode: String,
    pub label_schema_path: PathBuf,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    #[serde(default = "default_native_preprocessing")]
    pub use_native_preprocessing: bool,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

fn default_mode() -> String {
    "cpu".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.25
}

fn default_score_threshold() -> f32 {
    0.2
}

fn default_nms_threshold() -> f32 {
    0.45
}

fn default_native_preprocessing() -> bool {
    true
}

fn default_input_size() -> u32 {
    640
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(5)
}

/// Higher `confidence` and `score` keep fewer boxes; lower `nms` suppresses
/// more of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub confidence: f32,
    pub score: f32,
    pub nms: f32,
}

impl BackendConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.confidence_threshold,
            score: self.score_threshold,
            nms: self.nms_threshold,
        }
    }

    pub fn device(&self) -> Device {
        Device::parse(&self.mode)
    }
}

impl Validatable for BackendConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("score_threshold", self.score_threshold),
            ("nms_threshold", self.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("backend.{} must lie in [0, 1], got {}", name, value));
            }
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(format!(
                "backend.input_size must be a positive multiple of 32, got {}",
                self.input_size
            ));
        }
        if self.num_instances == 0 {
            return Err("backend.num_instances must be at least 1".to_string());
        }
        if !self.model_path.exists() {
            return Err(format!("Model file not found: {:?}", self.model_path));
        }
        if !self.label_schema_path.exists() {
            return Err(format!(
                "Label schema not found: {:?}",
                self.label_schema_path
            ));
        }
        Ok(())
    }
}

/// Execution device parsed from `backend.mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu(i32),
    /// Any other device name, passed through to the runtime as-is.
    Named(String),
}

impl Device {
    pub fn parse(mode: &str) -> Self {
        let mode = mode.trim().to_lowercase();
        match mode.as_str() {
            "cpu" => Device::Cpu,
            "gpu" | "cuda" => Device::Gpu(0),
            other => {
                let index = other
                    .strip_prefix("gpu.")
                    .or_else(|| other.strip_prefix("cuda:"))
                    .and_then(|id| id.parse().ok());
                match index {
                    Some(id) => Device::Gpu(id),
                    None => Device::Named(other.to_uppercase()),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("server")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), environment)
}

pub fn load_configuration(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings = settings.try_deserialize::<Config>()?;
    if let Err(e) = settings.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(settings)
}
