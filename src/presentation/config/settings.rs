use std::path::{Path, PathBuf};
use std::time::Duration;

use config::Environment as EnvironmentSource;
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use super::Environment;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: Environment,
    pub server: ServerSettings,
    pub cors: CorsSettings,
    pub model: ModelSettings,
    pub normalizer: NormalizerSettings,
    pub workspace: WorkspaceSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(MIB)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl CorsSettings {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub provider: SpeechModelProvider,
    pub name: String,
    pub compute_type: ComputeType,
    pub threads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechModelProvider {
    Local,
    Mock,
}

/// Tensor precision for the local model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    #[serde(alias = "float32")]
    F32,
    #[serde(alias = "float16")]
    F16,
    #[serde(alias = "bfloat16")]
    Bf16,
    Int8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerSettings {
    pub ffmpeg_path: PathBuf,
    pub timeout_secs: u64,
}

impl NormalizerSettings {
    /// `None` when the timeout is disabled with `0`.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

impl Settings {
    /// Loads settings for the environment named by `APP_ENVIRONMENT` from the
    /// working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = Environment::from_env().map_err(ConfigError::Message)?;
        Self::load_from(Path::new("."), environment)
    }

    /// Layers defaults, `appsettings.toml`, `appsettings.<env>.toml`, `APP_*`
    /// variables and finally the legacy variable names.
    pub fn load_from(config_dir: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let base = config_dir.join("appsettings.toml");
        let overlay = config_dir.join(format!("appsettings.{}.toml", environment.as_str()));

        let configuration = Self::with_defaults(Config::builder())?
            .set_override("environment", environment.as_str())?
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                EnvironmentSource::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_override_option("model.name", legacy_var("WHISPER_MODEL"))?
            .set_override_option(
                "model.compute_type",
                legacy_var("WHISPER_COMPUTE").map(|v| legacy_compute_type(&v)),
            )?
            .set_override_option("model.threads", legacy_var("WHISPER_THREADS"))?
            .set_override_option(
                "cors.allowed_origins",
                legacy_var("ALLOW_ORIGINS").map(split_origins),
            )?
            .build()?;

        configuration.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.max_upload_mb", 512)?
            .set_default(
                "cors.allowed_origins",
                vec!["http://localhost:3000", "http://127.0.0.1:3000"],
            )?
            .set_default("model.provider", "local")?
            .set_default("model.name", "base.en")?
            .set_default("model.compute_type", "f32")?
            .set_default("model.threads", 6)?
            .set_default("normalizer.ffmpeg_path", "ffmpeg")?
            .set_default("normalizer.timeout_secs", 600)?
            .set_default(
                "workspace.root",
                std::env::temp_dir().to_string_lossy().into_owned(),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.enable_json", false)
    }
}

fn legacy_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Quantised variants such as `int8_float16` collapse to `int8`.
fn legacy_compute_type(raw: &str) -> String {
    let raw = raw.trim().to_lowercase();
    if raw.starts_with("int8") {
        "int8".to_string()
    } else {
        raw
    }
}

pub fn split_origins(raw: String) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}
