use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(self) -> bool {
        matches!(self, RuntimeEnvironment::Production)
    }

    /// Staging and production both run with stricter validation (e.g. no
    /// fallback to an empty GPU topology).
    pub fn is_strict(self) -> bool {
        matches!(self, RuntimeEnvironment::Staging | RuntimeEnvironment::Production)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_cors_enabled(),
            cors_origins: Vec::new(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

fn default_query_interval_ms() -> u64 {
    5_000
}

fn default_max_consecutive_query_errors() -> u32 {
    5
}

fn default_inference_timeout_s() -> u64 {
    1_800
}

fn default_chunk_inference_timeout_s() -> u64 {
    600
}

fn default_stabilize_poll_ms() -> u64 {
    2_000
}

fn default_stabilize_stable_polls() -> u32 {
    3
}

fn default_output_missing_grace_s() -> u64 {
    10
}

fn default_task_table_capacity() -> usize {
    1_000
}

fn default_reserve_many_wait_s() -> u64 {
    60
}

fn default_min_output_bytes() -> u64 {
    100 * 1024
}

fn default_min_stable_bytes() -> u64 {
    10 * 1024
}

fn default_min_tts_bytes() -> u64 {
    10 * 1024
}

/// Timeouts and capacities for the task engine and pipeline driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_query_interval_ms")]
    pub query_interval_ms: u64,
    #[serde(default = "default_max_consecutive_query_errors")]
    pub max_consecutive_query_errors: u32,
    #[serde(default = "default_inference_timeout_s")]
    pub inference_timeout_s: u64,
    #[serde(default = "default_chunk_inference_timeout_s")]
    pub chunk_inference_timeout_s: u64,
    #[serde(default = "default_stabilize_poll_ms")]
    pub stabilize_poll_ms: u64,
    #[serde(default = "default_stabilize_stable_polls")]
    pub stabilize_stable_polls: u32,
    #[serde(default = "default_output_missing_grace_s")]
    pub output_missing_grace_s: u64,
    #[serde(default = "default_task_table_capacity")]
    pub task_table_capacity: usize,
    #[serde(default = "default_reserve_many_wait_s")]
    pub reserve_many_wait_s: u64,
    #[serde(default = "default_min_output_bytes")]
    pub min_output_bytes: u64,
    #[serde(default = "default_min_stable_bytes")]
    pub min_stable_bytes: u64,
    #[serde(default = "default_min_tts_bytes")]
    pub min_tts_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_interval_ms: default_query_interval_ms(),
            max_consecutive_query_errors: default_max_consecutive_query_errors(),
            inference_timeout_s: default_inference_timeout_s(),
            chunk_inference_timeout_s: default_chunk_inference_timeout_s(),
            stabilize_poll_ms: default_stabilize_poll_ms(),
            stabilize_stable_polls: default_stabilize_stable_polls(),
            output_missing_grace_s: default_output_missing_grace_s(),
            task_table_capacity: default_task_table_capacity(),
            reserve_many_wait_s: default_reserve_many_wait_s(),
            min_output_bytes: default_min_output_bytes(),
            min_stable_bytes: default_min_stable_bytes(),
            min_tts_bytes: default_min_tts_bytes(),
        }
    }
}

fn default_gpu_host() -> String {
    "localhost".to_string()
}

/// One physical GPU's static topology entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSlotConfig {
    pub id: u32,
    #[serde(default = "default_gpu_host")]
    pub host: String,
    pub inference_port: u16,
    pub tts_port: u16,
    pub staging_dir: PathBuf,
}

/// The full set of configured GPU slots, in ascending id order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuTopology(pub Vec<GpuSlotConfig>);

impl GpuTopology {
    fn default_three(staging_root: &str) -> Self {
        GpuTopology(vec![
            GpuSlotConfig {
                id: 0,
                host: default_gpu_host(),
                inference_port: 8390,
                tts_port: 18182,
                staging_dir: PathBuf::from(format!("{staging_root}/gpu0")),
            },
            GpuSlotConfig {
                id: 1,
                host: default_gpu_host(),
                inference_port: 8391,
                tts_port: 18183,
                staging_dir: PathBuf::from(format!("{staging_root}/gpu1")),
            },
            GpuSlotConfig {
                id: 2,
                host: default_gpu_host(),
                inference_port: 8392,
                tts_port: 18184,
                staging_dir: PathBuf::from(format!("{staging_root}/gpu2")),
            },
        ])
    }
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("data/outputs")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("data/tmp")
}

fn default_default_video() -> PathBuf {
    PathBuf::from("data/defaults/default_video.mp4")
}

fn default_default_reference_audio() -> PathBuf {
    PathBuf::from("data/defaults/default_audio.wav")
}

/// Filesystem roots shared with the inference backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_default_video")]
    pub default_video: PathBuf,
    #[serde(default = "default_default_reference_audio")]
    pub default_reference_audio: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            outputs_dir: default_outputs_dir(),
            temp_dir: default_temp_dir(),
            default_video: default_default_video(),
            default_reference_audio: default_default_reference_audio(),
        }
    }
}

/// A single registered avatar's `(video, audio)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarEntry {
    pub id: String,
    pub display_name: String,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AvatarConfig(pub Vec<AvatarEntry>);

/// Top-level, deserializable settings object. Every section carries defaults
/// so `Settings::default()` and partial overrides both work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gpu: GpuTopology,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub avatars: AvatarConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let paths = PathsConfig::default();
        let gpu = GpuTopology::default_three(&paths.staging_root.to_string_lossy());
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
            gpu,
            paths,
            avatars: AvatarConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".into(),
                message: "must be nonzero".into(),
            });
        }
        if self.gpu.0.is_empty() && self.environment.is_strict() {
            return Err(ConfigError::InvalidValue {
                field: "gpu".into(),
                message: "at least one GPU slot is required outside development".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for slot in &self.gpu.0 {
            if !seen.insert(slot.id) {
                return Err(ConfigError::InvalidValue {
                    field: "gpu".into(),
                    message: format!("duplicate GPU id {}", slot.id),
                });
            }
        }
        if self.engine.task_table_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.task_table_capacity".into(),
                message: "must be nonzero".into(),
            });
        }
        Ok(())
    }
}

/// Loads settings from `config/default.{toml,yaml}`, an optional
/// `config/<env>.{toml,yaml}`, then `GPU_ORCH__*` environment overrides, and
/// validates the result.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();
    builder = builder.add_source(File::with_name("config/default").required(false));
    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix("GPU_ORCH").separator("__").try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.gpu.0.len(), 3);
        assert_eq!(settings.engine.task_table_capacity, 1_000);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
        settings.server.port = 9000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_duplicate_gpu_ids_rejected() {
        let mut settings = Settings::default();
        settings.gpu.0[1].id = settings.gpu.0[0].id;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_strict_environment_requires_gpus() {
        let mut settings = Settings::default();
        settings.gpu.0.clear();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());
        settings.environment = RuntimeEnvironment::Development;
        assert!(settings.validate().is_ok());
    }
}
