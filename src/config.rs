use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub council: CouncilConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            request_timeout_secs: 600, // Full council runs take minutes
        }
    }
}

/// Model selection sent with every turn; `None` lets the service pick its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub chairman_model: Option<String>,
    pub council_models: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.council-client".to_string(),
            namespace: "llm-council".to_string(),
        }
    }
}

impl StorageConfig {
    /// Data directory with `~` and environment variables expanded.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.data_dir)?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per captured block
    pub block_size: usize,
    /// Input device name (default device when unset)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            device: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub model: Option<String>,
    pub format: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: None,
            format: "wav".to_string(),
        }
    }
}

impl Config {
    /// Load from an optional config file layered with `COUNCIL_*` environment variables
    /// (e.g. `COUNCIL_SERVICE__BASE_URL`).
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("COUNCIL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
