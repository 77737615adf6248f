use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Joins the original question and the user's answer to a clarification
pub const DEFAULT_CLARIFICATION_SEPARATOR: &str = "\n\nAdditional context: ";

/// Per-session settings sent with or applied to every turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Chairman override; the service default when `None`
    pub chairman_model: Option<String>,

    /// Council member override; the service default when `None`
    pub council_models: Option<Vec<String>>,

    /// Inserted between the original query and clarification answers
    pub clarification_separator: String,

    /// Transcription model override
    pub stt_model: Option<String>,

    /// Format tag sent with recordings
    pub stt_format: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chairman_model: None,
            council_models: None,
            clarification_separator: DEFAULT_CLARIFICATION_SEPARATOR.to_string(),
            stt_model: None,
            stt_format: "wav".to_string(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            chairman_model: cfg.council.chairman_model.clone(),
            council_models: cfg.council.council_models.clone(),
            stt_model: cfg.stt.model.clone(),
            stt_format: cfg.stt.format.clone(),
            ..Self::default()
        }
    }
}
