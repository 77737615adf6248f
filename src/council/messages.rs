use serde::{Deserialize, Serialize};

/// Body of a streamed turn request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chairman_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub council_models: Option<Vec<String>>,
    #[serde(default)]
    pub skip_clarification: bool,
    #[serde(default)]
    pub is_first_message: bool,
}

/// Models the service offers and its defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub available_models: Vec<String>,
    pub default_council_models: Vec<String>,
    pub default_chairman_model: String,
}

/// Speech-to-text result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}
