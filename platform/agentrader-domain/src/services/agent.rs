use crate::value_objects::candle::Candle;
use serde::{Deserialize, Serialize};

/// Request sent to an external decision service once per bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub run_id: String,
    pub symbol: String,
    pub interval: String,
    pub timestamp: String,
    pub history: Vec<Candle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub decision: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}
