use crate::services::agent::{DecisionRequest, DecisionResponse};

/// Port to an external decision service (e.g. a multi-agent LLM pipeline).
pub trait DecisionClient {
    fn decide(&self, request: &DecisionRequest) -> Result<DecisionResponse, String>;
}
