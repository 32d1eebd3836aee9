pub use agentrader_domain::services::agent::{DecisionRequest, DecisionResponse};
use agentrader_domain::repositories::decision::DecisionClient;
use agentrader_domain::value_objects::decision::Decision;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct DecisionCallInfo {
    pub attempts: u32,
    pub duration_ms: u64,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionCallResult {
    pub info: DecisionCallInfo,
    pub response: Option<DecisionResponse>,
}

/// Blocking client for a decision service exposing `POST /v1/decide`.
pub struct HttpDecisionClient {
    pub url: String,
    pub timeout_ms: u64,
    pub retries: u32,
    client: Client,
}

impl HttpDecisionClient {
    pub fn new(url: String, timeout_ms: u64, retries: u32) -> Result<Self, String> {
        if url.trim().is_empty() {
            return Err("decision service url is empty".to_string());
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|err| format!("failed to build http client: {err}"))?;
        Ok(Self {
            url,
            timeout_ms,
            retries,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/decide", self.url.trim_end_matches('/'))
    }

    /// Retries transport failures and 5xx answers up to `retries` times.
    /// Any other status, or a body that fails validation, stops immediately.
    pub fn decide_detailed(&self, request: &DecisionRequest) -> DecisionCallResult {
        let endpoint = self.endpoint();
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;

        while attempts <= self.retries {
            attempts += 1;
            match self.client.post(&endpoint).json(request).send() {
                Ok(resp) => {
                    last_status = Some(resp.status().as_u16());
                    if resp.status() == StatusCode::OK {
                        match resp.json::<DecisionResponse>() {
                            Ok(parsed) => match validate_decision_response(&parsed) {
                                Ok(()) => {
                                    return DecisionCallResult {
                                        info: DecisionCallInfo {
                                            attempts,
                                            duration_ms: start.elapsed().as_millis() as u64,
                                            status: last_status,
                                            error: None,
                                        },
                                        response: Some(parsed),
                                    };
                                }
                                Err(err) => {
                                    last_error = Some(err);
                                    break;
                                }
                            },
                            Err(err) => {
                                last_error =
                                    Some(format!("failed to parse decision response: {err}"));
                                break;
                            }
                        }
                    }

                    if resp.status().is_server_error() && attempts <= self.retries {
                        continue;
                    }
                    last_error = Some(format!(
                        "decision service http error: status {}",
                        resp.status().as_u16()
                    ));
                    break;
                }
                Err(err) => {
                    last_error = Some(format!("decision request failed: {err}"));
                    if attempts <= self.retries {
                        continue;
                    }
                    break;
                }
            }
        }

        DecisionCallResult {
            info: DecisionCallInfo {
                attempts,
                duration_ms: start.elapsed().as_millis() as u64,
                status: last_status,
                error: last_error
                    .or_else(|| Some("decision request failed after retries".to_string())),
            },
            response: None,
        }
    }
}

impl DecisionClient for HttpDecisionClient {
    fn decide(&self, request: &DecisionRequest) -> Result<DecisionResponse, String> {
        let result = self.decide_detailed(request);
        let result_label = if result.response.is_some() { "ok" } else { "err" };
        metrics::counter!("agentrader.infra.decision.calls_total", "result" => result_label)
            .increment(1);
        metrics::counter!("agentrader.infra.decision.attempts_total")
            .increment(u64::from(result.info.attempts));
        metrics::histogram!("agentrader.infra.decision.call_ms")
            .record(result.info.duration_ms as f64);

        match result.response {
            Some(response) => {
                tracing::debug!(
                    attempts = result.info.attempts,
                    duration_ms = result.info.duration_ms,
                    decision = %response.decision,
                    "decision received"
                );
                Ok(response)
            }
            None => {
                let error = result
                    .info
                    .error
                    .unwrap_or_else(|| "decision request failed".to_string());
                tracing::warn!(
                    attempts = result.info.attempts,
                    status = ?result.info.status,
                    error = %error,
                    "decision request failed"
                );
                Err(error)
            }
        }
    }
}

fn validate_decision_response(response: &DecisionResponse) -> Result<(), String> {
    response.decision.parse::<Decision>()?;
    if let Some(confidence) = response.confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("invalid confidence: {}", confidence));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_decision_response, HttpDecisionClient};
    use agentrader_domain::repositories::decision::DecisionClient;
    use agentrader_domain::services::agent::{DecisionRequest, DecisionResponse};

    fn response(decision: &str, confidence: Option<f64>) -> DecisionResponse {
        DecisionResponse {
            decision: decision.to_string(),
            confidence,
            reasoning: None,
            model: None,
        }
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = HttpDecisionClient::new("http://127.0.0.1:8000/".to_string(), 200, 0)
            .expect("decision client");
        assert_eq!(client.endpoint(), "http://127.0.0.1:8000/v1/decide");
    }

    #[test]
    fn rejects_empty_url() {
        assert!(HttpDecisionClient::new("  ".to_string(), 200, 0).is_err());
    }

    #[test]
    fn validates_decision_and_confidence() {
        assert!(validate_decision_response(&response("BUY", Some(0.9))).is_ok());
        assert!(validate_decision_response(&response("hold", None)).is_ok());
        assert!(validate_decision_response(&response("SHORT", None)).is_err());
        assert!(validate_decision_response(&response("SELL", Some(1.5))).is_err());
        assert!(validate_decision_response(&response("SELL", Some(f64::NAN))).is_err());
    }

    #[test]
    fn unreachable_service_exhausts_retries() {
        // nothing listens on the discard port
        let client = HttpDecisionClient::new("http://127.0.0.1:9".to_string(), 500, 2)
            .expect("decision client");
        let request = DecisionRequest {
            run_id: "run".to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            history: Vec::new(),
        };
        let result = client.decide_detailed(&request);
        assert_eq!(result.info.attempts, 3);
        assert!(result.response.is_none());
        assert!(result.info.status.is_none());
        assert!(client.decide(&request).is_err());
    }
}
