use crate::entities::result::format_timestamp;
use crate::error::BacktestError;
use crate::repositories::decision::DecisionClient;
use crate::services::agent::{DecisionRequest, DecisionResponse};
use crate::services::audit::AuditEvent;
use crate::value_objects::candle::Candle;
use crate::value_objects::decision::Decision;
use serde_json::json;
use std::cmp::Ordering;

/// Source of BUY / SELL / HOLD decisions. `history` holds every candle that
/// closed before the bar being traded.
pub trait DecisionSource {
    fn name(&self) -> &str;

    fn decide(&mut self, history: &[Candle]) -> Decision;

    fn drain_audit_events(&mut self) -> Vec<AuditEvent> {
        Vec::new()
    }
}

/// Dual simple-moving-average crossover on closes.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    short_period: usize,
    long_period: usize,
    name: String,
}

impl SmaCrossover {
    pub fn new(short_period: usize, long_period: usize) -> Result<Self, BacktestError> {
        if short_period == 0 {
            return Err(BacktestError::invalid_config("sma short_period must be > 0"));
        }
        if short_period >= long_period {
            return Err(BacktestError::invalid_config(format!(
                "sma short_period ({short_period}) must be < long_period ({long_period})"
            )));
        }
        Ok(Self {
            short_period,
            long_period,
            name: format!("sma_crossover_{short_period}_{long_period}"),
        })
    }

    pub fn short_period(&self) -> usize {
        self.short_period
    }

    pub fn long_period(&self) -> usize {
        self.long_period
    }

    fn sma(history: &[Candle], period: usize) -> Option<f64> {
        if period == 0 || history.len() < period {
            return None;
        }
        let window = &history[history.len() - period..];
        Some(window.iter().map(|c| c.close).sum::<f64>() / period as f64)
    }

    /// Short SMA relative to long SMA, `None` until enough closes exist.
    fn relation(&self, history: &[Candle]) -> Option<Ordering> {
        let short = Self::sma(history, self.short_period)?;
        let long = Self::sma(history, self.long_period)?;
        short.partial_cmp(&long)
    }
}

impl DecisionSource for SmaCrossover {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, history: &[Candle]) -> Decision {
        let Some(current) = self.relation(history) else {
            return Decision::Hold;
        };
        let previous = match history.len() {
            0 | 1 => None,
            len => self.relation(&history[..len - 1]),
        };

        // A long SMA that was not yet defined counts as "not above".
        match (previous, current) {
            (Some(Ordering::Greater), Ordering::Greater) => Decision::Hold,
            (_, Ordering::Greater) => Decision::Buy,
            (Some(Ordering::Greater | Ordering::Equal), Ordering::Less) => Decision::Sell,
            _ => Decision::Hold,
        }
    }
}

/// Adapts a plain closure into a decision source.
pub struct FnDecision<F>
where
    F: FnMut(&[Candle]) -> Decision,
{
    name: String,
    func: F,
}

impl<F> FnDecision<F>
where
    F: FnMut(&[Candle]) -> Decision,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> DecisionSource for FnDecision<F>
where
    F: FnMut(&[Candle]) -> Decision,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, history: &[Candle]) -> Decision {
        (self.func)(history)
    }
}

pub struct HoldStrategy;

impl DecisionSource for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }

    fn decide(&mut self, _history: &[Candle]) -> Decision {
        Decision::Hold
    }
}

/// Buys on the first tradable bar and never sells; BUY while long is ignored
/// by the simulator.
pub struct BuyAndHold;

impl DecisionSource for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn decide(&mut self, _history: &[Candle]) -> Decision {
        Decision::Buy
    }
}

/// Decisions delegated to an external service through [`DecisionClient`].
pub struct AgentDecision {
    pub run_id: String,
    pub symbol: String,
    pub interval: String,
    pub history_window: usize,
    pub fallback: Decision,
    client: Box<dyn DecisionClient>,
    audit_events: Vec<AuditEvent>,
}

impl AgentDecision {
    pub fn new(
        run_id: String,
        symbol: String,
        interval: String,
        history_window: usize,
        fallback: Decision,
        client: Box<dyn DecisionClient>,
    ) -> Self {
        Self {
            run_id,
            symbol,
            interval,
            history_window: history_window.max(1),
            fallback,
            client,
            audit_events: Vec::new(),
        }
    }

    fn build_request(&self, history: &[Candle], last: &Candle) -> DecisionRequest {
        let start = history.len().saturating_sub(self.history_window);
        DecisionRequest {
            run_id: self.run_id.clone(),
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            timestamp: format_timestamp(last.timestamp),
            history: history[start..].to_vec(),
        }
    }

    fn audit(
        &mut self,
        timestamp: i64,
        action: &str,
        error: Option<String>,
        details: serde_json::Value,
    ) {
        self.audit_events.push(AuditEvent {
            run_id: self.run_id.clone(),
            timestamp,
            stage: "agent".to_string(),
            symbol: Some(self.symbol.clone()),
            action: action.to_string(),
            error,
            details,
        });
    }

    fn resolve(&mut self, timestamp: i64, response: &DecisionResponse) -> Decision {
        match response.decision.parse::<Decision>() {
            Ok(decision) => {
                self.audit(
                    timestamp,
                    "call",
                    None,
                    json!({
                        "decision": decision.as_str(),
                        "confidence": response.confidence,
                        "model": response.model,
                        "reasoning": response.reasoning,
                    }),
                );
                decision
            }
            Err(err) => {
                self.audit(
                    timestamp,
                    "fallback",
                    Some(err),
                    json!({
                        "raw_decision": response.decision,
                        "fallback": self.fallback.as_str(),
                    }),
                );
                self.fallback
            }
        }
    }
}

impl DecisionSource for AgentDecision {
    fn name(&self) -> &str {
        "agent_remote"
    }

    fn decide(&mut self, history: &[Candle]) -> Decision {
        let Some(last) = history.last() else {
            return Decision::Hold;
        };
        let request = self.build_request(history, last);

        match self.client.decide(&request) {
            Ok(response) => self.resolve(last.timestamp, &response),
            Err(err) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    error = %err,
                    "decision client failed, using fallback"
                );
                let fallback = self.fallback;
                self.audit(
                    last.timestamp,
                    "fallback",
                    Some(err),
                    json!({ "fallback": fallback.as_str() }),
                );
                fallback
            }
        }
    }

    fn drain_audit_events(&mut self) -> Vec<AuditEvent> {
        std::mem::take(&mut self.audit_events)
    }
}

pub enum StrategyKind {
    SmaCrossover(SmaCrossover),
    Hold(HoldStrategy),
    BuyAndHold(BuyAndHold),
    Agent(AgentDecision),
}

impl DecisionSource for StrategyKind {
    fn name(&self) -> &str {
        match self {
            StrategyKind::SmaCrossover(strategy) => strategy.name(),
            StrategyKind::Hold(strategy) => strategy.name(),
            StrategyKind::BuyAndHold(strategy) => strategy.name(),
            StrategyKind::Agent(strategy) => strategy.name(),
        }
    }

    fn decide(&mut self, history: &[Candle]) -> Decision {
        match self {
            StrategyKind::SmaCrossover(strategy) => strategy.decide(history),
            StrategyKind::Hold(strategy) => strategy.decide(history),
            StrategyKind::BuyAndHold(strategy) => strategy.decide(history),
            StrategyKind::Agent(strategy) => strategy.decide(history),
        }
    }

    fn drain_audit_events(&mut self) -> Vec<AuditEvent> {
        match self {
            StrategyKind::SmaCrossover(strategy) => strategy.drain_audit_events(),
            StrategyKind::Hold(strategy) => strategy.drain_audit_events(),
            StrategyKind::BuyAndHold(strategy) => strategy.drain_audit_events(),
            StrategyKind::Agent(strategy) => strategy.drain_audit_events(),
        }
    }
}
