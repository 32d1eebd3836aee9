use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    Signal,
    ForcedLiquidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    pub price: f64,
    pub timestamp: i64,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proceeds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_trade_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    pub reason: TradeReason,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        self.trade_type == TradeType::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.trade_type == TradeType::Sell
    }
}
