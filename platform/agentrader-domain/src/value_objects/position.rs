/// Account exposure at a single time step. Never short and never more than
/// one open long.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long {
        entry_price: f64,
        entry_timestamp: i64,
        quantity: f64,
        cost: f64,
        entry_trade_id: u64,
    },
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn quantity(&self) -> f64 {
        match self {
            PositionState::Flat => 0.0,
            PositionState::Long { quantity, .. } => *quantity,
        }
    }
}
