use crate::value_objects::position::PositionState;

/// Fill produced when a long position is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedPosition {
    pub quantity: f64,
    pub proceeds: f64,
    pub cost: f64,
    pub entry_trade_id: u64,
}

/// Single-position paper-trading account: all cash while flat, all-in while
/// long.
#[derive(Debug, Clone, Default)]
pub struct Account {
    cash: f64,
    position: PositionState,
}

impl Account {
    pub fn new_with_cash(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            position: PositionState::Flat,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn quantity(&self) -> f64 {
        self.position.quantity()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_flat()
    }

    /// Invests all cash at `price`. Returns `(quantity, cost)` or `None` when
    /// already long or the fill would be degenerate.
    pub fn open_long(&mut self, price: f64, timestamp: i64, trade_id: u64) -> Option<(f64, f64)> {
        if !self.position.is_flat() || price <= 0.0 || self.cash <= 0.0 {
            return None;
        }

        let cost = self.cash;
        let quantity = cost / price;
        self.cash = 0.0;
        self.position = PositionState::Long {
            entry_price: price,
            entry_timestamp: timestamp,
            quantity,
            cost,
            entry_trade_id: trade_id,
        };
        Some((quantity, cost))
    }

    pub fn close_long(&mut self, price: f64) -> Option<ClosedPosition> {
        let PositionState::Long {
            quantity,
            cost,
            entry_trade_id,
            ..
        } = self.position
        else {
            return None;
        };

        let proceeds = quantity * price;
        self.cash = proceeds;
        self.position = PositionState::Flat;
        Some(ClosedPosition {
            quantity,
            proceeds,
            cost,
            entry_trade_id,
        })
    }

    /// Mark-to-market value: cash while flat, quantity x `mark_price` while long.
    pub fn equity(&self, mark_price: f64) -> f64 {
        match self.position {
            PositionState::Flat => self.cash,
            PositionState::Long { quantity, .. } => quantity * mark_price,
        }
    }
}
