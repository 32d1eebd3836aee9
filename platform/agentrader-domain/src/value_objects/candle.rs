use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Flat candle where open, high, low and close are all `price`.
    pub fn flat(timestamp: i64, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Checks the OHLCV field invariants and returns the first violation.
    /// Prices must be strictly positive; volume may be zero.
    pub fn check(&self) -> Result<(), String> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(format!("{name} is not finite ({value})"));
            }
            if value < 0.0 {
                return Err(format!("{name} is negative ({value})"));
            }
        }
        for (name, value) in &fields[..4] {
            if *value == 0.0 {
                return Err(format!("{name} price must be > 0"));
            }
        }

        if self.high < self.open.max(self.close) {
            return Err(format!(
                "high {} is below max(open {}, close {})",
                self.high, self.open, self.close
            ));
        }
        if self.low > self.open.min(self.close) {
            return Err(format!(
                "low {} is above min(open {}, close {})",
                self.low, self.open, self.close
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Candle;

    #[test]
    fn check_accepts_well_formed_candle() {
        let candle = Candle {
            timestamp: 1,
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 3.0,
        };
        assert!(candle.check().is_ok());
    }

    #[test]
    fn check_rejects_high_below_close() {
        let candle = Candle {
            timestamp: 1,
            open: 10.0,
            high: 10.5,
            low: 9.0,
            close: 11.0,
            volume: 3.0,
        };
        let err = candle.check().expect_err("high < close");
        assert!(err.contains("high"));
    }

    #[test]
    fn check_rejects_non_finite_and_negative_values() {
        let mut candle = Candle::flat(1, 10.0, 1.0);
        candle.close = f64::NAN;
        assert!(candle.check().is_err());

        let mut candle = Candle::flat(1, 10.0, 1.0);
        candle.volume = -1.0;
        assert!(candle.check().expect_err("negative").contains("volume"));
    }

    #[test]
    fn check_rejects_zero_prices_but_allows_zero_volume() {
        assert!(Candle::flat(1, 10.0, 0.0).check().is_ok());

        let err = Candle::flat(1, 0.0, 1.0).check().expect_err("zero price");
        assert!(err.contains("open price must be > 0"), "{err}");

        let mut candle = Candle::flat(1, 10.0, 1.0);
        candle.low = 0.0;
        let err = candle.check().expect_err("zero low");
        assert!(err.contains("low"), "{err}");
    }
}
