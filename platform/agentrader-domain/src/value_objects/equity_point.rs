use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub equity: f64,
    pub cash: f64,
    pub quantity: f64,
    pub position_flag: bool,
}

#[cfg(test)]
mod tests {
    use super::EquityPoint;

    #[test]
    fn serializes_position_flag() {
        let point = EquityPoint {
            timestamp: 3_600,
            equity: 1_100.0,
            cash: 0.0,
            quantity: 10.0,
            position_flag: true,
        };
        let value = serde_json::to_value(&point).expect("serialize");
        assert_eq!(value["position_flag"], true);
        assert!(value.get("in_position").is_none());
    }
}
