pub mod artifacts;
pub mod decision;
pub mod market_data;
