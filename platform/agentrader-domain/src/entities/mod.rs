pub mod account;
pub mod metrics;
pub mod price_series;
pub mod result;
