pub mod agent;
pub mod audit;
pub mod engine;
pub mod ohlcv;
pub mod strategy;
