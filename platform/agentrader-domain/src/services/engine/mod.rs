pub mod backtest;
pub mod observer;
