pub mod candle;
pub mod decision;
pub mod equity_point;
pub mod position;
pub mod interval;
pub mod trade;
