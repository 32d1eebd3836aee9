use crate::entities::result::BacktestResult;
use crate::value_objects::candle::Candle;
use crate::value_objects::decision::Decision;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::Trade;

/// Callbacks fired by the simulator while it replays a series. Observers see
/// the run but cannot change it.
pub trait RunObserver {
    fn on_decision(&mut self, _index: usize, _candle: &Candle, _decision: Decision) {}

    fn on_trade(&mut self, _trade: &Trade) {}

    fn on_equity(&mut self, _point: &EquityPoint) {}

    fn on_complete(&mut self, _result: &BacktestResult) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
