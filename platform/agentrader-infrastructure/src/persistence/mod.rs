pub mod postgres_ohlcv;
