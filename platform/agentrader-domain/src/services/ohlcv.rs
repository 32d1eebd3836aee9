use crate::error::BacktestError;
use crate::value_objects::candle::Candle;
use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub rows: usize,
    pub duplicates: usize,
    pub gaps: usize,
    pub out_of_order: usize,
    pub invalid_rows: usize,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
    pub first_gap: Option<i64>,
    pub first_duplicate: Option<i64>,
    pub first_out_of_order: Option<i64>,
    pub first_invalid: Option<i64>,
    pub max_gap_seconds: Option<i64>,
    /// Missing bars summed over all gaps.
    pub gap_count: usize,
}

impl DataQualityReport {
    /// True when the rows are strictly increasing and every candle is well formed.
    pub fn is_clean(&self) -> bool {
        self.duplicates == 0 && self.out_of_order == 0 && self.invalid_rows == 0
    }

    pub fn has_issues(&self) -> bool {
        !self.is_clean() || self.gaps > 0
    }

    /// Fails with `MalformedData` when any row was invalid, duplicated or out
    /// of order. Gaps are allowed.
    pub fn ensure_clean(&self) -> Result<(), BacktestError> {
        if self.invalid_rows > 0 {
            return Err(BacktestError::malformed(format!(
                "{} invalid row(s), first at timestamp {:?}",
                self.invalid_rows, self.first_invalid
            )));
        }
        if self.duplicates > 0 {
            return Err(BacktestError::malformed(format!(
                "{} duplicate timestamp(s), first at {:?}",
                self.duplicates, self.first_duplicate
            )));
        }
        if self.out_of_order > 0 {
            return Err(BacktestError::malformed(format!(
                "{} out-of-order row(s), first at {:?}",
                self.out_of_order, self.first_out_of_order
            )));
        }
        Ok(())
    }
}

pub fn data_quality_from_candles(
    candles: &[Candle],
    expected_step_seconds: Option<i64>,
) -> DataQualityReport {
    let mut report = DataQualityReport {
        rows: candles.len(),
        ..DataQualityReport::default()
    };
    let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
        return report;
    };

    let step = expected_step_seconds.unwrap_or(1).max(1);
    report.first_timestamp = Some(first.timestamp);
    report.last_timestamp = Some(last.timestamp);

    let mut last_ts: Option<i64> = None;
    let mut max_gap: Option<i64> = None;

    for candle in candles {
        let ts = candle.timestamp;

        if candle.check().is_err() {
            report.invalid_rows += 1;
            if report.first_invalid.is_none() {
                report.first_invalid = Some(ts);
            }
        }

        if let Some(prev) = last_ts {
            if ts == prev {
                report.duplicates += 1;
                if report.first_duplicate.is_none() {
                    report.first_duplicate = Some(ts);
                }
            } else if ts < prev {
                report.out_of_order += 1;
                if report.first_out_of_order.is_none() {
                    report.first_out_of_order = Some(ts);
                }
            } else {
                let diff = ts - prev;
                if diff > step {
                    report.gaps += 1;
                    report.gap_count += ((diff - 1) / step) as usize;
                    if report.first_gap.is_none() {
                        report.first_gap = Some(ts);
                    }
                    max_gap = Some(max_gap.map_or(diff, |current| current.max(diff)));
                }
            }
        }

        last_ts = Some(ts);
    }

    report.max_gap_seconds = max_gap;
    report
}

/// Sorts raw rows by timestamp, keeps the last row seen for a repeated
/// timestamp and drops rows that fail [`Candle::check`]. Duplicates, invalid
/// and out-of-order rows are counted on the raw input; gaps on the output.
pub fn canonicalize_candles(
    raw: Vec<Candle>,
    expected_step_seconds: Option<i64>,
) -> (Vec<Candle>, DataQualityReport) {
    let mut report = DataQualityReport {
        rows: raw.len(),
        ..DataQualityReport::default()
    };

    let mut valid = Vec::with_capacity(raw.len());
    let mut last_seen: Option<i64> = None;
    for candle in raw {
        if candle.check().is_err() {
            report.invalid_rows += 1;
            if report.first_invalid.is_none() {
                report.first_invalid = Some(candle.timestamp);
            }
            continue;
        }
        if let Some(prev) = last_seen {
            if candle.timestamp < prev {
                report.out_of_order += 1;
                if report.first_out_of_order.is_none() {
                    report.first_out_of_order = Some(candle.timestamp);
                }
            }
        }
        last_seen = Some(candle.timestamp);
        valid.push(candle);
    }

    // stable: equal timestamps keep input order
    valid.sort_by_key(|candle| candle.timestamp);

    let mut candles: Vec<Candle> = Vec::with_capacity(valid.len());
    for candle in valid {
        if let Some(last) = candles.last_mut() {
            if last.timestamp == candle.timestamp {
                report.duplicates += 1;
                if report.first_duplicate.is_none() {
                    report.first_duplicate = Some(candle.timestamp);
                }
                *last = candle;
                continue;
            }
        }
        candles.push(candle);
    }

    let spacing = data_quality_from_candles(&candles, expected_step_seconds);
    report.gaps = spacing.gaps;
    report.gap_count = spacing.gap_count;
    report.first_gap = spacing.first_gap;
    report.max_gap_seconds = spacing.max_gap_seconds;
    report.first_timestamp = spacing.first_timestamp;
    report.last_timestamp = spacing.last_timestamp;

    (candles, report)
}
