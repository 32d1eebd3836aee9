use std::fmt;

/// Candle interval with its canonical exchange-style label ("1m", "4h", "1d").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub label: String,
    pub step_seconds: i64,
}

const KNOWN_INTERVALS: &[(&[&str], &str, i64)] = &[
    (&["1m", "1min"], "1m", 60),
    (&["3m", "3min"], "3m", 180),
    (&["5m", "5min"], "5m", 300),
    (&["15m", "15min"], "15m", 900),
    (&["30m", "30min"], "30m", 1_800),
    (&["1h", "1hour"], "1h", 3_600),
    (&["2h", "2hour"], "2h", 7_200),
    (&["4h", "4hour"], "4h", 14_400),
    (&["6h", "6hour"], "6h", 21_600),
    (&["12h", "12hour"], "12h", 43_200),
    (&["1d", "1day"], "1d", 86_400),
    (&["1w", "1week"], "1w", 604_800),
];

impl Interval {
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_lowercase();
        KNOWN_INTERVALS
            .iter()
            .find(|(aliases, _, _)| aliases.contains(&normalized.as_str()))
            .map(|(_, label, step)| Self {
                label: (*label).to_string(),
                step_seconds: *step,
            })
            .ok_or_else(|| format!("unsupported interval: {value}"))
    }

    /// Accepts a known label or a raw number of seconds.
    pub fn parse_or_seconds(value: &str) -> Result<Self, String> {
        Self::parse(value).or_else(|_| {
            let seconds = parse_duration_like_seconds(value)?;
            if seconds <= 0 {
                return Err(format!("invalid interval: {value}"));
            }
            Ok(Self {
                label: value.trim().to_string(),
                step_seconds: seconds,
            })
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

pub fn parse_duration_like_seconds(value: &str) -> Result<i64, String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number_part, unit) = trimmed.split_at(split_at);
    let multiplier = match unit {
        "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" | "hour" => 3_600,
        "d" | "day" => 86_400,
        "w" | "week" => 604_800,
        _ => return Err(format!("unsupported duration unit: {unit}")),
    };

    let number: i64 = number_part
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    Ok(number * multiplier)
}
