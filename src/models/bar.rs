use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a symbol. The same shape carries 1-minute bars off the
/// feed and the 15-minute aggregates produced from them; `timestamp` is the
/// start of the bar's window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: u64,
    /// Volume-weighted average price. None when the window traded no volume.
    pub vwap: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}
