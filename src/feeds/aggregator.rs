use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::errors::FleetError;
use crate::models::bar::Bar;

/// 1-minute bar frame as it arrives off the feed.
#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
    #[serde(rename = "n", default)]
    trade_count: u64,
    #[serde(rename = "vw", default)]
    vwap: Option<f64>,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

/// Decode a published 1-minute bar frame.
pub fn parse_minute_bar(payload: &[u8]) -> Result<Bar, FleetError> {
    let wire: WireBar = serde_json::from_slice(payload)?;
    Ok(Bar {
        symbol: wire.symbol,
        open: wire.open,
        high: wire.high,
        low: wire.low,
        close: wire.close,
        volume: wire.volume,
        trade_count: wire.trade_count,
        vwap: wire.vwap,
        timestamp: wire.timestamp,
    })
}

/// Reduces a stream of 1-minute bars into window-aligned aggregates
/// (15-minute in production).
///
/// The buffer is owned by this value — callers hold one aggregator per
/// stream, there is no process-wide window state. A window closes when the
/// bar for its final minute arrives (minute 14, 29, 44 or 59 for a
/// 15-minute window); late-but-in-window bars are handled by sorting before
/// aggregation.
#[derive(Debug)]
pub struct BarAggregator {
    window_minutes: u32,
    buffer: Vec<Bar>,
}

impl BarAggregator {
    pub fn new(window_minutes: u32) -> Self {
        assert!(window_minutes > 0 && 60 % window_minutes == 0);
        Self {
            window_minutes,
            buffer: Vec::new(),
        }
    }

    pub fn fifteen_minute() -> Self {
        Self::new(15)
    }

    /// Start of the window containing `ts` (10:07 → 10:00 for 15 minutes).
    pub fn window_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let aligned = (ts.minute() / self.window_minutes) * self.window_minutes;
        ts.with_minute(aligned)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .expect("aligned minute is always valid")
    }

    /// Buffer a 1-minute bar; returns the aggregated window bar when this
    /// bar closes the window.
    pub fn push(&mut self, bar: Bar) -> Option<Bar> {
        let closes = bar.timestamp.minute() % self.window_minutes == self.window_minutes - 1;
        self.buffer.push(bar);
        if closes {
            self.drain()
        } else {
            None
        }
    }

    /// Aggregate and clear whatever is buffered, window complete or not.
    pub fn flush(&mut self) -> Option<Bar> {
        self.drain()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn drain(&mut self) -> Option<Bar> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut bars = std::mem::take(&mut self.buffer);
        bars.sort_by_key(|b| b.timestamp);

        let total_volume: f64 = bars.iter().map(|b| b.volume).sum();
        let vwap = if total_volume > 0.0 {
            let weighted: f64 = bars
                .iter()
                .map(|b| b.vwap.unwrap_or(b.close) * b.volume)
                .sum();
            Some(weighted / total_volume)
        } else {
            None
        };

        let first = &bars[0];
        let last = bars.last().expect("buffer is non-empty");
        let aggregated = Bar {
            symbol: first.symbol.clone(),
            open: first.open,
            high: bars.iter().map(|b| b.high).fold(f64::MIN, f64::max),
            low: bars.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            close: last.close,
            volume: total_volume,
            trade_count: bars.iter().map(|b| b.trade_count).sum(),
            vwap,
            timestamp: self.window_start(first.timestamp),
        };
        debug!(
            symbol = %aggregated.symbol,
            window = %aggregated.timestamp,
            bars = bars.len(),
            "window aggregated"
        );
        Some(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute_bar(minute: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar {
            symbol: "TQQQ".into(),
            open,
            high,
            low,
            close,
            volume,
            trade_count: 10,
            vwap: Some((high + low) / 2.0),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 10, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_window_closes_on_cutoff_minute() {
        let mut agg = BarAggregator::fifteen_minute();
        for minute in 0..14 {
            assert!(agg.push(minute_bar(minute, 10.0, 11.0, 9.0, 10.5, 100.0)).is_none());
        }
        let out = agg.push(minute_bar(14, 10.5, 12.0, 10.0, 11.0, 100.0));
        let bar = out.expect("minute 14 closes the 10:00 window");

        assert_eq!(bar.timestamp, Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap());
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.close, 11.0);
        assert_eq!(bar.high, 12.0);
        assert_eq!(bar.low, 9.0);
        assert_eq!(bar.volume, 1500.0);
        assert_eq!(bar.trade_count, 150);
        // Buffer cleared for the next window
        assert_eq!(agg.buffered(), 0);
    }

    #[test]
    fn test_vwap_is_volume_weighted() {
        let mut agg = BarAggregator::fifteen_minute();
        let mut light = minute_bar(13, 100.0, 100.0, 100.0, 100.0, 10.0);
        light.vwap = Some(100.0);
        let mut heavy = minute_bar(14, 200.0, 200.0, 200.0, 200.0, 30.0);
        heavy.vwap = Some(200.0);

        agg.push(light);
        let bar = agg.push(heavy).unwrap();
        // (100*10 + 200*30) / 40 = 175
        assert_eq!(bar.vwap, Some(175.0));
    }

    #[test]
    fn test_zero_volume_window_has_no_vwap() {
        let mut agg = BarAggregator::fifteen_minute();
        let bar = agg.push(minute_bar(14, 10.0, 10.0, 10.0, 10.0, 0.0)).unwrap();
        assert_eq!(bar.vwap, None);
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn test_out_of_order_bars_sorted_before_aggregation() {
        let mut agg = BarAggregator::fifteen_minute();
        agg.push(minute_bar(1, 20.0, 21.0, 19.0, 20.5, 100.0));
        agg.push(minute_bar(0, 10.0, 11.0, 9.0, 10.5, 100.0));
        let bar = agg.push(minute_bar(14, 30.0, 31.0, 29.0, 30.5, 100.0)).unwrap();

        // Open comes from the chronologically first bar, not insertion order
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.close, 30.5);
    }

    #[test]
    fn test_flush_drains_partial_window() {
        let mut agg = BarAggregator::fifteen_minute();
        agg.push(minute_bar(0, 10.0, 11.0, 9.0, 10.5, 100.0));
        agg.push(minute_bar(1, 10.5, 11.5, 10.0, 11.0, 100.0));

        let bar = agg.flush().expect("partial window drains");
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.close, 11.0);
        assert_eq!(agg.buffered(), 0);
        assert!(agg.flush().is_none());
    }

    #[test]
    fn test_wire_bar_decodes_into_the_window() {
        let frame = br#"{"T":"b","S":"TQQQ","o":58.12,"h":58.3,"l":58.05,"c":58.21,"v":4200,"n":37,"vw":58.18,"t":"2026-03-02T10:14:00Z"}"#;
        let bar = parse_minute_bar(frame).unwrap();
        assert_eq!(bar.symbol, "TQQQ");
        assert_eq!(bar.vwap, Some(58.18));

        let mut agg = BarAggregator::fifteen_minute();
        let out = agg.push(bar).expect("10:14 closes the window");
        assert_eq!(out.timestamp, Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_window_start_alignment() {
        let agg = BarAggregator::fifteen_minute();
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 10, 7, 33).unwrap();
        assert_eq!(
            agg.window_start(ts),
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
        );
        let late = Utc.with_ymd_and_hms(2026, 3, 2, 10, 59, 0).unwrap();
        assert_eq!(
            agg.window_start(late),
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 45, 0).unwrap()
        );
    }
}
