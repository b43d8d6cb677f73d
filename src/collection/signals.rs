//! Pure technical-signal math over a ticker's EOD history, in the style of
//! the teacher's `pe_statistics` module: plain arithmetic over a slice of
//! floats, no I/O.

use crate::models::{EodBar, Signals};

fn simple_moving_average(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() < window || window == 0 {
        return None;
    }
    let sum: f64 = closes[closes.len() - window..].iter().sum();
    Some(sum / window as f64)
}

/// Wilder's RSI over the trailing `period + 1` closes.
fn relative_strength_index(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let recent = &closes[closes.len() - (period + 1)..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for window in recent.windows(2) {
        let change = window[1] - window[0];
        if change >= 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    if gains + losses == 0.0 {
        return Some(50.0);
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// `bars` must already be sorted oldest-first.
pub fn compute_signals(ticker: &str, bars: &[EodBar]) -> Signals {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    Signals {
        ticker: ticker.to_string(),
        sma_50: simple_moving_average(&closes, 50),
        sma_200: simple_moving_average(&closes, 200),
        rsi_14: relative_strength_index(&closes, 14),
        computed_at: Some(chrono::Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64) -> EodBar {
        EodBar {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: None,
        }
    }

    #[test]
    fn sma_is_none_below_window() {
        let bars: Vec<EodBar> = (1..=10).map(|d| bar(d, 10.0)).collect();
        let signals = compute_signals("AAPL", &bars);
        assert_eq!(signals.sma_50, None);
    }

    #[test]
    fn rsi_is_100_when_all_gains() {
        let bars: Vec<EodBar> = (1..=20).map(|d| bar(d, d as f64)).collect();
        let signals = compute_signals("AAPL", &bars);
        assert_eq!(signals.rsi_14, Some(100.0));
    }
}
