//! Causal indicator kernels over full price series.
//!
//! Every function returns a vector aligned with its input where element `i`
//! depends only on inputs `0..=i`. Positions inside an indicator's warm-up
//! region are `None`; they are never filled with zeros.

use crate::types::PricePoint;

/// Wrap a fully defined series as optional values.
pub fn lift(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().map(|&v| Some(v)).collect()
}

/// Close prices of a series.
pub fn closes(prices: &[PricePoint]) -> Vec<f64> {
    prices.iter().map(|p| p.close).collect()
}

/// Percent change over `period` steps: `(x[i] - x[i-p]) / x[i-p]`.
pub fn pct_change(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let past = values[i - period];
            if past == 0.0 {
                None
            } else {
                Some((values[i] - past) / past)
            }
        })
        .collect()
}

/// Log return over `period` steps: `ln(x[i] / x[i-p])`.
pub fn log_return(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i < period {
                return None;
            }
            let past = values[i - period];
            let current = values[i];
            if past > 0.0 && current > 0.0 {
                Some((current / past).ln())
            } else {
                None
            }
        })
        .collect()
}

/// Collect the trailing window ending at `i` if every value in it is defined.
fn window_at(values: &[Option<f64>], i: usize, window: usize) -> Option<Vec<f64>> {
    if window == 0 || i + 1 < window {
        return None;
    }
    values[i + 1 - window..=i].iter().copied().collect()
}

/// Rolling arithmetic mean; undefined until `window` defined values are available.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let w = window_at(values, i, window)?;
            Some(w.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window < 2 {
                return None;
            }
            let w = window_at(values, i, window)?;
            Some(sample_std(&w))
        })
        .collect()
}

/// Rolling minimum.
pub fn rolling_min(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            Some(
                values[i + 1 - window..=i]
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min),
            )
        })
        .collect()
}

/// Rolling maximum.
pub fn rolling_max(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return None;
            }
            Some(
                values[i + 1 - window..=i]
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max),
            )
        })
        .collect()
}

/// Recursive exponential moving average seeded with the first observation.
///
/// `alpha = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }

    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut current = values[0];
    out.push(current);
    for &v in &values[1..] {
        current = alpha * v + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// True range; the first period uses the high-low range only.
pub fn true_range(prices: &[PricePoint]) -> Vec<f64> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let hl = p.high - p.low;
            if i == 0 {
                return hl;
            }
            let prev_close = prices[i - 1].close;
            hl.max((p.high - prev_close).abs())
                .max((p.low - prev_close).abs())
        })
        .collect()
}

/// Relative Strength Index from rolling average gains and losses.
///
/// Saturates at 100 when the average loss is zero.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains: Vec<Option<f64>> = vec![None; values.len()];
    let mut losses: Vec<Option<f64>> = vec![None; values.len()];
    for i in 1..values.len() {
        let delta = values[i] - values[i - 1];
        gains[i] = Some(delta.max(0.0));
        losses[i] = Some((-delta).max(0.0));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| {
            let (g, l) = ((*g)?, (*l)?);
            if l == 0.0 {
                Some(100.0)
            } else {
                let rs = g / l;
                Some(100.0 - 100.0 / (1.0 + rs))
            }
        })
        .collect()
}

/// Stochastic oscillator (%K, %D).
///
/// %K is 50 when the high-low range of the lookback is zero.
pub fn stochastic(
    prices: &[PricePoint],
    k_period: usize,
    d_period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let highs: Vec<f64> = prices.iter().map(|p| p.high).collect();
    let lows: Vec<f64> = prices.iter().map(|p| p.low).collect();
    let highest = rolling_max(&highs, k_period);
    let lowest = rolling_min(&lows, k_period);

    let k: Vec<Option<f64>> = prices
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (hh, ll) = (highest[i]?, lowest[i]?);
            let range = hh - ll;
            if range.abs() < f64::EPSILON {
                Some(50.0)
            } else {
                Some(100.0 * (p.close - ll) / range)
            }
        })
        .collect();
    let d = rolling_mean(&k, d_period);
    (k, d)
}

/// On-Balance Volume, starting at zero.
pub fn obv(prices: &[PricePoint]) -> Vec<f64> {
    let mut out = Vec::with_capacity(prices.len());
    let mut running = 0.0;
    for (i, p) in prices.iter().enumerate() {
        if i > 0 {
            let prev = prices[i - 1].close;
            if p.close > prev {
                running += p.volume;
            } else if p.close < prev {
                running -= p.volume;
            }
        }
        out.push(running);
    }
    out
}

/// Cumulative volume-weighted average of the typical price.
pub fn cumulative_vwap(prices: &[PricePoint]) -> Vec<Option<f64>> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    prices
        .iter()
        .map(|p| {
            pv += p.typical_price() * p.volume;
            vol += p.volume;
            if vol > 0.0 {
                Some(pv / vol)
            } else {
                None
            }
        })
        .collect()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); 0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.max(0.0).sqrt()
}
