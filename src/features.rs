//! Feature engineering for walk-forward model training.
//!
//! Turns an ordered OHLCV series (plus an optional external event stream)
//! into rows of named numeric features, then attaches a forward-looking
//! target to produce a [`Dataset`].
//!
//! # Feature Categories
//!
//! - **Returns**: simple and log returns over fixed lookbacks
//! - **Volatility**: rolling std of 1-period returns, ATR, intraday range
//! - **Trend**: SMA/EMA, distance from SMA, MACD, Bollinger Bands
//! - **Momentum**: RSI, rate of change, stochastic oscillator
//! - **Volume**: volume ratios, OBV and its EMA, cumulative VWAP
//! - **Calendar**: day of week/month, month, quarter, cyclic encodings
//! - **Events**: trailing 7/30 day event counts and sentiment (optional)
//!
//! Every value at row `t` is computed from prices at or before `t`. Rows
//! inside the warm-up region are dropped, never imputed.
//!
//! # Example
//!
//! ```
//! use cryptowalk::data::random_walk;
//! use cryptowalk::features::{create_target, FeatureConfig, FeatureEngine};
//! use cryptowalk::types::TargetKind;
//!
//! let prices = random_walk(300, 100.0, 0.001, 0.02, 7);
//! let engine = FeatureEngine::new(FeatureConfig::default());
//! let rows = engine.create_features(&prices, None).unwrap();
//! let dataset = create_target(&rows, 1, TargetKind::Regression).unwrap();
//! assert_eq!(dataset.target_name, "target_return_1");
//! ```

use crate::error::{Result, WalkForwardError};
use crate::events::{event_window_stats, EventWindowStats, SHORT_WINDOW_DAYS};
use crate::indicators::{
    closes, cumulative_vwap, ema, lift, log_return, obv, pct_change, rolling_mean, rolling_std,
    rsi, stochastic, true_range,
};
use crate::types::{is_chronological, ExternalEvent, PricePoint, TargetKind};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Configuration for feature generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Lookbacks for simple and log returns.
    pub return_periods: Vec<usize>,
    /// Windows for rolling volatility of 1-period returns.
    pub volatility_periods: Vec<usize>,
    /// ATR period.
    pub atr_period: usize,
    /// Window for the average intraday range.
    pub range_period: usize,
    /// Periods for simple and exponential moving averages.
    pub ma_periods: Vec<usize>,
    /// MACD parameters (fast, slow, signal).
    pub macd_params: (usize, usize, usize),
    /// RSI period.
    pub rsi_period: usize,
    /// Bollinger Bands period and std multiplier.
    pub bb_params: (usize, f64),
    /// Rate-of-change lookbacks.
    pub roc_periods: Vec<usize>,
    /// Stochastic oscillator (%K period, %D smoothing).
    pub stoch_params: (usize, usize),
    /// Windows for volume relative to its rolling mean.
    pub volume_ratio_periods: Vec<usize>,
    /// EMA span applied to OBV.
    pub obv_ema_span: usize,
    /// Whether to include volume features.
    pub include_volume_features: bool,
    /// Whether to include calendar features.
    pub include_time_features: bool,
    /// Whether to add event features when an event stream is supplied.
    pub include_event_features: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            return_periods: vec![1, 3, 7, 14, 30],
            volatility_periods: vec![7, 14, 30],
            atr_period: 14,
            range_period: 7,
            ma_periods: vec![7, 14, 21, 50, 200],
            macd_params: (12, 26, 9),
            rsi_period: 14,
            bb_params: (20, 2.0),
            roc_periods: vec![3, 7, 14],
            stoch_params: (14, 3),
            volume_ratio_periods: vec![7, 30],
            obv_ema_span: 20,
            include_volume_features: true,
            include_time_features: true,
            include_event_features: true,
        }
    }
}

impl FeatureConfig {
    /// Short-lookback preset for histories too brief for the 200-period MA.
    pub fn minimal() -> Self {
        Self {
            return_periods: vec![1, 3, 7],
            volatility_periods: vec![7, 14],
            ma_periods: vec![7, 14, 21],
            roc_periods: vec![3, 7],
            volume_ratio_periods: vec![7],
            ..Self::default()
        }
    }

    /// Set the moving-average periods.
    pub fn with_ma_periods(mut self, periods: Vec<usize>) -> Self {
        self.ma_periods = periods;
        self
    }

    /// Set the return lookbacks.
    pub fn with_return_periods(mut self, periods: Vec<usize>) -> Self {
        self.return_periods = periods;
        self
    }

    /// Enable or disable volume features.
    pub fn with_volume_features(mut self, enabled: bool) -> Self {
        self.include_volume_features = enabled;
        self
    }

    /// Enable or disable calendar features.
    pub fn with_time_features(mut self, enabled: bool) -> Self {
        self.include_time_features = enabled;
        self
    }

    /// Enable or disable event features.
    pub fn with_event_features(mut self, enabled: bool) -> Self {
        self.include_event_features = enabled;
        self
    }

    /// Check that every window is usable.
    pub fn validate(&self) -> Result<()> {
        let lists = [
            ("return_periods", &self.return_periods),
            ("volatility_periods", &self.volatility_periods),
            ("ma_periods", &self.ma_periods),
            ("roc_periods", &self.roc_periods),
            ("volume_ratio_periods", &self.volume_ratio_periods),
        ];
        for (name, periods) in lists {
            if periods.iter().any(|&p| p == 0) {
                return Err(WalkForwardError::config(format!(
                    "{} must contain only positive periods",
                    name
                )));
            }
        }
        if self.volatility_periods.iter().any(|&p| p < 2) {
            return Err(WalkForwardError::config(
                "volatility_periods must be at least 2",
            ));
        }

        let (fast, slow, signal) = self.macd_params;
        if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
            return Err(WalkForwardError::config(
                "macd_params must satisfy 0 < fast < slow and signal > 0",
            ));
        }
        let (bb_period, bb_std) = self.bb_params;
        if bb_period < 2 || bb_std.is_nan() || bb_std <= 0.0 {
            return Err(WalkForwardError::config(
                "bb_params must have period >= 2 and a positive multiplier",
            ));
        }
        let (k, d) = self.stoch_params;
        if self.atr_period == 0
            || self.range_period == 0
            || self.rsi_period == 0
            || self.obv_ema_span == 0
            || k == 0
            || d == 0
        {
            return Err(WalkForwardError::config(
                "indicator periods must be positive",
            ));
        }
        Ok(())
    }

    /// Longest lookback, in periods, that any configured feature needs.
    pub fn longest_lookback(&self) -> usize {
        self.warmup_period() + 1
    }

    /// Number of leading rows whose features are undefined and get dropped.
    pub fn warmup_period(&self) -> usize {
        let max_of = |v: &[usize]| v.iter().copied().max().unwrap_or(0);
        let (k, d) = self.stoch_params;

        let mut warmup = [
            max_of(&self.return_periods),
            // rolling std over return_1, which is itself undefined at row 0
            max_of(&self.volatility_periods).max(SHORT_WINDOW_DAYS as usize),
            self.atr_period.saturating_sub(1),
            self.range_period.saturating_sub(1),
            max_of(&self.ma_periods).saturating_sub(1),
            self.rsi_period,
            self.bb_params.0.saturating_sub(1),
            max_of(&self.roc_periods),
            (k + d).saturating_sub(2),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        if self.include_volume_features {
            warmup = warmup.max(max_of(&self.volume_ratio_periods).saturating_sub(1));
        }
        warmup
    }
}

/// Features for a single timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Index of the source price in the input series.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// Close at this timestamp, kept for target construction and simulation.
    pub close: f64,
    /// Feature values by name.
    pub features: BTreeMap<String, f64>,
    /// Forward-looking label, set by [`create_target`].
    pub target: Option<f64>,
}

/// Named feature columns built over the full series.
struct Columns {
    columns: Vec<(String, Vec<Option<f64>>)>,
}

impl Columns {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    fn push(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        self.columns.push((name.into(), values));
    }

    fn push_defined(&mut self, name: impl Into<String>, values: &[f64]) {
        self.push(name, lift(values));
    }
}

fn relative(num: Option<f64>, base: Option<f64>) -> Option<f64> {
    let (num, base) = (num?, base?);
    if base == 0.0 {
        None
    } else {
        Some((num - base) / base)
    }
}

/// Feature engine over OHLCV series.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Rows dropped at the start of every series.
    pub fn warmup_period(&self) -> usize {
        self.config.warmup_period()
    }

    /// Compute feature rows for every timestamp with a fully defined feature
    /// vector.
    ///
    /// Returns an empty vector when the series is shorter than the longest
    /// lookback. Fails with `InvalidInput` when timestamps are not strictly
    /// increasing.
    pub fn create_features(
        &self,
        prices: &[PricePoint],
        events: Option<&[ExternalEvent]>,
    ) -> Result<Vec<FeatureRow>> {
        self.config.validate()?;
        if !is_chronological(prices) {
            return Err(WalkForwardError::InvalidInput(
                "price timestamps must be strictly increasing".to_string(),
            ));
        }

        let warmup = self.warmup_period();
        if prices.len() <= warmup {
            info!(
                "Not enough history for features: {} prices, {} required",
                prices.len(),
                warmup + 1
            );
            return Ok(vec![]);
        }

        let invalid = prices.iter().filter(|p| !p.validate()).count();
        if invalid > 0 {
            warn!("{} price points fail OHLCV validation", invalid);
        }

        let mut cols = Columns::new();
        self.add_return_features(&mut cols, prices);
        self.add_volatility_features(&mut cols, prices);
        self.add_trend_features(&mut cols, prices);
        self.add_momentum_features(&mut cols, prices);
        if self.config.include_volume_features {
            self.add_volume_features(&mut cols, prices);
        }
        if self.config.include_time_features {
            self.add_time_features(&mut cols, prices);
        }
        if self.config.include_event_features {
            if let Some(events) = events.filter(|e| !e.is_empty()) {
                self.add_event_features(&mut cols, prices, events);
            }
        }

        let mut rows = Vec::with_capacity(prices.len() - warmup);
        for (i, price) in prices.iter().enumerate() {
            let mut features = BTreeMap::new();
            let mut defined = true;
            for (name, values) in &cols.columns {
                match values[i] {
                    Some(v) if v.is_finite() => {
                        features.insert(name.clone(), v);
                    }
                    _ => {
                        defined = false;
                        break;
                    }
                }
            }
            if defined {
                rows.push(FeatureRow {
                    index: i,
                    timestamp: price.timestamp,
                    close: price.close,
                    features,
                    target: None,
                });
            }
        }

        let dropped = prices.len() - rows.len();
        if dropped > warmup {
            debug!(
                "Dropped {} rows beyond the {}-row warm-up with undefined features",
                dropped - warmup,
                warmup
            );
        }
        info!(
            "Built {} feature rows with {} features from {} prices",
            rows.len(),
            cols.columns.len(),
            prices.len()
        );

        Ok(rows)
    }

    fn add_return_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let close = closes(prices);
        for &p in &self.config.return_periods {
            cols.push(format!("return_{}", p), pct_change(&close, p));
            cols.push(format!("log_return_{}", p), log_return(&close, p));
        }
    }

    fn add_volatility_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let close = closes(prices);
        let return_1 = pct_change(&close, 1);
        for &p in &self.config.volatility_periods {
            cols.push(format!("volatility_{}", p), rolling_std(&return_1, p));
        }

        let tr = lift(&true_range(prices));
        cols.push(
            format!("atr_{}", self.config.atr_period),
            rolling_mean(&tr, self.config.atr_period),
        );

        let daily_range: Vec<Option<f64>> = prices
            .iter()
            .map(|p| if p.close != 0.0 { Some(p.range() / p.close) } else { None })
            .collect();
        cols.push(
            format!("avg_range_{}", self.config.range_period),
            rolling_mean(&daily_range, self.config.range_period),
        );
        cols.push("daily_range", daily_range);
    }

    fn add_trend_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let close = closes(prices);
        let close_opt = lift(&close);

        for &p in &self.config.ma_periods {
            let sma = rolling_mean(&close_opt, p);
            let distance = close_opt
                .iter()
                .zip(sma.iter())
                .map(|(&c, &m)| relative(c, m))
                .collect();
            cols.push(format!("sma_{}", p), sma);
            cols.push_defined(format!("ema_{}", p), &ema(&close, p));
            cols.push(format!("distance_sma_{}", p), distance);
        }

        let (fast, slow, signal) = self.config.macd_params;
        let fast_ema = ema(&close, fast);
        let slow_ema = ema(&close, slow);
        let macd: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
        let macd_signal = ema(&macd, signal);
        let histogram: Vec<f64> = macd.iter().zip(&macd_signal).map(|(m, s)| m - s).collect();
        cols.push_defined("macd", &macd);
        cols.push_defined("macd_signal", &macd_signal);
        cols.push_defined("macd_histogram", &histogram);

        let (bb_period, bb_std) = self.config.bb_params;
        let middle = rolling_mean(&close_opt, bb_period);
        let std = rolling_std(&close_opt, bb_period);
        let mut upper = Vec::with_capacity(close.len());
        let mut lower = Vec::with_capacity(close.len());
        let mut width = Vec::with_capacity(close.len());
        let mut position = Vec::with_capacity(close.len());
        for i in 0..close.len() {
            match (middle[i], std[i]) {
                (Some(m), Some(s)) => {
                    let (u, l) = (m + bb_std * s, m - bb_std * s);
                    let band = u - l;
                    upper.push(Some(u));
                    lower.push(Some(l));
                    width.push(if m != 0.0 { Some(band / m) } else { None });
                    // Flat band: price sits on the middle line
                    position.push(Some(if band.abs() < f64::EPSILON {
                        0.5
                    } else {
                        (close[i] - l) / band
                    }));
                }
                _ => {
                    upper.push(None);
                    lower.push(None);
                    width.push(None);
                    position.push(None);
                }
            }
        }
        cols.push("bb_upper", upper);
        cols.push("bb_lower", lower);
        cols.push("bb_width", width);
        cols.push("bb_position", position);
    }

    fn add_momentum_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let close = closes(prices);
        cols.push(
            format!("rsi_{}", self.config.rsi_period),
            rsi(&close, self.config.rsi_period),
        );
        for &p in &self.config.roc_periods {
            cols.push(format!("roc_{}", p), pct_change(&close, p));
        }
        let (k_period, d_period) = self.config.stoch_params;
        let (k, d) = stochastic(prices, k_period, d_period);
        cols.push("stoch_k", k);
        cols.push("stoch_d", d);
    }

    fn add_volume_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let volume: Vec<f64> = prices.iter().map(|p| p.volume).collect();
        let volume_opt = lift(&volume);
        for &p in &self.config.volume_ratio_periods {
            let avg = rolling_mean(&volume_opt, p);
            let ratio = volume
                .iter()
                .zip(avg.iter())
                .map(|(&v, &a)| {
                    let a = a?;
                    Some(if a == 0.0 { 1.0 } else { v / a })
                })
                .collect();
            cols.push(format!("volume_ratio_{}", p), ratio);
        }

        let obv_values = obv(prices);
        cols.push_defined("obv_ema", &ema(&obv_values, self.config.obv_ema_span));
        cols.push_defined("obv", &obv_values);

        let vwap = cumulative_vwap(prices);
        let distance = prices
            .iter()
            .zip(vwap.iter())
            .map(|(p, &v)| relative(Some(p.close), v))
            .collect();
        cols.push("vwap", vwap);
        cols.push("vwap_distance", distance);
    }

    fn add_time_features(&self, cols: &mut Columns, prices: &[PricePoint]) {
        let n = prices.len();
        let mut dow = Vec::with_capacity(n);
        let mut dom = Vec::with_capacity(n);
        let mut month = Vec::with_capacity(n);
        let mut quarter = Vec::with_capacity(n);
        for p in prices {
            let d = p.timestamp;
            let m = d.month() as f64;
            dow.push(d.weekday().num_days_from_monday() as f64);
            dom.push(d.day() as f64);
            month.push(m);
            quarter.push(((d.month() - 1) / 3 + 1) as f64);
        }

        let cyclic = |values: &[f64], period: f64, f: fn(f64) -> f64| -> Vec<f64> {
            values.iter().map(|v| f(2.0 * PI * v / period)).collect()
        };
        cols.push_defined("day_of_week_sin", &cyclic(&dow, 7.0, f64::sin));
        cols.push_defined("day_of_week_cos", &cyclic(&dow, 7.0, f64::cos));
        cols.push_defined("month_sin", &cyclic(&month, 12.0, f64::sin));
        cols.push_defined("month_cos", &cyclic(&month, 12.0, f64::cos));
        cols.push_defined("day_of_week", &dow);
        cols.push_defined("day_of_month", &dom);
        cols.push_defined("month", &month);
        cols.push_defined("quarter", &quarter);
    }

    fn add_event_features(
        &self,
        cols: &mut Columns,
        prices: &[PricePoint],
        events: &[ExternalEvent],
    ) {
        let timestamps: Vec<DateTime<Utc>> = prices.iter().map(|p| p.timestamp).collect();
        let stats = event_window_stats(&timestamps, events);
        debug!(
            "Joined {} events onto {} timestamps",
            events.len(),
            timestamps.len()
        );

        let column = |f: fn(&EventWindowStats) -> f64| -> Vec<f64> { stats.iter().map(f).collect() };
        cols.push_defined("events_last_7d", &column(|s| s.events_7d as f64));
        cols.push_defined("events_last_30d", &column(|s| s.events_30d as f64));
        cols.push_defined("avg_sentiment_7d", &column(|s| s.avg_sentiment_7d()));
        cols.push_defined("avg_sentiment_30d", &column(|s| s.avg_sentiment_30d()));
        cols.push_defined(
            "high_severity_events_7d",
            &column(|s| s.high_severity_7d as f64),
        );
        cols.push_defined(
            "high_severity_events_30d",
            &column(|s| s.high_severity_30d as f64),
        );
        cols.push_defined("positive_events_7d", &column(|s| s.positive_7d as f64));
        cols.push_defined("negative_events_7d", &column(|s| s.negative_7d as f64));
        cols.push_defined(
            "days_since_last_event",
            &column(|s| s.days_since_last_event),
        );
        cols.push_defined("last_event_sentiment", &column(|s| s.last_event_sentiment));
        cols.push_defined("economic_events_30d", &column(|s| s.economic_30d as f64));
        cols.push_defined("political_events_30d", &column(|s| s.political_30d as f64));
        cols.push_defined(
            "innovation_events_30d",
            &column(|s| s.innovation_30d as f64),
        );

        // Interaction terms
        let price_x_sentiment: Vec<f64> = prices
            .iter()
            .zip(stats.iter())
            .map(|(p, s)| p.close * s.avg_sentiment_7d())
            .collect();
        cols.push_defined("price_x_sentiment_7d", &price_x_sentiment);

        let volatility_7 = rolling_std(&pct_change(&closes(prices), 1), SHORT_WINDOW_DAYS as usize);
        let volatility_x_events = volatility_7
            .iter()
            .zip(stats.iter())
            .map(|(v, s)| v.map(|v| v * s.events_7d as f64))
            .collect();
        cols.push("volatility_x_events_7d", volatility_x_events);
    }
}

/// Attach a forward-looking target to feature rows.
///
/// The label at row `t` is `(close[t+h] - close[t]) / close[t]` for
/// regression, or `1.0` when that return is positive (else `0.0`) for
/// classification. Rows whose label would need a price beyond the last known
/// row are dropped.
pub fn create_target(rows: &[FeatureRow], horizon: usize, kind: TargetKind) -> Result<Dataset> {
    if horizon == 0 {
        return Err(WalkForwardError::config("target horizon must be positive"));
    }

    let mut labeled = Vec::with_capacity(rows.len().saturating_sub(horizon));
    for row in rows {
        // The future row must be exactly `horizon` source periods ahead.
        let future = match rows.binary_search_by_key(&(row.index + horizon), |r| r.index) {
            Ok(j) => &rows[j],
            Err(_) => continue,
        };
        if row.close == 0.0 {
            continue;
        }
        let future_return = (future.close - row.close) / row.close;
        let target = match kind {
            TargetKind::Regression => future_return,
            TargetKind::Classification => {
                if future_return > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        let mut labeled_row = row.clone();
        labeled_row.target = Some(target);
        labeled.push(labeled_row);
    }

    debug!(
        "Labeled {} of {} rows with horizon {}",
        labeled.len(),
        rows.len(),
        horizon
    );
    Dataset::from_labeled_rows(&labeled, horizon, kind)
}

/// Column-oriented, labeled feature set ready for splitting and training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub closes: Vec<f64>,
    /// One feature vector per row, ordered like `feature_names`.
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub target_name: String,
    pub kind: TargetKind,
    pub horizon: usize,
}

impl Dataset {
    /// Build from rows that all carry a target.
    pub fn from_labeled_rows(rows: &[FeatureRow], horizon: usize, kind: TargetKind) -> Result<Self> {
        let feature_names: Vec<String> = rows
            .first()
            .map(|r| r.features.keys().cloned().collect())
            .unwrap_or_default();

        let mut dataset = Dataset {
            feature_names,
            timestamps: Vec::with_capacity(rows.len()),
            closes: Vec::with_capacity(rows.len()),
            features: Vec::with_capacity(rows.len()),
            targets: Vec::with_capacity(rows.len()),
            target_name: kind.column_name(horizon),
            kind,
            horizon,
        };

        for row in rows {
            let target = row.target.ok_or_else(|| {
                WalkForwardError::InvalidInput(format!("row {} has no target", row.index))
            })?;
            if row.features.len() != dataset.feature_names.len() {
                return Err(WalkForwardError::InvalidInput(format!(
                    "row {} has {} features, expected {}",
                    row.index,
                    row.features.len(),
                    dataset.feature_names.len()
                )));
            }
            // BTreeMap iteration is sorted, matching `feature_names`.
            dataset.features.push(row.features.values().copied().collect());
            dataset.timestamps.push(row.timestamp);
            dataset.closes.push(row.close);
            dataset.targets.push(target);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Fail with `InsufficientData` when fewer than `required` rows exist.
    pub fn ensure_rows(&self, required: usize) -> Result<()> {
        if self.len() < required {
            return Err(WalkForwardError::InsufficientData {
                required,
                available: self.len(),
            });
        }
        Ok(())
    }

    /// Borrowed view over a row range.
    ///
    /// Panics if the range is out of bounds.
    pub fn feature_matrix(&self, range: Range<usize>) -> FeatureMatrix<'_> {
        FeatureMatrix::new(
            &self.feature_names,
            &self.timestamps[range.clone()],
            &self.features[range],
        )
    }

    /// Targets over a row range.
    pub fn targets(&self, range: Range<usize>) -> &[f64] {
        &self.targets[range]
    }

    /// Copy a contiguous row range into a new dataset.
    pub fn slice(&self, range: Range<usize>) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            timestamps: self.timestamps[range.clone()].to_vec(),
            closes: self.closes[range.clone()].to_vec(),
            features: self.features[range.clone()].to_vec(),
            targets: self.targets[range].to_vec(),
            target_name: self.target_name.clone(),
            kind: self.kind,
            horizon: self.horizon,
        }
    }
}

/// Borrowed feature matrix handed to trainers and models.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatrix<'a> {
    names: &'a [String],
    timestamps: &'a [DateTime<Utc>],
    rows: &'a [Vec<f64>],
}

impl<'a> FeatureMatrix<'a> {
    pub fn new(
        names: &'a [String],
        timestamps: &'a [DateTime<Utc>],
        rows: &'a [Vec<f64>],
    ) -> Self {
        Self {
            names,
            timestamps,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &'a [String] {
        self.names
    }

    pub fn timestamps(&self) -> &'a [DateTime<Utc>] {
        self.timestamps
    }

    pub fn rows(&self) -> &'a [Vec<f64>] {
        self.rows
    }

    pub fn row(&self, i: usize) -> &'a [f64] {
        &self.rows[i]
    }

    /// Position of a named feature.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of one column.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[j]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventCategory, Sentiment, Severity};
    use chrono::TimeZone;

    fn create_test_prices(count: usize) -> Vec<PricePoint> {
        (0..count)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.1) + (i as f64 * 0.5).sin() * 5.0;
                PricePoint::new(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + chrono::Duration::days(i as i64),
                    base - 1.0,
                    base + 2.0,
                    base - 2.0,
                    base + 0.5,
                    1000000.0 + (i as f64 * 100.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_warmup_period() {
        assert_eq!(FeatureConfig::default().warmup_period(), 199);
        assert_eq!(FeatureConfig::default().longest_lookback(), 200);
        assert_eq!(FeatureConfig::minimal().warmup_period(), 20);
    }

    #[test]
    fn test_short_history_is_empty() {
        let engine = FeatureEngine::default();
        let rows = engine.create_features(&create_test_prices(199), None).unwrap();
        assert!(rows.is_empty());

        let rows = engine.create_features(&create_test_prices(200), None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 199);
    }

    #[test]
    fn test_feature_names() {
        let engine = FeatureEngine::default();
        let rows = engine.create_features(&create_test_prices(260), None).unwrap();
        assert_eq!(rows.len(), 61);

        let f = &rows[0].features;
        for name in [
            "return_1",
            "log_return_30",
            "volatility_14",
            "atr_14",
            "daily_range",
            "avg_range_7",
            "sma_200",
            "ema_50",
            "distance_sma_21",
            "macd_histogram",
            "rsi_14",
            "bb_position",
            "roc_3",
            "stoch_d",
            "volume_ratio_30",
            "obv_ema",
            "vwap_distance",
            "day_of_week_cos",
            "quarter",
        ] {
            assert!(f.contains_key(name), "missing {}", name);
        }
        assert!(!f.contains_key("events_last_7d"));
    }

    #[test]
    fn test_rejects_unordered_prices() {
        let mut prices = create_test_prices(50);
        prices.swap(10, 11);
        let engine = FeatureEngine::new(FeatureConfig::minimal());
        assert!(matches!(
            engine.create_features(&prices, None),
            Err(WalkForwardError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = FeatureConfig::minimal().with_ma_periods(vec![0, 7]);
        let engine = FeatureEngine::new(config);
        assert!(matches!(
            engine.create_features(&create_test_prices(50), None),
            Err(WalkForwardError::ConfigError(_))
        ));
    }

    #[test]
    fn test_event_features_added() {
        let prices = create_test_prices(60);
        let events = vec![ExternalEvent::new(
            prices[30].timestamp,
            EventCategory::Economic,
            Severity::High,
            Sentiment::Positive,
        )];
        let engine = FeatureEngine::new(FeatureConfig::minimal());
        let rows = engine.create_features(&prices, Some(&events)).unwrap();

        let at_event = rows.iter().find(|r| r.index == 30).unwrap();
        assert_eq!(at_event.features["events_last_7d"], 1.0);
        assert_eq!(at_event.features["days_since_last_event"], 0.0);
        assert!((at_event.features["price_x_sentiment_7d"] - at_event.close).abs() < 1e-9);

        let before = rows.iter().find(|r| r.index == 29).unwrap();
        assert_eq!(before.features["events_last_7d"], 0.0);
        assert_eq!(before.features["days_since_last_event"], 999.0);
    }

    #[test]
    fn test_create_target_alignment() {
        let prices = create_test_prices(80);
        let engine = FeatureEngine::new(FeatureConfig::minimal());
        let rows = engine.create_features(&prices, None).unwrap();
        let dataset = create_target(&rows, 3, TargetKind::Regression).unwrap();

        assert_eq!(dataset.len(), rows.len() - 3);
        assert_eq!(dataset.target_name, "target_return_3");
        for (k, row) in rows.iter().take(dataset.len()).enumerate() {
            let expected = (prices[row.index + 3].close - prices[row.index].close)
                / prices[row.index].close;
            assert_eq!(dataset.targets[k], expected);
            assert_eq!(dataset.timestamps[k], row.timestamp);
        }
    }

    #[test]
    fn test_classification_target() {
        let prices = create_test_prices(80);
        let engine = FeatureEngine::new(FeatureConfig::minimal());
        let rows = engine.create_features(&prices, None).unwrap();
        let dataset = create_target(&rows, 1, TargetKind::Classification).unwrap();
        assert!(dataset.targets.iter().all(|&t| t == 0.0 || t == 1.0));
        assert_eq!(dataset.target_name, "target_direction_1");
    }

    #[test]
    fn test_zero_horizon_rejected() {
        assert!(matches!(
            create_target(&[], 0, TargetKind::Regression),
            Err(WalkForwardError::ConfigError(_))
        ));
    }

    #[test]
    fn test_feature_matrix_view() {
        let prices = create_test_prices(80);
        let engine = FeatureEngine::new(FeatureConfig::minimal());
        let rows = engine.create_features(&prices, None).unwrap();
        let dataset = create_target(&rows, 1, TargetKind::Regression).unwrap();

        let x = dataset.feature_matrix(5..15);
        assert_eq!(x.len(), 10);
        assert_eq!(x.n_features(), dataset.n_features());
        assert_eq!(x.timestamps()[0], dataset.timestamps[5]);
        let j = x.column_index("return_1").unwrap();
        assert_eq!(x.row(0)[j], rows[5].features["return_1"]);

        assert!(dataset.ensure_rows(dataset.len()).is_ok());
        assert!(matches!(
            dataset.ensure_rows(dataset.len() + 1),
            Err(WalkForwardError::InsufficientData { .. })
        ));
    }
}
