//! Position and P&L simulation over a prediction stream.
//!
//! Positions are lagged one period: the position decided from the prediction
//! at `t - 1` earns the price return from `t - 1` to `t`. A change of position
//! costs `|Δposition| × transaction_cost` of notional in the period it occurs.

use crate::error::{Result, WalkForwardError};
use crate::features::Dataset;
use crate::model::Trainer;
use crate::split::TimeSeriesSplitter;
use crate::types::PositionStrategy;
use crate::walkforward::WalkForwardResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting capital in currency units.
    pub initial_capital: f64,
    /// Cost per unit of position change, as a fraction of notional.
    pub transaction_cost: f64,
    pub strategy: PositionStrategy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            transaction_cost: 0.001,
            strategy: PositionStrategy::LongShort,
        }
    }
}

impl BacktestConfig {
    pub fn with_capital(mut self, initial_capital: f64) -> Self {
        self.initial_capital = initial_capital;
        self
    }

    pub fn with_transaction_cost(mut self, transaction_cost: f64) -> Self {
        self.transaction_cost = transaction_cost;
        self
    }

    pub fn with_strategy(mut self, strategy: PositionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(WalkForwardError::config(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !(self.transaction_cost.is_finite() && self.transaction_cost >= 0.0) {
            return Err(WalkForwardError::config(format!(
                "transaction_cost must be non-negative, got {}",
                self.transaction_cost
            )));
        }
        if let PositionStrategy::Continuous { scale } = self.strategy {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(WalkForwardError::config(format!(
                    "continuous strategy scale must be positive, got {}",
                    scale
                )));
            }
        }
        Ok(())
    }
}

/// One period of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub prediction: f64,
    /// Position taken at the end of this period.
    pub position: f64,
    /// Price return from the previous period.
    pub price_return: f64,
    /// Previous position times the price return.
    pub gross_return: f64,
    pub transaction_cost: f64,
    pub net_return: f64,
    /// Running product of `1 + net_return`.
    pub cumulative_strategy: f64,
    /// Running product of `1 + price_return`.
    pub cumulative_buy_hold: f64,
    pub portfolio_value: f64,
    pub buy_hold_value: f64,
}

/// Simulated portfolio over a prediction stream.
///
/// Points are appended in time order during simulation and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    initial_capital: f64,
    transaction_cost: f64,
    strategy: PositionStrategy,
    points: Vec<PortfolioPoint>,
}

impl PortfolioState {
    fn empty(config: &BacktestConfig) -> Self {
        Self {
            initial_capital: config.initial_capital,
            transaction_cost: config.transaction_cost,
            strategy: config.strategy,
            points: Vec::new(),
        }
    }

    pub fn points(&self) -> &[PortfolioPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn transaction_cost_rate(&self) -> f64 {
        self.transaction_cost
    }

    pub fn strategy(&self) -> PositionStrategy {
        self.strategy
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    pub fn net_returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.net_return).collect()
    }

    pub fn price_returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price_return).collect()
    }

    pub fn positions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.position).collect()
    }

    pub fn predictions(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.prediction).collect()
    }

    pub fn cumulative_strategy(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.cumulative_strategy).collect()
    }

    pub fn cumulative_buy_hold(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.cumulative_buy_hold).collect()
    }

    /// Final strategy value (initial capital when empty).
    pub fn final_value(&self) -> f64 {
        self.points
            .last()
            .map_or(self.initial_capital, |p| p.portfolio_value)
    }

    /// Final buy-and-hold value (initial capital when empty).
    pub fn final_buy_hold_value(&self) -> f64 {
        self.points
            .last()
            .map_or(self.initial_capital, |p| p.buy_hold_value)
    }

    /// Sum of per-period cost fractions.
    pub fn total_cost_fraction(&self) -> f64 {
        self.points.iter().map(|p| p.transaction_cost).sum()
    }

    /// Costs in currency, charged against the value at the start of each period.
    pub fn total_costs(&self) -> f64 {
        let mut value = self.initial_capital;
        let mut total = 0.0;
        for p in &self.points {
            total += value * p.transaction_cost;
            value = p.portfolio_value;
        }
        total
    }

    /// Indices of periods where the position changed.
    pub fn trade_periods(&self) -> Vec<usize> {
        self.points
            .windows(2)
            .enumerate()
            .filter(|(_, w)| (w[1].position - w[0].position).abs() > 0.0)
            .map(|(i, _)| i + 1)
            .collect()
    }
}

/// Simulate a strategy over aligned predictions, prices and timestamps.
///
/// Empty input yields an empty state. Sequences of different lengths, or
/// non-positive or non-finite prices, are rejected.
pub fn run_backtest(
    predictions: &[f64],
    prices: &[f64],
    timestamps: &[DateTime<Utc>],
    config: &BacktestConfig,
) -> Result<PortfolioState> {
    config.validate()?;
    if predictions.len() != prices.len() || prices.len() != timestamps.len() {
        return Err(WalkForwardError::InvalidInput(format!(
            "length mismatch: {} predictions, {} prices, {} timestamps",
            predictions.len(),
            prices.len(),
            timestamps.len()
        )));
    }
    if let Some(bad) = prices.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
        return Err(WalkForwardError::InvalidInput(format!(
            "prices must be positive and finite, got {}",
            bad
        )));
    }

    let mut state = PortfolioState::empty(config);
    if predictions.is_empty() {
        return Ok(state);
    }

    let mut cum_strategy = 1.0;
    let mut cum_buy_hold = 1.0;
    let mut prev: Option<(f64, f64)> = None; // (price, position)

    for ((&prediction, &price), &timestamp) in predictions.iter().zip(prices).zip(timestamps) {
        let position = config.strategy.position(prediction);
        let (price_return, gross_return, cost) = match prev {
            Some((prev_price, prev_position)) => {
                let r = price / prev_price - 1.0;
                (
                    r,
                    prev_position * r,
                    (position - prev_position).abs() * config.transaction_cost,
                )
            }
            None => (0.0, 0.0, 0.0),
        };
        let net_return = gross_return - cost;
        cum_strategy *= 1.0 + net_return;
        cum_buy_hold *= 1.0 + price_return;

        state.points.push(PortfolioPoint {
            timestamp,
            price,
            prediction,
            position,
            price_return,
            gross_return,
            transaction_cost: cost,
            net_return,
            cumulative_strategy: cum_strategy,
            cumulative_buy_hold: cum_buy_hold,
            portfolio_value: config.initial_capital * cum_strategy,
            buy_hold_value: config.initial_capital * cum_buy_hold,
        });
        prev = Some((price, position));
    }

    debug!(
        "Simulated {} periods ({}): final value {:.2}, buy & hold {:.2}, {} trades",
        state.len(),
        config.strategy,
        state.final_value(),
        state.final_buy_hold_value(),
        state.trade_periods().len()
    );
    Ok(state)
}

/// Simulate the stitched out-of-sample stream of a walk-forward run.
pub fn backtest_walk_forward(
    result: &WalkForwardResult,
    config: &BacktestConfig,
) -> Result<PortfolioState> {
    run_backtest(
        &result.predicted(),
        &result.prices(),
        &result.timestamps(),
        config,
    )
}

/// Outcome of a single train/test backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldoutBacktest {
    pub trainer: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub actuals: Vec<f64>,
    pub state: PortfolioState,
}

/// Fit once on the train and validation partitions, then simulate the
/// test partition.
pub fn backtest_holdout(
    dataset: &Dataset,
    splitter: &TimeSeriesSplitter,
    trainer: &dyn Trainer,
    config: &BacktestConfig,
) -> Result<HoldoutBacktest> {
    let split = splitter.split_indices(dataset.len())?;
    let fit_range = split.train_and_validation();

    let model = trainer.fit(&dataset.feature_matrix(fit_range.clone()), dataset.targets(fit_range.clone()))?;
    let predictions = model.predict(&dataset.feature_matrix(split.test.clone()))?;

    let test = split.test.clone();
    let state = run_backtest(
        &predictions,
        &dataset.closes[test.clone()],
        &dataset.timestamps[test.clone()],
        config,
    )?;
    info!(
        "Holdout backtest with {}: trained on {} rows, tested on {}",
        trainer.name(),
        fit_range.len(),
        test.len()
    );

    Ok(HoldoutBacktest {
        trainer: trainer.name().to_string(),
        train_rows: fit_range.len(),
        test_rows: test.len(),
        actuals: dataset.targets(test).to_vec(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_empty_input() {
        let state = run_backtest(&[], &[], &[], &BacktestConfig::default()).unwrap();
        assert!(state.is_empty());
        assert_eq!(state.final_value(), 10_000.0);
    }

    #[test]
    fn test_length_mismatch() {
        let err = run_backtest(&[0.1], &[1.0, 2.0], &days(2), &BacktestConfig::default());
        assert!(matches!(err, Err(WalkForwardError::InvalidInput(_))));
    }

    #[test]
    fn test_position_is_lagged() {
        // The flip to short at t=1 only takes effect on the t=1 -> t=2 move.
        let prices = [100.0, 100.0, 110.0];
        let predictions = [1.0, -1.0, -1.0];
        let config = BacktestConfig::default().with_transaction_cost(0.0);
        let state = run_backtest(&predictions, &prices, &days(3), &config).unwrap();

        let p = state.points();
        assert_eq!(p[0].net_return, 0.0);
        assert_eq!(p[1].gross_return, 0.0);
        assert!((p[2].gross_return - (-0.1)).abs() < 1e-12);
        assert!((state.final_value() - 9_000.0).abs() < 1e-9);
        assert!((state.final_buy_hold_value() - 11_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_transaction_costs() {
        let prices = [100.0, 100.0, 100.0, 100.0];
        let predictions = [1.0, -1.0, -1.0, 1.0];
        let config = BacktestConfig::default().with_transaction_cost(0.001);
        let state = run_backtest(&predictions, &prices, &days(4), &config).unwrap();

        // Two flips of size 2 each.
        assert_eq!(state.trade_periods(), vec![1, 3]);
        assert!((state.points()[1].transaction_cost - 0.002).abs() < 1e-15);
        assert!((state.total_cost_fraction() - 0.004).abs() < 1e-15);
        assert!(state.final_value() < 10_000.0);
        assert!(state.total_costs() > 0.0);
    }

    #[test]
    fn test_long_only_stays_flat() {
        let prices = [100.0, 90.0, 80.0];
        let predictions = [-0.5, -0.5, -0.5];
        let config = BacktestConfig::default().with_strategy(PositionStrategy::LongOnly);
        let state = run_backtest(&predictions, &prices, &days(3), &config).unwrap();
        assert_eq!(state.positions(), vec![0.0, 0.0, 0.0]);
        assert_eq!(state.final_value(), 10_000.0);
    }

    #[test]
    fn test_continuous_positions() {
        let config =
            BacktestConfig::default().with_strategy(PositionStrategy::Continuous { scale: 10.0 });
        let state = run_backtest(&[0.05, 0.5, -0.02], &[1.0, 1.0, 1.0], &days(3), &config).unwrap();
        assert_eq!(state.positions(), vec![0.5, 1.0, -0.2]);
    }

    #[test]
    fn test_invalid_prices_and_config() {
        assert!(run_backtest(&[0.1], &[0.0], &days(1), &BacktestConfig::default()).is_err());
        let config = BacktestConfig::default().with_transaction_cost(-0.1);
        assert!(run_backtest(&[], &[], &[], &config).is_err());
    }
}
