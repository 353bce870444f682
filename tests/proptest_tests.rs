//! Property-based tests using proptest for invariant testing.
//!
//! These tests verify that:
//! 1. Rolling windows never let a test window overlap its training window
//! 2. The stitched out-of-sample stream is strictly chronological
//! 3. Drawdown and ratio metrics stay bounded and finite
//! 4. Higher transaction costs never improve the final value
//! 5. Chronological splits partition the data exactly

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;

use cryptowalk::analytics::{
    calmar_ratio, max_drawdown_pct, profit_factor, sharpe_ratio, sortino_ratio, win_rate_pct,
    PerformanceReport,
};
use cryptowalk::backtest::{run_backtest, BacktestConfig};
use cryptowalk::features::Dataset;
use cryptowalk::model::{MeanTrainer, RidgeTrainer};
use cryptowalk::split::{rolling_windows, TimeSeriesSplitter};
use cryptowalk::types::{PositionStrategy, PricePoint, TargetKind};
use cryptowalk::walkforward::{WalkForwardAnalyzer, WalkForwardConfig};

// ============================================================================
// Generators
// ============================================================================

/// Strategy to generate valid OHLC values where High >= Low
fn valid_ohlc_strategy() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (10.0..10000.0f64, 0.0..1.0f64, 0.0..1.0f64, 0.0..0.1f64, 0.0..0.1f64).prop_map(
        |(base, o, c, up, down)| {
            let high = base * (1.0 + up);
            let low = base * (1.0 - down);
            let open = low + o * (high - low);
            let close = low + c * (high - low);
            (open, high, low, close)
        },
    )
}

/// Price path from per-period moves of at most 20%.
fn price_path(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.2..0.2f64, 2..max_len).prop_map(|moves| {
        let mut price = 100.0;
        moves
            .into_iter()
            .map(|m| {
                price *= 1.0 + m;
                price
            })
            .collect()
    })
}

fn days(n: usize) -> Vec<chrono::DateTime<Utc>> {
    let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    (0..n).map(|i| start + Duration::days(i as i64)).collect()
}

/// One-feature dataset with a deterministic target.
fn synthetic_dataset(n: usize) -> Dataset {
    Dataset {
        feature_names: vec!["x".to_string()],
        timestamps: days(n),
        closes: (0..n).map(|i| 100.0 + i as f64).collect(),
        features: (0..n).map(|i| vec![(i as f64 * 0.3).sin()]).collect(),
        targets: (0..n).map(|i| (i as f64 * 0.7).cos() * 0.01).collect(),
        target_name: "target_return_1".to_string(),
        kind: TargetKind::Regression,
        horizon: 1,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // ========================================================================
    // Price Validation Tests
    // ========================================================================

    #[test]
    fn valid_ohlc_passes_validation((open, high, low, close) in valid_ohlc_strategy()) {
        let p = PricePoint::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), open, high, low, close, 100.0);
        prop_assert!(p.validate(), "o={} h={} l={} c={}", open, high, low, close);
    }

    #[test]
    fn high_below_low_fails_validation(base in 10.0..1000.0f64, gap in 1.0..100.0f64) {
        let p = PricePoint::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), base, base, base + gap, base, 100.0);
        prop_assert!(!p.validate());
    }

    // ========================================================================
    // Window and Stream Tests
    // ========================================================================

    #[test]
    fn rolling_windows_never_overlap_train_and_test(
        n in 0..600usize,
        train in 1..200usize,
        test in 1..60usize,
        step in 1..60usize,
    ) {
        let windows = rolling_windows(n, train, test, step);
        let config = WalkForwardConfig::new(train, test, step);
        prop_assert_eq!(windows.len(), config.max_windows(n));

        for w in &windows {
            prop_assert_eq!(w.train_end, w.test_start);
            prop_assert!(w.train_start < w.train_end);
            prop_assert!(w.test_start < w.test_end);
            prop_assert!(w.test_end <= n);
            prop_assert_eq!(w.train_len(), train);
            prop_assert_eq!(w.test_len(), test);
        }
        for pair in windows.windows(2) {
            prop_assert_eq!(pair[1].test_start - pair[0].test_start, step);
        }
    }

    #[test]
    fn stitched_stream_is_chronological(
        n in 20..300usize,
        train in 5..80usize,
        test in 1..40usize,
        step in 1..40usize,
    ) {
        let dataset = synthetic_dataset(n);
        let config = WalkForwardConfig::new(train, test, step).with_min_sizes(1, 1);
        let result = WalkForwardAnalyzer::new(config).run(&dataset, &MeanTrainer).unwrap();

        prop_assert!(result.skipped.is_empty());
        prop_assert!(result.predictions.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        // Every covered row appears exactly once.
        let covered: BTreeSet<usize> = result
            .folds
            .iter()
            .flat_map(|f| f.window.test_range())
            .collect();
        prop_assert_eq!(result.predictions.len(), covered.len());

        // Each row comes from the newest fold covering it.
        for p in &result.predictions {
            let row = dataset.timestamps.iter().position(|t| *t == p.timestamp).unwrap();
            let newest = result
                .folds
                .iter()
                .filter(|f| f.window.test_range().contains(&row))
                .map(|f| f.fold)
                .max();
            prop_assert_eq!(Some(p.fold), newest);
            prop_assert_eq!(p.actual, dataset.targets[row]);
        }
    }

    #[test]
    fn parallel_run_matches_sequential(n in 60..250usize, test in 5..30usize) {
        let dataset = synthetic_dataset(n);
        let config = WalkForwardConfig::new(40, test, test).with_min_sizes(10, 1);
        let sequential = WalkForwardAnalyzer::new(config.clone())
            .run(&dataset, &RidgeTrainer::new(0.5))
            .unwrap();
        let parallel = WalkForwardAnalyzer::new(config.with_parallel(true))
            .run(&dataset, &RidgeTrainer::new(0.5))
            .unwrap();
        prop_assert_eq!(sequential.folds, parallel.folds);
        prop_assert_eq!(sequential.predictions, parallel.predictions);
    }

    // ========================================================================
    // Metric Bound Tests
    // ========================================================================

    #[test]
    fn max_drawdown_is_bounded(values in prop::collection::vec(0.001..1000.0f64, 1..200)) {
        let dd = max_drawdown_pct(&values);
        prop_assert!(dd <= 0.0, "drawdown {} above zero", dd);
        prop_assert!(dd >= -100.0, "drawdown {} below -100%", dd);
    }

    #[test]
    fn ratios_are_always_finite(returns in prop::collection::vec(-0.5..0.5f64, 0..200)) {
        prop_assert!(sharpe_ratio(&returns).is_finite());
        prop_assert!(sortino_ratio(&returns, 12.0).is_finite());
        prop_assert!(profit_factor(&returns).is_finite());
        prop_assert!(calmar_ratio(12.0, 0.0).is_finite());
        let trades: Vec<usize> = (0..returns.len()).step_by(3).collect();
        let win_rate = win_rate_pct(&returns, &trades);
        prop_assert!((0.0..=100.0).contains(&win_rate));
    }

    #[test]
    fn zero_trades_give_defined_trade_stats(prices in price_path(120), prediction in 0.001..1.0f64) {
        let n = prices.len();
        let state = run_backtest(&vec![prediction; n], &prices, &days(n), &BacktestConfig::default()).unwrap();
        prop_assert!(state.trade_periods().is_empty());

        let report = PerformanceReport::compute(&state, None).unwrap();
        prop_assert_eq!(report.total_trades, 0);
        prop_assert_eq!(report.win_rate_pct, 0.0);
        prop_assert!(report.profit_factor.is_finite());
        prop_assert_eq!(report.total_costs, 0.0);
    }

    // ========================================================================
    // Simulation Tests
    // ========================================================================

    #[test]
    fn higher_costs_never_help(
        prices in price_path(150),
        seed in 0.0..10.0f64,
        low_cost in 0.0..0.02f64,
        extra in 0.0..0.03f64,
    ) {
        let n = prices.len();
        let predictions: Vec<f64> = (0..n).map(|i| (i as f64 * 1.3 + seed).sin()).collect();
        let ts = days(n);

        let cheap = run_backtest(&predictions, &prices, &ts, &BacktestConfig::default().with_transaction_cost(low_cost)).unwrap();
        let dear = run_backtest(&predictions, &prices, &ts, &BacktestConfig::default().with_transaction_cost(low_cost + extra)).unwrap();
        prop_assert!(dear.final_value() <= cheap.final_value());
    }

    #[test]
    fn first_period_is_flat(prices in price_path(50), prediction in -1.0..1.0f64) {
        let n = prices.len();
        let state = run_backtest(&vec![prediction; n], &prices, &days(n), &BacktestConfig::default()).unwrap();
        let first = &state.points()[0];
        prop_assert_eq!(first.net_return, 0.0);
        prop_assert_eq!(first.transaction_cost, 0.0);
        prop_assert_eq!(first.cumulative_strategy, 1.0);
        prop_assert_eq!(first.cumulative_buy_hold, 1.0);
    }

    #[test]
    fn positions_stay_in_unit_range(prediction in -1e6..1e6f64, scale in 0.0..1e3f64) {
        for strategy in [
            PositionStrategy::LongShort,
            PositionStrategy::LongOnly,
            PositionStrategy::Continuous { scale },
        ] {
            let pos = strategy.position(prediction);
            prop_assert!((-1.0..=1.0).contains(&pos));
        }
    }

    // ========================================================================
    // Split Tests
    // ========================================================================

    #[test]
    fn split_partitions_rows(n in 1..2000usize, test in 0.05..0.5f64, val in 0.0..0.45f64) {
        let splitter = TimeSeriesSplitter::new(test, val).unwrap();
        if let Ok(idx) = splitter.split_indices(n) {
            prop_assert_eq!(idx.train.start, 0);
            prop_assert_eq!(idx.train.end, idx.validation.start);
            prop_assert_eq!(idx.validation.end, idx.test.start);
            prop_assert_eq!(idx.test.end, n);
            prop_assert!(!idx.train.is_empty());
            prop_assert!(!idx.test.is_empty());
        }
    }
}
