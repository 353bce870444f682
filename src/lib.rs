//! cryptowalk - walk-forward validation and strategy backtesting for
//! ML-driven crypto price models.
//!
//! # Overview
//!
//! cryptowalk takes daily OHLCV history (plus optional dated market events),
//! turns it into a leakage-free feature table, and answers two questions
//! about a forecasting model:
//!
//! - **Does it generalize?** Rolling walk-forward validation retrains the
//!   model on a sliding window and scores it only on the rows that follow.
//! - **Would it make money?** The stitched out-of-sample predictions drive a
//!   position rule, and the resulting return stream is compared against
//!   buy-and-hold after transaction costs.
//!
//! Highlights:
//!
//! - **Causal features**: every value at row *t* uses data at or before *t*
//! - **Pluggable models**: anything implementing [`model::Trainer`]
//! - **Parallel folds**: opt-in, with results identical to a sequential run
//! - **Risk-adjusted analytics**: Sharpe, Sortino, Calmar, drawdown, win rate
//! - **Reproducible runs**: TOML configuration and hashed run metadata
//!
//! # Quick Start
//!
//! ```no_run
//! use cryptowalk::{
//!     analytics::{PerformanceReport, ResultFormatter},
//!     backtest::{backtest_walk_forward, BacktestConfig},
//!     data::random_walk,
//!     features::{create_target, FeatureConfig, FeatureEngine},
//!     model::RidgeTrainer,
//!     types::TargetKind,
//!     walkforward::{WalkForwardAnalyzer, WalkForwardConfig},
//! };
//!
//! let prices = random_walk(730, 30_000.0, 0.001, 0.03, 42);
//!
//! let engine = FeatureEngine::new(FeatureConfig::minimal());
//! let rows = engine.create_features(&prices, None).unwrap();
//! let dataset = create_target(&rows, 1, TargetKind::Regression).unwrap();
//!
//! let analyzer = WalkForwardAnalyzer::new(WalkForwardConfig::new(180, 30, 30));
//! let result = analyzer.run(&dataset, &RidgeTrainer::new(1.0)).unwrap();
//!
//! let state = backtest_walk_forward(&result, &BacktestConfig::default()).unwrap();
//! if let Some(report) = PerformanceReport::from_walk_forward(&result, &state) {
//!     ResultFormatter::print_report(&report);
//! }
//! ```
//!
//! # Custom Models
//!
//! Closures can stand in for a trainer:
//!
//! ```
//! use cryptowalk::model::{FnTrainer, MeanModel, Model, Trainer};
//!
//! let trainer = FnTrainer::new("flat", |_x, _y| {
//!     Ok(Box::new(MeanModel::new(0.0)) as Box<dyn Model>)
//! });
//! assert_eq!(trainer.name(), "flat");
//! ```
//!
//! # Modules
//!
//! - [`types`]: Price bars, events, targets and position rules
//! - [`data`]: CSV loading, timestamp parsing and synthetic series
//! - [`indicators`]: Rolling-window primitives used by the feature engine
//! - [`events`]: Trailing event-window aggregation
//! - [`features`]: Feature engineering, targets and the labeled dataset
//! - [`split`]: Chronological splits and rolling windows
//! - [`model`]: Trainer/Model traits, built-in models and comparison
//! - [`walkforward`]: Rolling retrain-and-predict validation
//! - [`backtest`]: Prediction-driven return simulation
//! - [`analytics`]: Error metrics, risk-adjusted performance and reporting
//! - [`config`]: TOML configuration file support
//! - [`export`]: CSV and JSON output
//! - [`metadata`]: Run identity and input checksums

pub mod analytics;
pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod export;
pub mod features;
pub mod indicators;
pub mod metadata;
pub mod model;
pub mod split;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use analytics::{PerformanceReport, ResultFormatter, SideMetrics};
pub use backtest::{backtest_holdout, backtest_walk_forward, run_backtest, BacktestConfig, PortfolioState};
pub use error::{Result, WalkForwardError};
pub use features::{create_target, Dataset, FeatureConfig, FeatureEngine};
pub use model::{FnTrainer, Model, ModelComparator, Trainer, TrainerKind};
pub use split::TimeSeriesSplitter;
pub use types::{ExternalEvent, PositionStrategy, PricePoint, TargetKind};
pub use walkforward::{CancellationToken, WalkForwardAnalyzer, WalkForwardConfig, WalkForwardResult};
