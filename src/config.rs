//! Configuration file support.
//!
//! A single TOML file describes a full run (data, features, target, split,
//! walk-forward windows, simulation and model) so results are reproducible.

use crate::backtest::BacktestConfig;
use crate::error::{Result, WalkForwardError};
use crate::features::FeatureConfig;
use crate::model::{RankMetric, Trainer, TrainerKind};
use crate::split::TimeSeriesSplitter;
use crate::types::{PositionStrategy, TargetKind};
use crate::walkforward::WalkForwardConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete run configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineFileConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub features: FeatureSettings,
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default)]
    pub split: SplitSettings,
    #[serde(default)]
    pub walkforward: WalkForwardSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub model: ModelSettings,
}

/// Input files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// OHLCV CSV file.
    #[serde(default)]
    pub prices: Option<String>,
    /// Optional event CSV file.
    #[serde(default)]
    pub events: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
}

/// Feature set selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// "default" or "minimal".
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_true")]
    pub include_volume: bool,
    #[serde(default = "default_true")]
    pub include_time: bool,
    #[serde(default = "default_true")]
    pub include_events: bool,
}

fn default_preset() -> String { "default".to_string() }
fn default_true() -> bool { true }

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            include_volume: true,
            include_time: true,
            include_events: true,
        }
    }
}

/// Prediction target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

fn default_horizon() -> usize { 1 }

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            kind: TargetKind::Regression,
            horizon: 1,
        }
    }
}

/// Single train/validation/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSettings {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
}

fn default_test_fraction() -> f64 { 0.2 }
fn default_validation_fraction() -> f64 { 0.1 }

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.1,
        }
    }
}

/// Walk-forward windows, in rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSettings {
    #[serde(default = "default_train_window")]
    pub train_window: usize,
    #[serde(default = "default_test_window")]
    pub test_window: usize,
    #[serde(default = "default_retrain_frequency")]
    pub retrain_frequency: usize,
    #[serde(default = "default_min_train")]
    pub min_train_size: usize,
    #[serde(default = "default_min_test")]
    pub min_test_size: usize,
    #[serde(default)]
    pub parallel: bool,
}

fn default_train_window() -> usize { 180 }
fn default_test_window() -> usize { 30 }
fn default_retrain_frequency() -> usize { 30 }
fn default_min_train() -> usize { 50 }
fn default_min_test() -> usize { 5 }

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            train_window: 180,
            test_window: 30,
            retrain_frequency: 30,
            min_train_size: 50,
            min_test_size: 5,
            parallel: false,
        }
    }
}

/// Position and cost settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    /// Fraction of notional per unit of position change.
    #[serde(default = "default_transaction_cost")]
    pub transaction_cost: f64,
    /// "long_short", "long_only" or "continuous".
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Prediction multiplier for the continuous strategy.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_capital() -> f64 { 10_000.0 }
fn default_transaction_cost() -> f64 { 0.001 }
fn default_strategy() -> String { "long_short".to_string() }
fn default_scale() -> f64 { 1.0 }

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            transaction_cost: 0.001,
            strategy: default_strategy(),
            scale: 1.0,
        }
    }
}

/// Trainer selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// "mean", "ridge", "logistic" or "ensemble".
    #[serde(default = "default_trainer")]
    pub trainer: String,
    /// Regularization strength.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Metric used to rank models in comparisons.
    #[serde(default = "default_rank_by")]
    pub rank_by: String,
}

fn default_trainer() -> String { "ridge".to_string() }
fn default_alpha() -> f64 { 1.0 }
fn default_rank_by() -> String { "mae".to_string() }

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            trainer: default_trainer(),
            alpha: 1.0,
            rank_by: default_rank_by(),
        }
    }
}

impl EngineFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: EngineFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| WalkForwardError::config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn feature_config(&self) -> Result<FeatureConfig> {
        let base = match self.features.preset.trim().to_lowercase().as_str() {
            "default" | "full" => FeatureConfig::default(),
            "minimal" => FeatureConfig::minimal(),
            other => {
                return Err(WalkForwardError::config(format!(
                    "Unknown feature preset: '{}' (expected default or minimal)",
                    other
                )))
            }
        };
        let config = base
            .with_volume_features(self.features.include_volume)
            .with_time_features(self.features.include_time)
            .with_event_features(self.features.include_events);
        config.validate()?;
        Ok(config)
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target.kind
    }

    pub fn horizon(&self) -> Result<usize> {
        if self.target.horizon == 0 {
            return Err(WalkForwardError::config("target horizon must be positive"));
        }
        Ok(self.target.horizon)
    }

    pub fn splitter(&self) -> Result<TimeSeriesSplitter> {
        TimeSeriesSplitter::new(self.split.test_fraction, self.split.validation_fraction)
    }

    pub fn walk_forward_config(&self) -> Result<WalkForwardConfig> {
        let w = &self.walkforward;
        let config = WalkForwardConfig::new(w.train_window, w.test_window, w.retrain_frequency)
            .with_min_sizes(w.min_train_size, w.min_test_size)
            .with_parallel(w.parallel);
        config.validate()?;
        Ok(config)
    }

    pub fn backtest_config(&self) -> Result<BacktestConfig> {
        let strategy = match self.backtest.strategy.parse::<PositionStrategy>()? {
            PositionStrategy::Continuous { .. } => PositionStrategy::Continuous {
                scale: self.backtest.scale,
            },
            other => other,
        };
        let config = BacktestConfig::default()
            .with_capital(self.backtest.initial_capital)
            .with_transaction_cost(self.backtest.transaction_cost)
            .with_strategy(strategy);
        config.validate()?;
        Ok(config)
    }

    pub fn trainer_kind(&self) -> Result<TrainerKind> {
        let kind: TrainerKind = self.model.trainer.parse()?;
        if !kind.supports(self.target.kind) {
            return Err(WalkForwardError::config(format!(
                "Model '{}' cannot fit a {:?} target",
                kind, self.target.kind
            )));
        }
        Ok(kind)
    }

    pub fn trainer(&self) -> Result<Box<dyn Trainer>> {
        if !(self.model.alpha.is_finite() && self.model.alpha >= 0.0) {
            return Err(WalkForwardError::config(format!(
                "alpha must be non-negative, got {}",
                self.model.alpha
            )));
        }
        Ok(self.trainer_kind()?.build(self.target.kind, self.model.alpha))
    }

    pub fn rank_metric(&self) -> Result<RankMetric> {
        self.model.rank_by.parse()
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# cryptowalk run configuration

[data]
prices = "data/btc_daily.csv"
# events = "data/events.csv"
# date_format = "%Y-%m-%d"

[features]
preset = "default"      # or "minimal" for short histories
include_volume = true
include_time = true
include_events = true

[target]
kind = "regression"     # or "classification"
horizon = 1

[split]
test_fraction = 0.2
validation_fraction = 0.1

[walkforward]
train_window = 180
test_window = 30
retrain_frequency = 30
min_train_size = 50
min_test_size = 5
parallel = false

[backtest]
initial_capital = 10000.0
transaction_cost = 0.001  # 0.1% per unit of position change
strategy = "long_short"   # long_short, long_only or continuous
scale = 1.0

[model]
trainer = "ridge"         # mean, ridge, logistic or ensemble
alpha = 1.0
rank_by = "mae"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = EngineFileConfig::default();
        assert_eq!(config.walkforward.train_window, 180);
        assert_eq!(config.backtest.initial_capital, 10_000.0);
        assert_eq!(config.model.trainer, "ridge");
        assert_eq!(config.walk_forward_config().unwrap(), WalkForwardConfig::default());
        assert_eq!(config.backtest_config().unwrap(), BacktestConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let toml_content = r#"
[target]
kind = "classification"
horizon = 3

[walkforward]
train_window = 120
retrain_frequency = 10

[backtest]
strategy = "continuous"
scale = 25.0

[model]
trainer = "logistic"
"#;
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", toml_content).unwrap();

        let config = EngineFileConfig::load(file.path()).unwrap();
        assert_eq!(config.target_kind(), TargetKind::Classification);
        assert_eq!(config.horizon().unwrap(), 3);

        let wf = config.walk_forward_config().unwrap();
        assert_eq!(wf.train_window, 120);
        assert_eq!(wf.test_window, 30);
        assert_eq!(wf.retrain_frequency, 10);

        let bt = config.backtest_config().unwrap();
        assert_eq!(bt.strategy, PositionStrategy::Continuous { scale: 25.0 });
        assert_eq!(config.trainer().unwrap().name(), "logistic");
    }

    #[test]
    fn test_invalid_settings() {
        let mut config = EngineFileConfig::default();
        config.model.trainer = "logistic".to_string();
        assert!(config.trainer().is_err());

        let mut config = EngineFileConfig::default();
        config.features.preset = "huge".to_string();
        assert!(config.feature_config().is_err());

        let mut config = EngineFileConfig::default();
        config.split.test_fraction = 0.95;
        assert!(config.splitter().is_err());

        let mut config = EngineFileConfig::default();
        config.target.horizon = 0;
        assert!(config.horizon().is_err());

        let mut config = EngineFileConfig::default();
        config.backtest.strategy = "martingale".to_string();
        assert!(config.backtest_config().is_err());
    }

    #[test]
    fn test_save_config() {
        let mut config = EngineFileConfig::default();
        config.data.prices = Some("prices.csv".to_string());
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = EngineFileConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_example_config_parses() {
        let example = EngineFileConfig::example();
        let config: EngineFileConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.data.prices.as_deref(), Some("data/btc_daily.csv"));
        assert!(config.feature_config().is_ok());
        assert!(config.trainer().is_ok());
        assert_eq!(config.rank_metric().unwrap(), RankMetric::Mae);
    }
}
