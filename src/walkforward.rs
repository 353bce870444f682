//! Walk-forward validation of predictive models.
//!
//! A fixed-length training window slides over a labeled dataset. At every
//! step a fresh model is fitted on the training window and evaluated on the
//! rows that immediately follow it; the out-of-sample predictions from all
//! folds are stitched into one chronological stream for simulation.
//!
//! Windows that are too small are recorded as skips, and a fold whose
//! trainer or model fails is recorded with its cause. Neither aborts the run.

use crate::analytics::{directional_accuracy, mean_absolute_error, root_mean_squared_error};
use crate::error::{Result, WalkForwardError};
use crate::features::Dataset;
use crate::indicators::{mean, sample_std};
use crate::model::{Model, Trainer};
use crate::split::{rolling_windows, Window};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Rows in each training window.
    pub train_window: usize,
    /// Rows in each test window.
    pub test_window: usize,
    /// Rows the window advances between retrains.
    pub retrain_frequency: usize,
    /// Smallest usable training window.
    pub min_train_size: usize,
    /// Smallest usable test window.
    pub min_test_size: usize,
    /// Keep each fold's fitted model in the result.
    pub retain_models: bool,
    /// Run folds on the rayon thread pool.
    pub parallel: bool,
    /// Show a progress bar over folds.
    pub show_progress: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_window: 180,
            test_window: 30,
            retrain_frequency: 30,
            min_train_size: 50,
            min_test_size: 5,
            retain_models: false,
            parallel: false,
            show_progress: false,
        }
    }
}

impl WalkForwardConfig {
    /// Create a config with the given window sizes and default minimums.
    pub fn new(train_window: usize, test_window: usize, retrain_frequency: usize) -> Self {
        Self {
            train_window,
            test_window,
            retrain_frequency,
            ..Default::default()
        }
    }

    pub fn with_min_sizes(mut self, min_train_size: usize, min_test_size: usize) -> Self {
        self.min_train_size = min_train_size;
        self.min_test_size = min_test_size;
        self
    }

    pub fn with_retained_models(mut self) -> Self {
        self.retain_models = true;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Reject window settings that cannot produce a run.
    pub fn validate(&self) -> Result<()> {
        if self.train_window == 0 || self.test_window == 0 || self.retrain_frequency == 0 {
            return Err(WalkForwardError::config(format!(
                "window sizes must be positive (train {}, test {}, retrain every {})",
                self.train_window, self.test_window, self.retrain_frequency
            )));
        }
        if self.min_train_size == 0 || self.min_test_size == 0 {
            return Err(WalkForwardError::config(
                "min_train_size and min_test_size must be positive",
            ));
        }
        if self.train_window < self.min_train_size || self.test_window < self.min_test_size {
            warn!(
                "Windows (train {}, test {}) are below the minimums ({}, {}); every window will be skipped",
                self.train_window, self.test_window, self.min_train_size, self.min_test_size
            );
        }
        Ok(())
    }

    /// Upper bound on the number of windows for `n` rows.
    pub fn max_windows(&self, n: usize) -> usize {
        if n < self.train_window + self.test_window || self.retrain_frequency == 0 {
            return 0;
        }
        (n - self.train_window - self.test_window) / self.retrain_frequency + 1
    }
}

/// Cooperative cancellation flag shared with a running analysis.
///
/// The analyzer checks it before starting each fold; a fold already in
/// progress always completes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Phases of the per-run state machine, logged at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldPhase {
    Init,
    FoldReady,
    Training,
    Evaluating,
    Advancing,
    Done,
}

fn enter(phase: FoldPhase, fold: usize) {
    trace!(?phase, fold, "walk-forward phase");
}

/// Diagnostics for one completed fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldDiagnostics {
    /// Position of the window in the plan.
    pub fold: usize,
    pub window: Window,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub mae: f64,
    pub rmse: f64,
    pub directional_accuracy: f64,
}

/// Why a planned window produced no fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    TrainTooSmall { rows: usize, min: usize },
    TestTooSmall { rows: usize, min: usize },
    Failed { cause: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TrainTooSmall { rows, min } => {
                write!(f, "training window has {} rows, minimum {}", rows, min)
            }
            SkipReason::TestTooSmall { rows, min } => {
                write!(f, "test window has {} rows, minimum {}", rows, min)
            }
            SkipReason::Failed { cause } => write!(f, "{}", cause),
        }
    }
}

/// A planned window that did not become a fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub fold: usize,
    pub window: Window,
    pub reason: SkipReason,
}

/// One out-of-sample prediction in the stitched stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub timestamp: DateTime<Utc>,
    /// Close at the timestamp.
    pub price: f64,
    /// Realized target.
    pub actual: f64,
    pub predicted: f64,
    /// Fold that produced the prediction.
    pub fold: usize,
}

/// Result of a walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub config: WalkForwardConfig,
    pub trainer: String,
    /// Rows in the input dataset.
    pub total_rows: usize,
    /// Completed folds, ordered by test start.
    pub folds: Vec<FoldDiagnostics>,
    pub skipped: Vec<SkippedWindow>,
    /// Chronological, non-overlapping out-of-sample stream.
    pub predictions: Vec<PredictionPoint>,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Fitted models by fold, kept only with `retain_models`.
    #[serde(skip)]
    pub models: Vec<(usize, Arc<dyn Model>)>,
}

impl WalkForwardResult {
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    pub fn has_folds(&self) -> bool {
        !self.folds.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.predictions.iter().map(|p| p.timestamp).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.price).collect()
    }

    pub fn actuals(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.actual).collect()
    }

    pub fn predicted(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.predicted).collect()
    }

    /// Mean of per-fold MAE (0 without folds).
    pub fn mean_mae(&self) -> f64 {
        mean(&self.folds.iter().map(|f| f.mae).collect::<Vec<_>>())
    }

    /// Sample std of per-fold MAE.
    pub fn std_mae(&self) -> f64 {
        sample_std(&self.folds.iter().map(|f| f.mae).collect::<Vec<_>>())
    }

    pub fn mean_rmse(&self) -> f64 {
        mean(&self.folds.iter().map(|f| f.rmse).collect::<Vec<_>>())
    }

    pub fn std_rmse(&self) -> f64 {
        sample_std(&self.folds.iter().map(|f| f.rmse).collect::<Vec<_>>())
    }

    /// Model retained for a fold, if any.
    pub fn model(&self, fold: usize) -> Option<&Arc<dyn Model>> {
        self.models.iter().find(|(f, _)| *f == fold).map(|(_, m)| m)
    }

    /// Human-readable reasons to distrust the aggregate numbers.
    pub fn stability_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.folds.is_empty() {
            warnings.push(format!(
                "No folds completed over {} rows (train {}, test {})",
                self.total_rows, self.config.train_window, self.config.test_window
            ));
        } else if self.folds.len() < 3 {
            warnings.push(format!(
                "Only {} fold(s) completed; estimates are unstable",
                self.folds.len()
            ));
        }
        if !self.skipped.is_empty() {
            let failed = self
                .skipped
                .iter()
                .filter(|s| matches!(s.reason, SkipReason::Failed { .. }))
                .count();
            warnings.push(format!(
                "{} window(s) skipped ({} failed, {} undersized)",
                self.skipped.len(),
                failed,
                self.skipped.len() - failed
            ));
        }
        if self.cancelled {
            warnings.push("Run was cancelled before all windows were processed".to_string());
        }
        warnings
    }

    /// At least `min_folds` folds, and fold RMSE dispersion (std / mean) no
    /// higher than `max_rmse_dispersion`.
    pub fn is_robust(&self, min_folds: usize, max_rmse_dispersion: f64) -> bool {
        if self.folds.len() < min_folds.max(1) {
            return false;
        }
        let mean_rmse = self.mean_rmse();
        let dispersion = if mean_rmse > 0.0 {
            self.std_rmse() / mean_rmse
        } else {
            0.0
        };
        dispersion <= max_rmse_dispersion
    }

    /// Get a summary of the walk-forward analysis.
    pub fn summary(&self) -> String {
        format!(
            "Walk-Forward Analysis Summary:\n\
             Trainer: {}\n\
             Folds: {} completed, {} skipped\n\
             Predictions: {}\n\
             Fold MAE: {:.6} (std {:.6})\n\
             Fold RMSE: {:.6} (std {:.6})",
            self.trainer,
            self.folds.len(),
            self.skipped.len(),
            self.predictions.len(),
            self.mean_mae(),
            self.std_mae(),
            self.mean_rmse(),
            self.std_rmse()
        )
    }
}

struct FoldOutcome {
    diagnostics: FoldDiagnostics,
    predictions: Vec<f64>,
    model: Option<Arc<dyn Model>>,
}

/// Walk-forward analyzer.
#[derive(Debug, Clone, Default)]
pub struct WalkForwardAnalyzer {
    config: WalkForwardConfig,
    cancel: Option<CancellationToken>,
}

impl WalkForwardAnalyzer {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Stop advancing once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Windows the run would visit over `n` rows.
    pub fn plan(&self, n: usize) -> Vec<Window> {
        rolling_windows(
            n,
            self.config.train_window,
            self.config.test_window,
            self.config.retrain_frequency,
        )
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |c| c.is_cancelled())
    }

    fn check_size(&self, window: &Window) -> Option<SkipReason> {
        if window.train_len() < self.config.min_train_size {
            Some(SkipReason::TrainTooSmall {
                rows: window.train_len(),
                min: self.config.min_train_size,
            })
        } else if window.test_len() < self.config.min_test_size {
            Some(SkipReason::TestTooSmall {
                rows: window.test_len(),
                min: self.config.min_test_size,
            })
        } else {
            None
        }
    }

    /// Run walk-forward validation of `trainer` over `dataset`.
    ///
    /// Only an invalid configuration is an error. Too little data yields a
    /// result with zero folds.
    pub fn run(&self, dataset: &Dataset, trainer: &dyn Trainer) -> Result<WalkForwardResult> {
        self.config.validate()?;
        enter(FoldPhase::Init, 0);

        let windows = self.plan(dataset.len());
        info!(
            "Running walk-forward with {} windows over {} rows (trainer: {})",
            windows.len(),
            dataset.len(),
            trainer.name()
        );

        let mut skipped = Vec::new();
        let mut ready = Vec::with_capacity(windows.len());
        for (fold, window) in windows.into_iter().enumerate() {
            match self.check_size(&window) {
                Some(reason) => {
                    warn!("Window {} skipped: {}", fold, reason);
                    skipped.push(SkippedWindow {
                        fold,
                        window,
                        reason,
                    });
                }
                None => ready.push((fold, window)),
            }
        }

        let progress = if self.config.show_progress && !ready.is_empty() {
            let pb = ProgressBar::new(ready.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] fold {pos}/{len} ({eta})")
                    .map(|s| s.progress_chars("#>-"))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(pb)
        } else {
            None
        };

        let attempt = |fold: usize, window: &Window| -> Option<(usize, Window, Result<FoldOutcome>)> {
            if self.is_cancelled() {
                return None;
            }
            enter(FoldPhase::FoldReady, fold);
            let outcome = self.run_fold(fold, window, dataset, trainer);
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            enter(FoldPhase::Advancing, fold);
            Some((fold, *window, outcome))
        };

        let attempted: Vec<(usize, Window, Result<FoldOutcome>)> = if self.config.parallel {
            ready
                .par_iter()
                .filter_map(|(fold, window)| attempt(*fold, window))
                .collect()
        } else {
            let mut out = Vec::with_capacity(ready.len());
            for (fold, window) in &ready {
                match attempt(*fold, window) {
                    Some(r) => out.push(r),
                    None => break,
                }
            }
            out
        };
        let cancelled = attempted.len() < ready.len();
        if cancelled {
            info!(
                "Walk-forward cancelled after {} of {} folds",
                attempted.len(),
                ready.len()
            );
        }

        let mut outcomes = Vec::with_capacity(attempted.len());
        for (fold, window, outcome) in attempted {
            match outcome {
                Ok(o) => outcomes.push(o),
                Err(e) => {
                    let err = WalkForwardError::FoldFailed {
                        fold,
                        cause: e.to_string(),
                    };
                    warn!("{}", err);
                    skipped.push(SkippedWindow {
                        fold,
                        window,
                        reason: SkipReason::Failed {
                            cause: e.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        // Completion order is arbitrary in parallel mode.
        outcomes.sort_by_key(|o| o.diagnostics.window.test_start);
        skipped.sort_by_key(|s| s.fold);

        let predictions = stitch(&outcomes, dataset);
        enter(FoldPhase::Done, outcomes.len());

        if outcomes.is_empty() {
            warn!(
                "Walk-forward produced no folds ({} windows skipped)",
                skipped.len()
            );
        } else {
            info!(
                "Walk-forward complete: {} folds, {} skipped, {} predictions",
                outcomes.len(),
                skipped.len(),
                predictions.len()
            );
        }

        let mut folds = Vec::with_capacity(outcomes.len());
        let mut models = Vec::new();
        for outcome in outcomes {
            if let Some(model) = outcome.model {
                models.push((outcome.diagnostics.fold, model));
            }
            folds.push(outcome.diagnostics);
        }

        Ok(WalkForwardResult {
            config: self.config.clone(),
            trainer: trainer.name().to_string(),
            total_rows: dataset.len(),
            folds,
            skipped,
            predictions,
            cancelled,
            models,
        })
    }

    fn run_fold(
        &self,
        fold: usize,
        window: &Window,
        dataset: &Dataset,
        trainer: &dyn Trainer,
    ) -> Result<FoldOutcome> {
        enter(FoldPhase::Training, fold);
        let x_train = dataset.feature_matrix(window.train_range());
        let y_train = dataset.targets(window.train_range());
        let model = trainer.fit(&x_train, y_train)?;

        enter(FoldPhase::Evaluating, fold);
        let x_test = dataset.feature_matrix(window.test_range());
        let actual = dataset.targets(window.test_range());
        let predictions = model.predict(&x_test)?;
        if predictions.len() != actual.len() {
            return Err(WalkForwardError::model(format!(
                "model returned {} predictions for {} rows",
                predictions.len(),
                actual.len()
            )));
        }
        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(WalkForwardError::model("model returned non-finite predictions"));
        }

        let diagnostics = FoldDiagnostics {
            fold,
            window: *window,
            train_start: dataset.timestamps[window.train_start],
            train_end: dataset.timestamps[window.train_end - 1],
            test_start: dataset.timestamps[window.test_start],
            test_end: dataset.timestamps[window.test_end - 1],
            train_rows: window.train_len(),
            test_rows: window.test_len(),
            mae: mean_absolute_error(actual, &predictions),
            rmse: root_mean_squared_error(actual, &predictions),
            directional_accuracy: directional_accuracy(actual, &predictions),
        };
        debug!(
            "Fold {}: train [{}, {}) test [{}, {}) MAE {:.6} RMSE {:.6}",
            fold,
            window.train_start,
            window.train_end,
            window.test_start,
            window.test_end,
            diagnostics.mae,
            diagnostics.rmse
        );

        Ok(FoldOutcome {
            diagnostics,
            predictions,
            model: if self.config.retain_models {
                Some(Arc::from(model))
            } else {
                None
            },
        })
    }
}

/// Concatenate fold predictions into one stream.
///
/// Where test windows overlap, a fold's rows stop at the next fold's test
/// start, so each timestamp comes from the most recently trained fold.
fn stitch(outcomes: &[FoldOutcome], dataset: &Dataset) -> Vec<PredictionPoint> {
    let mut stream = Vec::new();
    for (k, outcome) in outcomes.iter().enumerate() {
        let window = &outcome.diagnostics.window;
        let end = outcomes
            .get(k + 1)
            .map(|next| next.diagnostics.window.test_start.min(window.test_end))
            .unwrap_or(window.test_end);
        for (offset, row) in (window.test_start..end).enumerate() {
            stream.push(PredictionPoint {
                timestamp: dataset.timestamps[row],
                price: dataset.closes[row],
                actual: dataset.targets[row],
                predicted: outcome.predictions[offset],
                fold: outcome.diagnostics.fold,
            });
        }
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMatrix;
    use crate::model::{FnTrainer, MeanModel, MeanTrainer};
    use crate::types::TargetKind;
    use std::sync::atomic::AtomicUsize;
    use chrono::TimeZone;

    /// Dataset with one feature equal to the row index and target sin(i).
    fn create_test_dataset(n: usize) -> Dataset {
        let timestamps = (0..n)
            .map(|i| {
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64)
            })
            .collect();
        Dataset {
            feature_names: vec!["i".to_string()],
            timestamps,
            closes: (0..n).map(|i| 100.0 + i as f64).collect(),
            features: (0..n).map(|i| vec![i as f64]).collect(),
            targets: (0..n).map(|i| (i as f64 * 0.3).sin() / 100.0).collect(),
            target_name: "target_return_1".to_string(),
            kind: TargetKind::Regression,
            horizon: 1,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(WalkForwardConfig::default().validate().is_ok());
        assert!(WalkForwardConfig::new(0, 30, 30).validate().is_err());
        assert!(WalkForwardConfig::new(180, 30, 0).validate().is_err());
        assert!(WalkForwardConfig::default()
            .with_min_sizes(0, 5)
            .validate()
            .is_err());
    }

    #[test]
    fn test_max_windows() {
        let config = WalkForwardConfig::default();
        assert_eq!(config.max_windows(379), 6);
        assert_eq!(config.max_windows(209), 0);
    }

    #[test]
    fn test_folds_and_stream() {
        let dataset = create_test_dataset(300);
        let analyzer = WalkForwardAnalyzer::new(WalkForwardConfig::new(100, 20, 20));
        let result = analyzer.run(&dataset, &MeanTrainer).unwrap();

        assert_eq!(result.n_folds(), 10);
        assert!(result.skipped.is_empty());
        assert_eq!(result.predictions.len(), 200);
        for fold in &result.folds {
            assert_eq!(fold.window.train_end, fold.window.test_start);
            assert_eq!(fold.train_rows, 100);
        }
        for pair in result.predictions.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        assert_eq!(result.predictions[0].timestamp, dataset.timestamps[100]);
        assert!(result.models.is_empty());
    }

    #[test]
    fn test_too_little_data_yields_zero_folds() {
        let dataset = create_test_dataset(100);
        let analyzer = WalkForwardAnalyzer::new(WalkForwardConfig::default());
        let result = analyzer.run(&dataset, &MeanTrainer).unwrap();

        assert!(!result.has_folds());
        assert!(result.predictions.is_empty());
        assert!(result.stability_warnings()[0].starts_with("No folds"));
        assert_eq!(result.mean_mae(), 0.0);
    }

    #[test]
    fn test_undersized_windows_are_skipped() {
        let dataset = create_test_dataset(200);
        let config = WalkForwardConfig::new(40, 20, 20).with_min_sizes(50, 5);
        let result = WalkForwardAnalyzer::new(config).run(&dataset, &MeanTrainer).unwrap();

        assert_eq!(result.n_folds(), 0);
        assert_eq!(result.skipped.len(), 8);
        assert!(matches!(
            result.skipped[0].reason,
            SkipReason::TrainTooSmall { rows: 40, min: 50 }
        ));
    }

    #[test]
    fn test_failing_fold_is_recorded() {
        let dataset = create_test_dataset(300);
        let trainer = FnTrainer::new("flaky", |x: &FeatureMatrix<'_>, _y: &[f64]| {
            // Fails on the window whose training data starts at row 40.
            if x.row(0)[0] == 40.0 {
                Err(WalkForwardError::model("singular matrix"))
            } else {
                Ok(Box::new(MeanModel::new(0.0)) as Box<dyn Model>)
            }
        });
        let config = WalkForwardConfig::new(100, 20, 20);
        let result = WalkForwardAnalyzer::new(config).run(&dataset, &trainer).unwrap();

        assert_eq!(result.n_folds(), 9);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].fold, 2);
        match &result.skipped[0].reason {
            SkipReason::Failed { cause } => assert!(cause.contains("singular matrix")),
            other => panic!("unexpected reason {:?}", other),
        }
        // The failed window leaves a gap rather than a duplicate.
        assert_eq!(result.predictions.len(), 180);
    }

    #[test]
    fn test_overlapping_windows_prefer_latest_fold() {
        let dataset = create_test_dataset(200);
        let config = WalkForwardConfig::new(100, 30, 10);
        let result = WalkForwardAnalyzer::new(config).run(&dataset, &MeanTrainer).unwrap();

        assert_eq!(result.n_folds(), 8);
        // 7 folds contribute 10 rows each, the last one its full 30
        assert_eq!(result.predictions.len(), 100);
        for pair in result.predictions.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert!(pair[0].fold <= pair[1].fold);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dataset = create_test_dataset(400);
        let config = WalkForwardConfig::new(120, 25, 25);
        let sequential = WalkForwardAnalyzer::new(config.clone())
            .run(&dataset, &MeanTrainer)
            .unwrap();
        let parallel = WalkForwardAnalyzer::new(config.with_parallel(true))
            .run(&dataset, &MeanTrainer)
            .unwrap();

        assert_eq!(sequential.folds, parallel.folds);
        assert_eq!(sequential.predictions, parallel.predictions);
    }

    #[test]
    fn test_retained_models() {
        let dataset = create_test_dataset(200);
        let config = WalkForwardConfig::new(100, 50, 50).with_retained_models();
        let result = WalkForwardAnalyzer::new(config).run(&dataset, &MeanTrainer).unwrap();
        assert_eq!(result.models.len(), 2);
        assert!(result.model(0).is_some());
        assert!(result.model(7).is_none());
    }

    #[test]
    fn test_cancelled_before_start() {
        let dataset = create_test_dataset(300);
        let token = CancellationToken::new();
        token.cancel();
        let analyzer = WalkForwardAnalyzer::new(WalkForwardConfig::new(100, 20, 20))
            .with_cancellation(token);
        let result = analyzer.run(&dataset, &MeanTrainer).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.n_folds(), 0);
    }

    #[test]
    fn test_cancel_during_fold_stops_advancing() {
        let dataset = create_test_dataset(300);
        let token = CancellationToken::new();
        let fits = AtomicUsize::new(0);
        let trainer = FnTrainer::new("cancelling", |x: &FeatureMatrix<'_>, _y: &[f64]| {
            fits.fetch_add(1, Ordering::SeqCst);
            // Training for fold 2 starts at row 40.
            if x.row(0)[0] == 40.0 {
                token.cancel();
            }
            Ok(Box::new(MeanModel::new(0.0)) as Box<dyn Model>)
        });
        let analyzer = WalkForwardAnalyzer::new(WalkForwardConfig::new(100, 20, 20))
            .with_cancellation(token.clone());
        let result = analyzer.run(&dataset, &trainer).unwrap();

        assert!(result.cancelled);
        assert_eq!(fits.load(Ordering::SeqCst), 3);
        assert_eq!(result.folds.iter().map(|f| f.fold).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(result.skipped.is_empty());
        assert_eq!(result.predictions.len(), 60);
        assert!(result
            .stability_warnings()
            .iter()
            .any(|w| w.contains("cancelled")));
    }

    #[test]
    fn test_failing_fold_in_parallel_spares_siblings() {
        let dataset = create_test_dataset(300);
        let trainer = FnTrainer::new("flaky", |x: &FeatureMatrix<'_>, _y: &[f64]| {
            if x.row(0)[0] == 40.0 {
                Err(WalkForwardError::model("singular matrix"))
            } else {
                Ok(Box::new(MeanModel::new(0.0)) as Box<dyn Model>)
            }
        });
        let config = WalkForwardConfig::new(100, 20, 20);
        let sequential = WalkForwardAnalyzer::new(config.clone())
            .run(&dataset, &trainer)
            .unwrap();
        let parallel = WalkForwardAnalyzer::new(config.with_parallel(true))
            .run(&dataset, &trainer)
            .unwrap();

        assert_eq!(parallel.n_folds(), 9);
        assert_eq!(parallel.skipped.len(), 1);
        assert_eq!(parallel.skipped[0].fold, 2);
        assert!(matches!(parallel.skipped[0].reason, SkipReason::Failed { .. }));
        assert_eq!(parallel.predictions.len(), 180);
        assert!(!parallel.cancelled);
        assert_eq!(sequential.folds, parallel.folds);
        assert_eq!(sequential.predictions, parallel.predictions);
    }

    #[test]
    fn test_summary() {
        let dataset = create_test_dataset(300);
        let result = WalkForwardAnalyzer::new(WalkForwardConfig::new(100, 20, 20))
            .run(&dataset, &MeanTrainer)
            .unwrap();
        let summary = result.summary();
        assert!(summary.contains("Walk-Forward Analysis"));
        assert!(summary.contains("10 completed"));
        assert!(result.stability_warnings().is_empty());
        assert!(result.is_robust(3, f64::INFINITY));
    }
}
