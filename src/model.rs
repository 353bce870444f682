//! Trainer interface and built-in models.
//!
//! The walk-forward orchestrator only ever sees [`Trainer`] and [`Model`]:
//! "given training features and labels, return a fitted predictor". Any
//! algorithm family plugs in behind these two traits. The built-in trainers
//! here are small `ndarray` baselines used by the command line and by
//! [`ModelComparator`].

use crate::analytics::{
    directional_accuracy, mean_absolute_error, mean_absolute_percentage_error, r_squared,
    root_mean_squared_error,
};
use crate::error::{Result, WalkForwardError};
use crate::features::{Dataset, FeatureMatrix};
use crate::types::TargetKind;
use ndarray::{s, Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

/// A fitted predictor.
pub trait Model: Send + Sync + fmt::Debug {
    /// Predict one value per row of `x`.
    fn predict(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>>;
}

/// Something that can fit a fresh [`Model`] from features and labels.
///
/// Every call to `fit` must return an independent model; the orchestrator
/// calls it once per fold, possibly from several threads.
pub trait Trainer: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Fit a new model on `x` and `y`.
    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>>;
}

/// Adapts a closure into a [`Trainer`].
///
/// ```
/// use cryptowalk::model::{FnTrainer, MeanModel, Model, Trainer};
///
/// let trainer = FnTrainer::new("zero", |_x, _y| Ok(Box::new(MeanModel::new(0.0)) as Box<dyn Model>));
/// assert_eq!(trainer.name(), "zero");
/// ```
pub struct FnTrainer<F> {
    name: String,
    fit_fn: F,
}

impl<F> FnTrainer<F>
where
    F: Fn(&FeatureMatrix<'_>, &[f64]) -> Result<Box<dyn Model>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, fit_fn: F) -> Self {
        Self {
            name: name.into(),
            fit_fn,
        }
    }
}

impl<F> Trainer for FnTrainer<F>
where
    F: Fn(&FeatureMatrix<'_>, &[f64]) -> Result<Box<dyn Model>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>> {
        (self.fit_fn)(x, y)
    }
}

fn check_training_input(x: &FeatureMatrix<'_>, y: &[f64]) -> Result<()> {
    if x.len() != y.len() {
        return Err(WalkForwardError::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(WalkForwardError::model("empty training set"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(WalkForwardError::model("non-finite label in training set"));
    }
    if x.rows().iter().any(|r| r.iter().any(|v| !v.is_finite())) {
        return Err(WalkForwardError::model("non-finite feature in training set"));
    }
    Ok(())
}

fn check_width(x: &FeatureMatrix<'_>, expected: usize) -> Result<()> {
    match x.rows().iter().find(|r| r.len() != expected) {
        Some(row) => Err(WalkForwardError::model(format!(
            "model expects {} features, got {}",
            expected,
            row.len()
        ))),
        None => Ok(()),
    }
}

/// Copy a borrowed feature matrix into an `n x width` array.
fn to_array(x: &FeatureMatrix<'_>, width: usize) -> Result<Array2<f64>> {
    check_width(x, width)?;
    let flat: Vec<f64> = x.rows().iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((x.len(), width), flat)
        .map_err(|e| WalkForwardError::model(format!("feature matrix shape: {}", e)))
}

fn training_width(x: &FeatureMatrix<'_>) -> usize {
    x.rows().first().map(|r| r.len()).unwrap_or(0)
}

/// Per-column z-score scaling fitted on training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    /// Fit column means and population standard deviations.
    ///
    /// Constant columns get a scale of 1.
    pub fn fit(x: &Array2<f64>) -> Self {
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < 1e-12 { 1.0 } else { s });
        Self { means, scales }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.scales
    }
}

/// Predicts a constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanModel {
    value: f64,
}

impl MeanModel {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Model for MeanModel {
    fn predict(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>> {
        Ok(vec![self.value; x.len()])
    }
}

/// Baseline that predicts the training-label mean.
#[derive(Debug, Clone, Default)]
pub struct MeanTrainer;

impl Trainer for MeanTrainer {
    fn name(&self) -> &str {
        "mean"
    }

    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>> {
        check_training_input(x, y)?;
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        Ok(Box::new(MeanModel::new(mean)))
    }
}

/// Solve the symmetric positive-definite system `a * w = b` by Cholesky
/// decomposition.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum = l.row(i).slice(s![..j]).dot(&l.row(j).slice(s![..j]));
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 {
                    return Err(WalkForwardError::model("matrix not positive definite"));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum = l.row(i).slice(s![..i]).dot(&z.slice(s![..i]));
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L' w = z
    let mut w = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum = l.column(i).slice(s![i + 1..]).dot(&w.slice(s![i + 1..]));
        w[i] = (z[i] - sum) / l[[i, i]];
    }
    Ok(w)
}

/// Linear model on standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    scaler: Standardizer,
    weights: Array1<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    fn scores(&self, x: &FeatureMatrix<'_>) -> Result<Array1<f64>> {
        let z = self.scaler.transform(&to_array(x, self.weights.len())?);
        Ok(z.dot(&self.weights) + self.intercept)
    }
}

impl Model for LinearModel {
    fn predict(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>> {
        Ok(self.scores(x)?.to_vec())
    }
}

/// Ridge regression on standardized features.
#[derive(Debug, Clone)]
pub struct RidgeTrainer {
    alpha: f64,
}

impl Default for RidgeTrainer {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl RidgeTrainer {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Trainer for RidgeTrainer {
    fn name(&self) -> &str {
        "ridge"
    }

    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>> {
        check_training_input(x, y)?;
        if self.alpha.is_nan() || self.alpha < 0.0 {
            return Err(WalkForwardError::model("ridge alpha must be non-negative"));
        }

        let raw = to_array(x, training_width(x))?;
        let scaler = Standardizer::fit(&raw);
        let z = scaler.transform(&raw);
        let y = Array1::from(y.to_vec());
        let y_mean = y.mean().unwrap_or(0.0);

        // (Z'Z + alpha I) w = Z'(y - mean)
        let mut gram = z.t().dot(&z);
        gram.diag_mut().mapv_inplace(|d| d + self.alpha);
        let rhs = z.t().dot(&(&y - y_mean));

        let weights = cholesky_solve(&gram, &rhs)?;
        debug!("Fitted ridge model on {} rows x {} features", z.nrows(), z.ncols());

        Ok(Box::new(LinearModel {
            scaler,
            weights,
            intercept: y_mean,
        }))
    }
}

/// Logistic regression emitting class labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    linear: LinearModel,
    threshold: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticModel {
    /// Probability of the positive class for each row.
    pub fn predict_proba(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>> {
        Ok(self.linear.scores(x)?.mapv(sigmoid).to_vec())
    }
}

impl Model for LogisticModel {
    fn predict(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| if p > self.threshold { 1.0 } else { 0.0 })
            .collect())
    }
}

/// L2-regularized logistic regression fitted by full-batch gradient descent.
///
/// Labels must be 0 or 1.
#[derive(Debug, Clone)]
pub struct LogisticTrainer {
    pub l2: f64,
    pub learning_rate: f64,
    pub epochs: usize,
}

impl Default for LogisticTrainer {
    fn default() -> Self {
        Self {
            l2: 1e-3,
            learning_rate: 0.1,
            epochs: 300,
        }
    }
}

impl LogisticTrainer {
    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }
}

impl Trainer for LogisticTrainer {
    fn name(&self) -> &str {
        "logistic"
    }

    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>> {
        check_training_input(x, y)?;
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(WalkForwardError::model(
                "logistic regression needs 0/1 labels; use a direction target",
            ));
        }

        let raw = to_array(x, training_width(x))?;
        let scaler = Standardizer::fit(&raw);
        let z = scaler.transform(&raw);
        let y = Array1::from(y.to_vec());
        let n = z.nrows() as f64;

        let mut weights = Array1::<f64>::zeros(z.ncols());
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let errors = (z.dot(&weights) + bias).mapv(sigmoid) - &y;
            let grad = z.t().dot(&errors) / n + &weights * self.l2;
            weights.scaled_add(-self.learning_rate, &grad);
            bias -= self.learning_rate * errors.sum() / n;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(WalkForwardError::model("logistic regression diverged"));
        }

        Ok(Box::new(LogisticModel {
            linear: LinearModel {
                scaler,
                weights,
                intercept: bias,
            },
            threshold: 0.5,
        }))
    }
}

/// Averages member predictions, or takes a majority vote over class labels.
#[derive(Debug)]
pub struct EnsembleModel {
    members: Vec<Box<dyn Model>>,
    majority_vote: bool,
}

impl Model for EnsembleModel {
    fn predict(&self, x: &FeatureMatrix<'_>) -> Result<Vec<f64>> {
        let mut sum = vec![0.0; x.len()];
        for member in &self.members {
            let preds = member.predict(x)?;
            if preds.len() != sum.len() {
                return Err(WalkForwardError::model(format!(
                    "ensemble member returned {} predictions for {} rows",
                    preds.len(),
                    sum.len()
                )));
            }
            for (s, p) in sum.iter_mut().zip(preds) {
                *s += p;
            }
        }
        let k = self.members.len() as f64;
        Ok(sum
            .into_iter()
            .map(|s| {
                let avg = s / k;
                if self.majority_vote {
                    if avg >= 0.5 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    avg
                }
            })
            .collect())
    }
}

/// Voting ensemble over member trainers.
pub struct EnsembleTrainer {
    members: Vec<Box<dyn Trainer>>,
    majority_vote: bool,
}

impl EnsembleTrainer {
    /// Average the members' predictions (regression).
    pub fn voting(members: Vec<Box<dyn Trainer>>) -> Self {
        Self {
            members,
            majority_vote: false,
        }
    }

    /// Majority vote over 0/1 labels (classification).
    pub fn majority(members: Vec<Box<dyn Trainer>>) -> Self {
        Self {
            members,
            majority_vote: true,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Trainer for EnsembleTrainer {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn fit(&self, x: &FeatureMatrix<'_>, y: &[f64]) -> Result<Box<dyn Model>> {
        if self.members.is_empty() {
            return Err(WalkForwardError::model("ensemble has no member trainers"));
        }
        let members = self
            .members
            .iter()
            .map(|t| {
                t.fit(x, y).map_err(|e| {
                    WalkForwardError::model(format!("ensemble member '{}': {}", t.name(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(EnsembleModel {
            members,
            majority_vote: self.majority_vote,
        }))
    }
}

/// Built-in trainer families selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainerKind {
    Mean,
    #[default]
    Ridge,
    Logistic,
    Ensemble,
}

impl TrainerKind {
    pub const ALL: [TrainerKind; 4] = [
        TrainerKind::Mean,
        TrainerKind::Ridge,
        TrainerKind::Logistic,
        TrainerKind::Ensemble,
    ];

    /// Whether this family can fit the given target kind.
    pub fn supports(&self, target: TargetKind) -> bool {
        !matches!((self, target), (TrainerKind::Logistic, TargetKind::Regression))
    }

    /// Build a trainer; `alpha` is the regularization strength.
    pub fn build(&self, target: TargetKind, alpha: f64) -> Box<dyn Trainer> {
        match self {
            TrainerKind::Mean => Box::new(MeanTrainer),
            TrainerKind::Ridge => Box::new(RidgeTrainer::new(alpha)),
            TrainerKind::Logistic => Box::new(LogisticTrainer::default().with_l2(alpha * 1e-3)),
            TrainerKind::Ensemble => match target {
                TargetKind::Regression => Box::new(EnsembleTrainer::voting(vec![
                    Box::new(RidgeTrainer::new(alpha)),
                    Box::new(RidgeTrainer::new(alpha * 10.0)),
                    Box::new(MeanTrainer),
                ])),
                TargetKind::Classification => Box::new(EnsembleTrainer::majority(vec![
                    Box::new(LogisticTrainer::default().with_l2(alpha * 1e-3)),
                    Box::new(LogisticTrainer::default().with_l2(alpha * 1e-2)),
                    Box::new(LogisticTrainer::default().with_l2(alpha * 1e-1)),
                ])),
            },
        }
    }
}

impl fmt::Display for TrainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrainerKind::Mean => "mean",
            TrainerKind::Ridge => "ridge",
            TrainerKind::Logistic => "logistic",
            TrainerKind::Ensemble => "ensemble",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TrainerKind {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" | "baseline" => Ok(TrainerKind::Mean),
            "ridge" | "linear" => Ok(TrainerKind::Ridge),
            "logistic" => Ok(TrainerKind::Logistic),
            "ensemble" | "voting" => Ok(TrainerKind::Ensemble),
            other => Err(WalkForwardError::config(format!(
                "Unknown model: '{}' (expected mean, ridge, logistic or ensemble)",
                other
            ))),
        }
    }
}

/// Prediction error of a regression model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent; zero actuals use a denominator of 1.
    pub mape: f64,
    pub r2: f64,
    /// Fraction of rows where prediction and actual share a sign.
    pub directional_accuracy: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        check_lengths(actual, predicted)?;
        Ok(Self {
            mae: mean_absolute_error(actual, predicted),
            rmse: root_mean_squared_error(actual, predicted),
            mape: mean_absolute_percentage_error(actual, predicted),
            r2: r_squared(actual, predicted),
            directional_accuracy: directional_accuracy(actual, predicted),
        })
    }
}

/// Quality of 0/1 class predictions, positive class = 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// 0 when nothing was predicted positive.
    pub precision: f64,
    /// 0 when no actual positives exist.
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        check_lengths(actual, predicted)?;
        let (mut tp, mut fp, mut fn_, mut correct) = (0usize, 0usize, 0usize, 0usize);
        for (&a, &p) in actual.iter().zip(predicted) {
            let (a, p) = (a > 0.5, p > 0.5);
            if a == p {
                correct += 1;
            }
            match (a, p) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Ok(Self {
            accuracy: ratio(correct, actual.len()),
            precision,
            recall,
            f1,
        })
    }
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(WalkForwardError::InvalidInput(format!(
            "{} actuals but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(WalkForwardError::InvalidInput(
            "cannot evaluate an empty prediction set".to_string(),
        ));
    }
    Ok(())
}

/// Metric used to rank models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    #[default]
    Mae,
    Rmse,
    Mape,
    R2,
    DirectionalAccuracy,
    Accuracy,
    F1,
}

impl RankMetric {
    pub fn lower_is_better(&self) -> bool {
        matches!(self, RankMetric::Mae | RankMetric::Rmse | RankMetric::Mape)
    }

    /// Value of this metric for a score; classification metrics read 0
    /// when the score has none.
    pub fn value(&self, score: &ModelScore) -> f64 {
        let class = score.classification.unwrap_or_default();
        match self {
            RankMetric::Mae => score.regression.mae,
            RankMetric::Rmse => score.regression.rmse,
            RankMetric::Mape => score.regression.mape,
            RankMetric::R2 => score.regression.r2,
            RankMetric::DirectionalAccuracy => score.regression.directional_accuracy,
            RankMetric::Accuracy => class.accuracy,
            RankMetric::F1 => class.f1,
        }
    }
}

impl FromStr for RankMetric {
    type Err = WalkForwardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "mae" => Ok(RankMetric::Mae),
            "rmse" => Ok(RankMetric::Rmse),
            "mape" => Ok(RankMetric::Mape),
            "r2" => Ok(RankMetric::R2),
            "directional_accuracy" | "direction" => Ok(RankMetric::DirectionalAccuracy),
            "accuracy" => Ok(RankMetric::Accuracy),
            "f1" => Ok(RankMetric::F1),
            other => Err(WalkForwardError::config(format!(
                "Unknown ranking metric: '{}'",
                other
            ))),
        }
    }
}

/// Test-set evaluation of one trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub name: String,
    pub regression: RegressionMetrics,
    pub classification: Option<ClassificationMetrics>,
    pub fit_seconds: f64,
}

/// A trainer that failed during comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFailure {
    pub name: String,
    pub cause: String,
}

/// Ranked comparison of several trainers on one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub rank_by: RankMetric,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Best first.
    pub scores: Vec<ModelScore>,
    pub failures: Vec<ModelFailure>,
}

impl ComparisonReport {
    pub fn best(&self) -> Option<&ModelScore> {
        self.scores.first()
    }
}

/// Trains every registered trainer on the same split and ranks the results.
#[derive(Default)]
pub struct ModelComparator {
    trainers: Vec<Box<dyn Trainer>>,
}

impl ModelComparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trainer(mut self, trainer: Box<dyn Trainer>) -> Self {
        self.trainers.push(trainer);
        self
    }

    pub fn add(&mut self, trainer: Box<dyn Trainer>) {
        self.trainers.push(trainer);
    }

    pub fn len(&self) -> usize {
        self.trainers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trainers.is_empty()
    }

    /// Fit on `train`, evaluate on `test`, rank by `rank_by`.
    ///
    /// A trainer that fails is reported in `failures`; the others still run.
    pub fn compare(
        &self,
        dataset: &Dataset,
        train: Range<usize>,
        test: Range<usize>,
        rank_by: RankMetric,
    ) -> Result<ComparisonReport> {
        if train.is_empty() || test.is_empty() || train.end > dataset.len() || test.end > dataset.len()
        {
            return Err(WalkForwardError::InvalidInput(format!(
                "train {:?} / test {:?} do not fit a dataset of {} rows",
                train,
                test,
                dataset.len()
            )));
        }
        let x_train = dataset.feature_matrix(train.clone());
        let y_train = dataset.targets(train.clone());
        let x_test = dataset.feature_matrix(test.clone());
        let y_test = dataset.targets(test.clone());
        let is_classification = dataset.kind == TargetKind::Classification;

        let outcomes: Vec<std::result::Result<ModelScore, ModelFailure>> = self
            .trainers
            .par_iter()
            .map(|trainer| {
                let start = Instant::now();
                let evaluated = trainer.fit(&x_train, y_train).and_then(|model| {
                    let fit_seconds = start.elapsed().as_secs_f64();
                    let predicted = model.predict(&x_test)?;
                    let regression = RegressionMetrics::compute(y_test, &predicted)?;
                    let classification = if is_classification {
                        Some(ClassificationMetrics::compute(y_test, &predicted)?)
                    } else {
                        None
                    };
                    Ok(ModelScore {
                        name: trainer.name().to_string(),
                        regression,
                        classification,
                        fit_seconds,
                    })
                });
                evaluated.map_err(|e| {
                    warn!("Model '{}' failed: {}", trainer.name(), e);
                    ModelFailure {
                        name: trainer.name().to_string(),
                        cause: e.to_string(),
                    }
                })
            })
            .collect();

        let mut scores = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(score) => scores.push(score),
                Err(failure) => failures.push(failure),
            }
        }

        scores.sort_by(|a, b| {
            let (va, vb) = (rank_by.value(a), rank_by.value(b));
            if rank_by.lower_is_better() {
                va.total_cmp(&vb)
            } else {
                vb.total_cmp(&va)
            }
        });

        Ok(ComparisonReport {
            rank_by,
            train_rows: train.len(),
            test_rows: test.len(),
            scores,
            failures,
        })
    }
}
