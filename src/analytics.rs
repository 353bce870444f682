//! Performance analytics and reporting.
//!
//! Every ratio with a zero or undefined denominator returns 0.0 rather than
//! NaN or infinity. Report construction returns `None` for an empty
//! portfolio.

use crate::backtest::PortfolioState;
use crate::model::{ComparisonReport, RegressionMetrics};
use crate::indicators::{mean, sample_std};
use crate::walkforward::WalkForwardResult;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Periods per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Sign with 0 for zero, so a flat actual only matches a flat prediction.
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn paired(actual: &[f64], predicted: &[f64]) -> usize {
    actual.len().min(predicted.len())
}

/// Mean absolute error over paired values; 0 when empty.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = paired(actual, predicted);
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n as f64
}

/// Root mean squared error over paired values; 0 when empty.
pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = paired(actual, predicted);
    if n == 0 {
        return 0.0;
    }
    (actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n as f64)
        .sqrt()
}

/// Mean absolute percentage error in percent.
///
/// A zero actual uses a denominator of 1.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = paired(actual, predicted);
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| {
            let denom = if *a != 0.0 { *a } else { 1.0 };
            ((a - p) / denom).abs()
        })
        .sum::<f64>()
        / n as f64
        * 100.0
}

/// Coefficient of determination; 0 when the actuals have no variance.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = paired(actual, predicted);
    if n == 0 {
        return 0.0;
    }
    let m = mean(&actual[..n]);
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - m).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Fraction of periods where predicted and actual have the same sign.
pub fn directional_accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = paired(actual, predicted);
    if n == 0 {
        return 0.0;
    }
    let hits = actual
        .iter()
        .zip(predicted)
        .filter(|(a, p)| sign(**a) == sign(**p))
        .count();
    hits as f64 / n as f64
}

/// Total return in percent from a cumulative growth factor.
pub fn total_return_pct(growth: f64) -> f64 {
    (growth - 1.0) * 100.0
}

/// Annualized return in percent: `growth^(252 / periods) - 1`.
///
/// A non-positive growth factor means the capital was wiped out and reports
/// -100%.
pub fn annualized_return_pct(growth: f64, periods: usize) -> f64 {
    if periods == 0 {
        return 0.0;
    }
    if !(growth > 0.0) {
        return -100.0;
    }
    (growth.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0) * 100.0
}

/// Annualized volatility in percent (sample std).
pub fn annualized_volatility_pct(returns: &[f64]) -> f64 {
    sample_std(returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Annualized Sharpe ratio with a zero risk-free rate; 0 when std is 0.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let std = sample_std(returns);
    if std > 0.0 {
        mean(returns) / std * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

/// Annual return over annualized downside deviation.
///
/// The denominator uses only negative returns. Fewer than two of them leave
/// the deviation undefined and the ratio is 0.
pub fn sortino_ratio(returns: &[f64], annual_return_pct: f64) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_dev = sample_std(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
    if downside_dev > 0.0 {
        (annual_return_pct / 100.0) / downside_dev
    } else {
        0.0
    }
}

/// Maximum drawdown in percent, as a value in [-100, 0] for positive series.
pub fn max_drawdown_pct(cumulative: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in cumulative {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.min((value - peak) / peak);
        }
    }
    worst * 100.0
}

/// Annual return over absolute max drawdown; 0 without drawdown.
pub fn calmar_ratio(annual_return_pct: f64, max_drawdown_pct: f64) -> f64 {
    if max_drawdown_pct != 0.0 {
        annual_return_pct / max_drawdown_pct.abs()
    } else {
        0.0
    }
}

/// Win rate in percent over the given trade periods; 0 with no trades.
pub fn win_rate_pct(net_returns: &[f64], trade_periods: &[usize]) -> f64 {
    if trade_periods.is_empty() {
        return 0.0;
    }
    let wins = trade_periods
        .iter()
        .filter(|&&i| net_returns.get(i).map_or(false, |r| *r > 0.0))
        .count();
    wins as f64 / trade_periods.len() as f64 * 100.0
}

/// Sum of gains over absolute sum of losses; 0 when there are no losses.
pub fn profit_factor(net_returns: &[f64]) -> f64 {
    let gains: f64 = net_returns.iter().filter(|r| **r > 0.0).sum();
    let losses: f64 = net_returns.iter().filter(|r| **r < 0.0).sum::<f64>().abs();
    if losses > 0.0 {
        gains / losses
    } else {
        0.0
    }
}

/// Return and risk metrics for one side (strategy or buy-and-hold).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideMetrics {
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
    pub calmar_ratio: f64,
}

impl SideMetrics {
    /// Compute from realized per-period returns and the cumulative growth
    /// series.
    ///
    /// `returns` holds only periods with a prior price, so a series of `n`
    /// periods passes `n - 1` returns. Annualization uses `periods`.
    pub fn compute(returns: &[f64], cumulative: &[f64], periods: usize) -> Self {
        let growth = cumulative.last().copied().unwrap_or(1.0);
        let annual_return_pct = annualized_return_pct(growth, periods);
        let max_drawdown_pct = max_drawdown_pct(cumulative);
        Self {
            total_return_pct: total_return_pct(growth),
            annual_return_pct,
            volatility_pct: annualized_volatility_pct(returns),
            sharpe_ratio: sharpe_ratio(returns),
            sortino_ratio: sortino_ratio(returns, annual_return_pct),
            max_drawdown_pct,
            calmar_ratio: calmar_ratio(annual_return_pct, max_drawdown_pct),
        }
    }
}

fn realized(returns: &[f64]) -> &[f64] {
    returns.get(1..).unwrap_or(&[])
}

/// Performance of a simulated strategy against buy-and-hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub strategy_name: String,
    pub periods: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub initial_capital: f64,
    pub final_value: f64,
    pub final_buy_hold_value: f64,
    pub strategy: SideMetrics,
    pub buy_hold: SideMetrics,
    /// Strategy total return minus buy-and-hold total return, in points.
    pub excess_return_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    /// Transaction costs in currency.
    pub total_costs: f64,
    /// Prediction error, when realized targets were supplied.
    pub prediction: Option<RegressionMetrics>,
    /// Completed folds, when built from a walk-forward run.
    pub n_folds: Option<usize>,
}

impl PerformanceReport {
    /// Compute a report; `None` when the portfolio is empty.
    ///
    /// `actuals` are the realized targets aligned with the portfolio's
    /// predictions.
    pub fn compute(state: &PortfolioState, actuals: Option<&[f64]>) -> Option<Self> {
        let (start_time, end_time) = (state.start_time()?, state.end_time()?);
        let net = state.net_returns();
        let price = state.price_returns();
        let trades = state.trade_periods();
        let winning_trades = trades.iter().filter(|&&i| net[i] > 0.0).count();

        // The first period has no prior price and carries no return.
        let periods = state.len();
        let strategy =
            SideMetrics::compute(realized(&net), &state.cumulative_strategy(), periods);
        let buy_hold =
            SideMetrics::compute(realized(&price), &state.cumulative_buy_hold(), periods);
        let prediction =
            actuals.and_then(|a| RegressionMetrics::compute(a, &state.predictions()).ok());

        Some(Self {
            strategy_name: state.strategy().to_string(),
            periods,
            start_time,
            end_time,
            initial_capital: state.initial_capital(),
            final_value: state.final_value(),
            final_buy_hold_value: state.final_buy_hold_value(),
            excess_return_pct: strategy.total_return_pct - buy_hold.total_return_pct,
            strategy,
            buy_hold,
            total_trades: trades.len(),
            winning_trades,
            win_rate_pct: win_rate_pct(&net, &trades),
            profit_factor: profit_factor(&net),
            total_costs: state.total_costs(),
            prediction,
            n_folds: None,
        })
    }

    /// Report for the stitched stream of a walk-forward run.
    pub fn from_walk_forward(result: &WalkForwardResult, state: &PortfolioState) -> Option<Self> {
        let actuals = result.actuals();
        let mut report = Self::compute(state, Some(&actuals))?;
        report.n_folds = Some(result.n_folds());
        Some(report)
    }

    pub fn beats_buy_and_hold(&self) -> bool {
        self.excess_return_pct > 0.0
    }
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a performance report to stdout.
    pub fn print_report(report: &PerformanceReport) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " BACKTEST RESULTS ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!("  Strategy:        {}", report.strategy_name);
        println!(
            "  Period:          {} to {}",
            report.start_time.format("%Y-%m-%d"),
            report.end_time.format("%Y-%m-%d")
        );
        println!("  Periods:         {}", report.periods);
        if let Some(folds) = report.n_folds {
            println!("  Folds:           {}", folds);
        }
        println!();

        println!("{}", "Performance".bold().underline());
        println!("  Initial Capital: ${:>12.2}", report.initial_capital);
        println!(
            "  Final Value:     ${:>12.2}  {}",
            report.final_value,
            Self::format_pct_change(report.strategy.total_return_pct)
        );
        println!(
            "  Buy & Hold:      ${:>12.2}  {}",
            report.final_buy_hold_value,
            Self::format_pct_change(report.buy_hold.total_return_pct)
        );
        println!(
            "  Excess Return:   {:>12.2}%  {}",
            report.excess_return_pct,
            Self::format_pct_change(report.excess_return_pct)
        );
        let verdict = if report.beats_buy_and_hold() {
            "YES".green().bold()
        } else {
            "NO".red().bold()
        };
        println!("  Beats Buy & Hold: {}", verdict);
        println!();

        Self::print_side_table(report);

        println!("{}", "Trade Statistics".bold().underline());
        println!("  Total Trades:    {:>12}", report.total_trades);
        println!(
            "  Winning Trades:  {:>12}  ({:.1}%)",
            report.winning_trades, report.win_rate_pct
        );
        println!("  Profit Factor:   {:>12.2}", report.profit_factor);
        println!("  Costs:           ${:>11.2}", report.total_costs);
        println!();

        if let Some(p) = &report.prediction {
            println!("{}", "Prediction Error".bold().underline());
            println!("  MAE:             {:>12.6}", p.mae);
            println!("  RMSE:            {:>12.6}", p.rmse);
            println!("  MAPE:            {:>12.2}%", p.mape);
            println!(
                "  Direction:       {:>12.1}%",
                p.directional_accuracy * 100.0
            );
            println!();
        }

        println!("{}", "═".repeat(60).blue());
    }

    fn print_side_table(report: &PerformanceReport) {
        let mut builder = Builder::new();
        builder.push_record(["Metric", "Strategy", "Buy & Hold"]);
        let rows: [(&str, fn(&SideMetrics) -> f64, &str); 7] = [
            ("Total Return", |m| m.total_return_pct, "%"),
            ("Annual Return", |m| m.annual_return_pct, "%"),
            ("Volatility", |m| m.volatility_pct, "%"),
            ("Sharpe", |m| m.sharpe_ratio, ""),
            ("Sortino", |m| m.sortino_ratio, ""),
            ("Max Drawdown", |m| m.max_drawdown_pct, "%"),
            ("Calmar", |m| m.calmar_ratio, ""),
        ];
        for (label, get, unit) in rows {
            builder.push_record([
                label.to_string(),
                format!("{:.2}{}", get(&report.strategy), unit),
                format!("{:.2}{}", get(&report.buy_hold), unit),
            ]);
        }
        println!("{}", builder.build().with(Style::rounded()).to_string());
        println!();
    }

    /// Format percentage change with color.
    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Per-fold diagnostics as a table.
    pub fn fold_table(result: &WalkForwardResult) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Fold", "Train", "Test", "Train Rows", "Test Rows", "MAE", "RMSE", "Direction",
        ]);

        for fold in &result.folds {
            builder.push_record([
                fold.fold.to_string(),
                format!(
                    "{} to {}",
                    fold.train_start.format("%Y-%m-%d"),
                    fold.train_end.format("%Y-%m-%d")
                ),
                format!(
                    "{} to {}",
                    fold.test_start.format("%Y-%m-%d"),
                    fold.test_end.format("%Y-%m-%d")
                ),
                fold.train_rows.to_string(),
                fold.test_rows.to_string(),
                format!("{:.6}", fold.mae),
                format!("{:.6}", fold.rmse),
                format!("{:.1}%", fold.directional_accuracy * 100.0),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print the fold table followed by skips and stability warnings.
    pub fn print_folds(result: &WalkForwardResult) {
        println!("{}", "Walk-Forward Folds".bold().underline());
        println!("{}", Self::fold_table(result));
        for skip in &result.skipped {
            println!(
                "  {} window {} (test rows {}..{}): {}",
                "skipped".yellow(),
                skip.fold,
                skip.window.test_start,
                skip.window.test_end,
                skip.reason
            );
        }
        for warning in result.stability_warnings() {
            println!("  {} {}", "warning:".yellow().bold(), warning);
        }
        println!();
    }

    /// Model comparison as a table, best first.
    pub fn comparison_table(report: &ComparisonReport) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Rank", "Model", "MAE", "RMSE", "MAPE %", "R²", "Direction", "Accuracy", "F1", "Fit (s)",
        ]);

        for (i, score) in report.scores.iter().enumerate() {
            let (accuracy, f1) = match &score.classification {
                Some(c) => (format!("{:.3}", c.accuracy), format!("{:.3}", c.f1)),
                None => ("-".to_string(), "-".to_string()),
            };
            builder.push_record([
                (i + 1).to_string(),
                score.name.clone(),
                format!("{:.6}", score.regression.mae),
                format!("{:.6}", score.regression.rmse),
                format!("{:.2}", score.regression.mape),
                format!("{:.4}", score.regression.r2),
                format!("{:.1}%", score.regression.directional_accuracy * 100.0),
                accuracy,
                f1,
                format!("{:.3}", score.fit_seconds),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    pub fn print_comparison(report: &ComparisonReport) {
        println!(
            "{}",
            format!(
                "Model Comparison ({} train / {} test rows, ranked by {:?})",
                report.train_rows, report.test_rows, report.rank_by
            )
            .bold()
            .underline()
        );
        println!("{}", Self::comparison_table(report));
        for failure in &report.failures {
            println!("  {} {}: {}", "failed".red(), failure.name, failure.cause);
        }
        println!();
    }

    /// Export any serializable result to pretty JSON.
    pub fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    /// Export a report as one CSV line.
    pub fn to_csv_line(report: &PerformanceReport) -> String {
        format!(
            "{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.4},{:.2},{},{:.1},{:.2},{:.2}",
            report.strategy_name,
            report.periods,
            report.initial_capital,
            report.final_value,
            report.strategy.total_return_pct,
            report.strategy.annual_return_pct,
            report.buy_hold.total_return_pct,
            report.strategy.sharpe_ratio,
            report.strategy.max_drawdown_pct,
            report.total_trades,
            report.win_rate_pct,
            report.profit_factor,
            report.total_costs
        )
    }

    /// Get CSV header.
    pub fn csv_header() -> &'static str {
        "strategy,periods,initial_capital,final_value,total_return_pct,annual_return_pct,buy_hold_return_pct,sharpe_ratio,max_drawdown_pct,total_trades,win_rate_pct,profit_factor,total_costs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{run_backtest, BacktestConfig};
    use chrono::{Duration, TimeZone};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_error_metrics() {
        let actual = [0.01, -0.02, 0.0];
        let predicted = [0.02, -0.01, 0.01];
        assert!((mean_absolute_error(&actual, &predicted) - 0.01).abs() < 1e-12);
        assert!((root_mean_squared_error(&actual, &predicted) - 0.01).abs() < 1e-12);
        // 100% + 50% + |−0.01| / 1
        assert!((mean_absolute_percentage_error(&actual, &predicted) - 50.333_333_333).abs() < 1e-6);
        assert!((directional_accuracy(&actual, &predicted) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_r_squared() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert!((r_squared(&actual, &actual) - 1.0).abs() < 1e-12);
        assert_eq!(r_squared(&[2.0, 2.0], &[1.0, 3.0]), 0.0);
        assert!(r_squared(&actual, &[4.0, 3.0, 2.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean_absolute_error(&[], &[]), 0.0);
        assert_eq!(directional_accuracy(&[], &[]), 0.0);
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sortino_ratio(&[], 10.0), 0.0);
        assert_eq!(max_drawdown_pct(&[]), 0.0);
        assert_eq!(win_rate_pct(&[], &[]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(annualized_return_pct(1.1, 0), 0.0);
    }

    #[test]
    fn test_annualized_return() {
        assert!((annualized_return_pct(1.1, 252) - 10.0).abs() < 1e-9);
        assert_eq!(annualized_return_pct(0.0, 100), -100.0);
        assert_eq!(annualized_return_pct(-0.5, 100), -100.0);
    }

    #[test]
    fn test_max_drawdown() {
        let cumulative = [1.0, 1.2, 0.9, 1.1, 1.3, 1.04];
        assert!((max_drawdown_pct(&cumulative) - (-25.0)).abs() < 1e-9);
        assert_eq!(max_drawdown_pct(&[1.0, 1.1, 1.2]), 0.0);
    }

    #[test]
    fn test_ratios() {
        let returns = [0.01, -0.02, 0.03, -0.01, 0.02];
        let sharpe = sharpe_ratio(&returns);
        let expected = mean(&returns) / sample_std(&returns) * 252.0_f64.sqrt();
        assert!((sharpe - expected).abs() < 1e-12);

        assert!(sortino_ratio(&returns, 20.0) > 0.0);
        // One negative return leaves the downside deviation undefined.
        assert_eq!(sortino_ratio(&[0.01, -0.01, 0.02], 20.0), 0.0);
        assert_eq!(calmar_ratio(20.0, -10.0), 2.0);
        assert_eq!(calmar_ratio(20.0, 0.0), 0.0);
    }

    #[test]
    fn test_trade_stats() {
        let net = [0.0, 0.02, -0.01, 0.03, 0.01];
        assert_eq!(win_rate_pct(&net, &[1, 2]), 50.0);
        assert_eq!(win_rate_pct(&net, &[]), 0.0);
        assert!((profit_factor(&net) - 6.0).abs() < 1e-12);
        assert_eq!(profit_factor(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_report_on_empty_state() {
        let state = run_backtest(&[], &[], &[], &BacktestConfig::default()).unwrap();
        assert!(PerformanceReport::compute(&state, None).is_none());
    }

    #[test]
    fn test_flat_series_report() {
        let prices = vec![100.0; 50];
        let predictions = vec![0.01; 50];
        let state = run_backtest(&predictions, &prices, &days(50), &BacktestConfig::default())
            .unwrap();
        let report = PerformanceReport::compute(&state, None).unwrap();

        assert_eq!(report.strategy.total_return_pct, 0.0);
        assert_eq!(report.strategy.annual_return_pct, 0.0);
        assert_eq!(report.strategy.volatility_pct, 0.0);
        assert_eq!(report.strategy.sharpe_ratio, 0.0);
        assert_eq!(report.buy_hold.sharpe_ratio, 0.0);
        assert_eq!(report.strategy.max_drawdown_pct, 0.0);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.win_rate_pct, 0.0);
        assert_eq!(report.profit_factor, 0.0);
        assert!(report.prediction.is_none());
    }

    #[test]
    fn test_constant_growth_has_no_volatility() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let config = BacktestConfig::default().with_transaction_cost(0.0);
        let state = run_backtest(&vec![1.0; 30], &prices, &days(30), &config).unwrap();
        let report = PerformanceReport::compute(&state, None).unwrap();

        assert_eq!(report.periods, 30);
        assert!(report.buy_hold.volatility_pct.abs() < 1e-9);
        assert!(report.strategy.volatility_pct.abs() < 1e-9);
        // 29 realized moves of 1%, annualized over all 30 periods.
        let growth = 1.01_f64.powi(29);
        assert!((report.buy_hold.total_return_pct - (growth - 1.0) * 100.0).abs() < 1e-9);
        let expected_annual = annualized_return_pct(growth, 30);
        assert!((report.buy_hold.annual_return_pct - expected_annual).abs() < 1e-6);
    }

    #[test]
    fn test_beats_buy_and_hold() {
        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let short = run_backtest(&vec![-1.0; 20], &falling, &days(20), &BacktestConfig::default())
            .unwrap();
        let report = PerformanceReport::compute(&short, None).unwrap();
        assert!(report.excess_return_pct > 0.0);
        assert!(report.beats_buy_and_hold());

        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let short = run_backtest(&vec![-1.0; 20], &rising, &days(20), &BacktestConfig::default())
            .unwrap();
        let report = PerformanceReport::compute(&short, None).unwrap();
        assert!(!report.beats_buy_and_hold());
    }

    #[test]
    fn test_report_fields() {
        let prices = [100.0, 102.0, 101.0, 104.0, 103.0];
        let predictions = [1.0, -1.0, 1.0, 1.0, -1.0];
        let actuals = [0.02, -0.01, 0.03, -0.01, 0.0];
        let state =
            run_backtest(&predictions, &prices, &days(5), &BacktestConfig::default()).unwrap();
        let report = PerformanceReport::compute(&state, Some(&actuals)).unwrap();

        assert_eq!(report.periods, 5);
        assert_eq!(report.total_trades, 3);
        assert!((report.buy_hold.total_return_pct - 3.0).abs() < 1e-9);
        assert!(report.strategy.max_drawdown_pct <= 0.0);
        assert!(report.total_costs > 0.0);
        let p = report.prediction.unwrap();
        assert!((p.directional_accuracy - 0.6).abs() < 1e-12);

        let json = ResultFormatter::to_json(&report);
        assert!(json.contains("\"strategy_name\": \"long_short\""));
        let line = ResultFormatter::to_csv_line(&report);
        assert_eq!(
            line.split(',').count(),
            ResultFormatter::csv_header().split(',').count()
        );
    }
}
