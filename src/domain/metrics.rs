//! Aggregate performance metrics, risk ratios and optimizer summary rows.

use chrono::{NaiveDate, NaiveDateTime};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use super::ohlcv::BarSeries;
use super::position::Position;
use super::stats::{Cohort, TradeStat};

/// Trading days in a year.
pub const ANNUAL_PERIOD: usize = 252;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatePerformance {
    pub initial_balance: f64,
    pub total_trades: usize,
    pub win_in_series: usize,
    pub loss_in_series: usize,

    pub average_profit_abs: f64,
    pub average_profit_perc: f64,
    pub bars_on_trade: f64,
    pub bar_profit: f64,

    pub win_trades_abs: usize,
    pub win_trades_perc: f64,
    pub win_average_profit_abs: f64,
    pub win_average_profit_perc: f64,
    pub win_bars_on_trade: f64,

    pub loss_trades_abs: usize,
    pub loss_trades_perc: f64,
    pub loss_average_profit_abs: f64,
    pub loss_average_profit_perc: f64,
    pub loss_bars_on_trade: f64,

    pub total_profit: f64,
    pub total_loss: f64,
    pub net_profit_abs: f64,
    pub net_profit_perc: f64,
    pub total_mae: f64,
    pub total_mfe: f64,

    pub year_profit: f64,
    pub month_profit: f64,

    pub max_profit_abs: f64,
    pub max_profit_abs_day: Option<NaiveDate>,
    pub max_profit_perc: f64,
    pub max_profit_perc_day: Option<NaiveDate>,
    pub max_drawdown_abs: f64,
    pub max_drawdown_abs_day: Option<NaiveDate>,
    pub max_drawdown_perc: f64,
    pub max_drawdown_perc_day: Option<NaiveDate>,

    pub profit_factor: f64,
    pub recovery_factor: f64,
    pub payoff_ratio: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

/// Win/loss tallies over a sequence of (abs, perc) trade results.
#[derive(Debug, Clone, Default)]
struct Tally {
    total_trades: usize,
    win_count: usize,
    loss_count: usize,
    total_profit: f64,
    total_loss: f64,
    net_profit_abs: f64,
    net_profit_perc: f64,
    win_average_abs: f64,
    win_average_perc: f64,
    loss_average_abs: f64,
    loss_average_perc: f64,
    worst_abs: f64,
}

impl Tally {
    fn new(results: &[(f64, f64)]) -> Self {
        let wins_abs: Vec<f64> = results.iter().map(|r| r.0).filter(|&a| a > 0.0).collect();
        let losses_abs: Vec<f64> = results.iter().map(|r| r.0).filter(|&a| a < 0.0).collect();
        let wins_perc: Vec<f64> = results.iter().map(|r| r.1).filter(|&p| p > 0.0).collect();
        let losses_perc: Vec<f64> = results.iter().map(|r| r.1).filter(|&p| p < 0.0).collect();

        Tally {
            total_trades: results.len(),
            win_count: wins_abs.len(),
            loss_count: losses_abs.len(),
            total_profit: wins_abs.iter().sum(),
            total_loss: losses_abs.iter().sum(),
            net_profit_abs: results.iter().map(|r| r.0).sum(),
            net_profit_perc: results.iter().map(|r| r.1).sum(),
            win_average_abs: mean_or_zero(&wins_abs),
            win_average_perc: mean_or_zero(&wins_perc),
            loss_average_abs: mean_or_zero(&losses_abs),
            loss_average_perc: mean_or_zero(&losses_perc),
            worst_abs: results
                .iter()
                .map(|r| r.0)
                .fold(None, |acc: Option<f64>, a| Some(acc.map_or(a, |m| m.min(a))))
                .unwrap_or(0.0),
        }
    }

    fn win_perc(&self) -> f64 {
        percent_of(self.win_count, self.total_trades)
    }

    fn loss_perc(&self) -> f64 {
        percent_of(self.loss_count, self.total_trades)
    }

    /// total profit / |total loss|; 0 without losses.
    fn profit_factor(&self) -> f64 {
        if self.total_loss != 0.0 {
            (self.total_profit / self.total_loss).abs()
        } else {
            0.0
        }
    }

    /// net profit / |worst trade|; 0 when no trade lost money.
    fn recovery_factor(&self) -> f64 {
        if self.worst_abs < 0.0 {
            (self.net_profit_abs / self.worst_abs).abs()
        } else {
            0.0
        }
    }

    /// mean win / |mean loss|; 0 without losses.
    fn payoff_ratio(&self) -> f64 {
        if self.loss_average_abs != 0.0 {
            (self.win_average_abs / self.loss_average_abs).abs()
        } else {
            0.0
        }
    }
}

impl AggregatePerformance {
    /// Metrics for one cohort. Degenerate inputs (no trades, no losses, zero
    /// variance) resolve to 0 rather than failing.
    pub fn compute(
        cohort: Cohort,
        stats: &[TradeStat],
        initial_balance: f64,
        bars: &BarSeries,
    ) -> Self {
        let results: Vec<(f64, f64)> = stats.iter().map(|s| (s.abs, s.perc)).collect();
        let tally = Tally::new(&results);
        let (win_in_series, loss_in_series) = streaks(stats);

        let nonzero_abs: Vec<f64> = stats.iter().map(|s| s.abs).filter(|&v| v != 0.0).collect();
        let nonzero_perc: Vec<f64> = stats.iter().map(|s| s.perc).filter(|&v| v != 0.0).collect();
        let nonzero_bars: Vec<f64> = stats
            .iter()
            .filter(|s| s.bars_held > 0)
            .map(|s| s.bars_held as f64)
            .collect();
        let nonzero_bar_profit: Vec<f64> = stats
            .iter()
            .map(|s| s.profit_per_bar)
            .filter(|&v| v != 0.0)
            .collect();
        let win_bars: Vec<f64> = stats
            .iter()
            .filter(|s| s.perc > 0.0)
            .map(|s| s.bars_held as f64)
            .collect();
        let loss_bars: Vec<f64> = stats
            .iter()
            .filter(|s| s.perc < 0.0)
            .map(|s| s.bars_held as f64)
            .collect();

        let days = days_span(stats);
        let (max_profit_abs, max_profit_abs_day) = extreme(stats, |s| s.abs, f64::gt);
        let (max_profit_perc, max_profit_perc_day) = extreme(stats, |s| s.perc, f64::gt);
        let (max_drawdown_abs, max_drawdown_abs_day) = extreme(stats, |s| s.abs, f64::lt);
        let (max_drawdown_perc, max_drawdown_perc_day) = extreme(stats, |s| s.perc, f64::lt);

        let returns = daily_returns(cohort, stats, bars);

        AggregatePerformance {
            initial_balance,
            total_trades: tally.total_trades,
            win_in_series,
            loss_in_series,
            average_profit_abs: mean_or_zero(&nonzero_abs),
            average_profit_perc: mean_or_zero(&nonzero_perc),
            bars_on_trade: mean_or_zero(&nonzero_bars),
            bar_profit: mean_or_zero(&nonzero_bar_profit),
            win_trades_abs: tally.win_count,
            win_trades_perc: tally.win_perc(),
            win_average_profit_abs: tally.win_average_abs,
            win_average_profit_perc: tally.win_average_perc,
            win_bars_on_trade: mean_or_zero(&win_bars),
            loss_trades_abs: tally.loss_count,
            loss_trades_perc: tally.loss_perc(),
            loss_average_profit_abs: tally.loss_average_abs,
            loss_average_profit_perc: tally.loss_average_perc,
            loss_bars_on_trade: mean_or_zero(&loss_bars),
            total_profit: tally.total_profit,
            total_loss: tally.total_loss,
            net_profit_abs: tally.net_profit_abs,
            net_profit_perc: tally.net_profit_perc,
            total_mae: stats.iter().map(|s| s.mae).sum(),
            total_mfe: stats.iter().map(|s| s.mfe).sum(),
            year_profit: projected_profit(tally.net_profit_abs, initial_balance, days, 1.0),
            month_profit: projected_profit(tally.net_profit_abs, initial_balance, days, 12.0),
            max_profit_abs,
            max_profit_abs_day,
            max_profit_perc,
            max_profit_perc_day,
            max_drawdown_abs,
            max_drawdown_abs_day,
            max_drawdown_perc,
            max_drawdown_perc_day,
            profit_factor: tally.profit_factor(),
            recovery_factor: tally.recovery_factor(),
            payoff_ratio: tally.payoff_ratio(),
            sharpe_ratio: annualized_sharpe(&returns),
            sortino_ratio: annualized_sortino(&returns),
        }
    }
}

/// Condensed metrics for one optimization trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BriefPerformance {
    pub params: Vec<(String, f64)>,
    pub net_profit_abs: f64,
    pub net_profit_perc: f64,
    pub year_profit: f64,
    pub win_average_profit_perc: f64,
    pub loss_average_profit_perc: f64,
    pub max_drawdown_abs: f64,
    pub total_trades: usize,
    pub win_trades_abs: usize,
    pub win_trades_perc: f64,
    pub profit_factor: f64,
    pub recovery_factor: f64,
    pub payoff_ratio: f64,
    /// Set when the trial failed; the metrics are then all zero.
    pub failure: Option<String>,
}

impl BriefPerformance {
    pub fn compute(
        params: Vec<(String, f64)>,
        positions: &[Position],
        initial_balance: f64,
    ) -> Self {
        let results: Vec<(f64, f64)> = positions
            .iter()
            .map(|p| (p.realized_profit(), p.profit_percent.unwrap_or(0.0)))
            .collect();
        let tally = Tally::new(&results);
        let days = match (positions.first(), positions.last().and_then(|p| p.close_time)) {
            (Some(first), Some(last_close)) => whole_days(first.open_time, last_close),
            _ => 1,
        };

        BriefPerformance {
            params,
            net_profit_abs: tally.net_profit_abs,
            net_profit_perc: tally.net_profit_perc,
            year_profit: projected_profit(tally.net_profit_abs, initial_balance, days, 1.0),
            win_average_profit_perc: tally.win_average_perc,
            loss_average_profit_perc: tally.loss_average_perc,
            max_drawdown_abs: tally.worst_abs,
            total_trades: tally.total_trades,
            win_trades_abs: tally.win_count,
            win_trades_perc: tally.win_perc(),
            profit_factor: tally.profit_factor(),
            recovery_factor: tally.recovery_factor(),
            payoff_ratio: tally.payoff_ratio(),
            failure: None,
        }
    }

    pub fn failed(params: Vec<(String, f64)>, reason: impl Into<String>) -> Self {
        BriefPerformance {
            params,
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percent_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}

/// Longest runs of non-negative and negative trades, in trade order.
fn streaks(stats: &[TradeStat]) -> (usize, usize) {
    let (mut win, mut loss) = (0usize, 0usize);
    let (mut best_win, mut best_loss) = (0usize, 0usize);
    for stat in stats {
        if stat.abs >= 0.0 {
            win += 1;
            loss = 0;
            best_win = best_win.max(win);
        } else {
            win = 0;
            loss += 1;
            best_loss = best_loss.max(loss);
        }
    }
    (best_win, best_loss)
}

fn whole_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_days().max(1)
}

/// Whole days from the first trade's open to the last trade's close, at least 1.
fn days_span(stats: &[TradeStat]) -> i64 {
    match (stats.first(), stats.last()) {
        (Some(first), Some(last)) => whole_days(first.open_time, last.close_time),
        _ => 1,
    }
}

/// Compound-growth projection of net profit onto `365 / periods` days, in percent.
fn projected_profit(net_profit_abs: f64, initial_balance: f64, days: i64, periods: f64) -> f64 {
    if initial_balance == 0.0 {
        return 0.0;
    }
    let gain_factor = (net_profit_abs + initial_balance) / initial_balance;
    let projected = (gain_factor.powf(365.0 / days as f64 / periods) - 1.0) * 100.0;
    if projected.is_finite() { projected } else { 0.0 }
}

/// First row whose `value` beats all others under `better`, with its close day.
fn extreme(
    stats: &[TradeStat],
    value: impl Fn(&TradeStat) -> f64,
    better: fn(&f64, &f64) -> bool,
) -> (f64, Option<NaiveDate>) {
    let mut best: Option<(f64, NaiveDate)> = None;
    for stat in stats {
        let v = value(stat);
        match best {
            Some((b, _)) if !better(&v, &b) => {}
            _ => best = Some((v, stat.close_time.date())),
        }
    }
    best.map_or((0.0, None), |(v, day)| (v, Some(day)))
}

/// Per-calendar-day percentage returns, zero-padded or truncated to one
/// trading year.
///
/// The Market cohort holds a single buy-and-hold position, so its returns
/// come from close-to-close changes of the whole series instead of trades.
/// Every other cohort sums trade returns by close day, even when it holds a
/// single trade.
pub fn daily_returns(cohort: Cohort, stats: &[TradeStat], bars: &BarSeries) -> Vec<f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    if cohort == Cohort::Market {
        for (time, change) in bars.close_returns_pct() {
            *days.entry(time.date()).or_insert(0.0) += change;
        }
    } else {
        for stat in stats {
            *days.entry(stat.close_time.date()).or_insert(0.0) += stat.perc;
        }
    }
    let mut returns: Vec<f64> = days.into_values().collect();
    returns.resize(ANNUAL_PERIOD, 0.0);
    returns
}

/// sqrt(252) * mean / population stdev; 0 when the returns do not vary.
pub fn annualized_sharpe(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let std = returns.population_std_dev();
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    (ANNUAL_PERIOD as f64).sqrt() * returns.mean() / std
}

/// sqrt(252) * mean / downside deviation below a zero threshold.
///
/// Downside deviation is the root-mean-square of the negative returns across
/// the whole series, and 1 when no return is negative.
pub fn annualized_sortino(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().map(|r| r.min(0.0).powi(2)).sum();
    let downside = (downside_sq / returns.len() as f64).sqrt();
    let downside = if downside == 0.0 { 1.0 } else { downside };
    (ANNUAL_PERIOD as f64).sqrt() * returns.mean() / downside
}
