//! Curve reconstruction over the bar axis: equity, long/short, buy-and-hold.

use super::ohlcv::BarSeries;
use super::position::{Position, Side};
use super::stats::{Cohorts, TradeStat};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Curves {
    /// Cumulative realized profit, one value per closed trade.
    pub balance: Vec<f64>,
    /// Cumulative MAE per closed trade.
    pub mae: Vec<f64>,
    /// Cumulative MFE per closed trade.
    pub mfe: Vec<f64>,
    pub equity: Vec<f64>,
    pub buy_and_hold: Vec<f64>,
    pub long: Vec<f64>,
    pub short: Vec<f64>,
}

impl Curves {
    /// Build all curves from realized positions. Every per-bar curve has
    /// exactly one value per bar.
    pub fn build(
        positions: &[Position],
        stats: &Cohorts<Vec<TradeStat>>,
        market: Option<&Position>,
        bars: &BarSeries,
    ) -> Self {
        let balance = cumulative(stats.all.iter().map(|s| s.abs));
        let final_balance = balance.last().copied().unwrap_or(0.0);

        let long_total: f64 = stats.long.iter().map(|s| s.abs).sum();
        let short_total: f64 = stats.short.iter().map(|s| s.abs).sum();

        Curves {
            mae: cumulative(stats.all.iter().map(|s| s.mae)),
            mfe: cumulative(stats.all.iter().map(|s| s.mfe)),
            equity: equity_curve(positions, final_balance, bars),
            buy_and_hold: buy_and_hold_curve(market, bars),
            long: side_curve(positions, Side::Buy, long_total, bars),
            short: side_curve(positions, Side::Sell, short_total, bars),
            balance,
        }
    }
}

fn cumulative(values: impl Iterator<Item = f64>) -> Vec<f64> {
    values
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Bars inside `[open, close)` of each position carry the balance before that
/// position plus its mark-to-market profit at the bar's close. Bars outside
/// every position carry the profit realized so far.
fn equity_curve(positions: &[Position], final_balance: f64, bars: &BarSeries) -> Vec<f64> {
    let mut realized_at = vec![0.0; bars.len()];
    for position in positions {
        if let Some(close) = position.close_bar_index {
            if close < realized_at.len() {
                realized_at[close] += position.realized_profit();
            }
        }
    }
    let mut curve = cumulative(realized_at.into_iter());

    let mut balance_before = 0.0;
    for position in positions {
        mark_position(&mut curve, None, position, balance_before, bars);
        balance_before += position.realized_profit();
    }

    if let Some(last) = curve.last_mut() {
        *last = final_balance;
    }
    curve
}

/// Mark-to-market reconstruction restricted to one side. Uncovered bars
/// repeat the previous bar's value; bar 0 defaults to zero.
fn side_curve(positions: &[Position], side: Side, total: f64, bars: &BarSeries) -> Vec<f64> {
    let mut curve = vec![0.0; bars.len()];
    let mut covered = vec![false; bars.len()];

    let mut balance_before = 0.0;
    for position in positions.iter().filter(|p| p.side == side) {
        mark_position(&mut curve, Some(&mut covered), position, balance_before, bars);
        balance_before += position.realized_profit();
    }

    for i in 1..curve.len() {
        if !covered[i] {
            curve[i] = curve[i - 1];
        }
    }
    if let Some(last) = curve.last_mut() {
        *last = total;
    }
    curve
}

fn mark_position(
    curve: &mut [f64],
    mut covered: Option<&mut Vec<bool>>,
    position: &Position,
    balance_before: f64,
    bars: &BarSeries,
) {
    let close = position.close_bar_index.unwrap_or(bars.len()).min(bars.len());
    for index in position.open_bar_index..close {
        curve[index] = balance_before + position.mark_to_market(bars.bars()[index].close);
        if let Some(covered) = covered.as_deref_mut() {
            covered[index] = true;
        }
    }
}

fn buy_and_hold_curve(market: Option<&Position>, bars: &BarSeries) -> Vec<f64> {
    match market {
        Some(position) => bars
            .bars()
            .iter()
            .map(|bar| position.mark_to_market(bar.close))
            .collect(),
        None => vec![0.0; bars.len()],
    }
}
