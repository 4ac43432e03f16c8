//! Per-trade statistics and the four reporting cohorts.

use chrono::NaiveDateTime;

use super::error::TradelabError;
use super::ohlcv::BarSeries;
use super::position::{Position, PositionStatus, Side, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cohort {
    All,
    Long,
    Short,
    Market,
}

impl Cohort {
    pub const ALL: [Cohort; 4] = [Cohort::All, Cohort::Long, Cohort::Short, Cohort::Market];

    pub fn label(self) -> &'static str {
        match self {
            Cohort::All => "All",
            Cohort::Long => "Long",
            Cohort::Short => "Short",
            Cohort::Market => "Market",
        }
    }
}

/// One value per cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohorts<T> {
    pub all: T,
    pub long: T,
    pub short: T,
    pub market: T,
}

impl<T> Cohorts<T> {
    pub fn get(&self, cohort: Cohort) -> &T {
        match cohort {
            Cohort::All => &self.all,
            Cohort::Long => &self.long,
            Cohort::Short => &self.short,
            Cohort::Market => &self.market,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cohort, &T)> {
        Cohort::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Statistics row for one closed position.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStat {
    pub ticket: Ticket,
    pub side: Side,
    pub ticker: String,
    pub volume: f64,
    pub open_time: NaiveDateTime,
    pub close_time: NaiveDateTime,
    pub open_price: f64,
    pub close_price: f64,
    pub running_total_profit: f64,
    pub entry_label: String,
    pub exit_label: String,
    pub status: PositionStatus,
    pub comment: String,
    /// Realized profit in money.
    pub abs: f64,
    /// Realized profit as a percent of balance at close.
    pub perc: f64,
    pub bars_held: usize,
    /// `perc / bars_held`; 0 for trades opened and closed on the same bar.
    pub profit_per_bar: f64,
    pub mae: f64,
    pub mfe: f64,
}

/// Build one statistics row per position. Every position must be closed.
pub fn compute_trade_stats(
    positions: &[Position],
    bars: &BarSeries,
) -> Result<Vec<TradeStat>, TradelabError> {
    positions.iter().map(|p| trade_stat(p, bars)).collect()
}

fn trade_stat(position: &Position, bars: &BarSeries) -> Result<TradeStat, TradelabError> {
    let not_closed = || {
        TradelabError::invalid_state(format!(
            "position {} has no close; statistics need realized trades",
            position.ticket
        ))
    };
    let close_bar_index = position.close_bar_index.ok_or_else(not_closed)?;
    let close_time = position.close_time.ok_or_else(not_closed)?;
    let close_price = position.close_price.ok_or_else(not_closed)?;

    let (low, high) = bars.extremes(position.open_bar_index, close_bar_index);
    let bars_held = close_bar_index.saturating_sub(position.open_bar_index);
    let perc = position.profit_percent.unwrap_or(0.0);
    let profit_per_bar = if bars_held > 0 {
        perc / bars_held as f64
    } else {
        0.0
    };

    Ok(TradeStat {
        ticket: position.ticket,
        side: position.side,
        ticker: position.instrument.ticker.clone(),
        volume: position.volume,
        open_time: position.open_time,
        close_time,
        open_price: position.open_price,
        close_price,
        running_total_profit: position.running_total_profit,
        entry_label: position.entry_label.clone(),
        exit_label: position.exit_label.clone(),
        status: position.status,
        comment: position.comment.clone(),
        abs: position.realized_profit(),
        perc,
        bars_held,
        profit_per_bar,
        mae: position.mae(low, high),
        mfe: position.mfe(low, high),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::Instrument;
    use crate::domain::ohlcv::{Bar, TimeFrame};
    use crate::domain::portfolio::{CloseRequest, OpenRequest, Portfolio};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn t(day: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(day)
    }

    fn series() -> BarSeries {
        // (low, high) per bar
        let ranges = [(9.0, 11.0), (8.0, 12.0), (10.0, 14.0), (11.0, 13.0)];
        let bars = ranges
            .iter()
            .enumerate()
            .map(|(i, &(low, high))| Bar {
                index: i,
                time: t(i as i64),
                open: low + 0.5,
                high,
                low,
                close: high - 0.5,
                volume: 100,
            })
            .collect();
        BarSeries::new(bars, TimeFrame::D1).unwrap()
    }

    fn closed(side: Side, open: i64, close: i64) -> (Portfolio, BarSeries) {
        let bars = series();
        let instrument = Arc::new(Instrument::shares("ABC", 0.01));
        let mut portfolio = Portfolio::new(10_000.0, 1.0);
        let ticket = portfolio
            .open_position(&bars, OpenRequest::new(instrument, side, 10.0, 10.0, t(open)))
            .unwrap();
        portfolio
            .close_position(&bars, ticket, CloseRequest::new(12.0, t(close)))
            .unwrap();
        (portfolio, bars)
    }

    #[test]
    fn long_trade_row() {
        let (portfolio, bars) = closed(Side::Buy, 0, 2);
        let stats = compute_trade_stats(&portfolio.positions, &bars).unwrap();
        let row = &stats[0];
        assert_relative_eq!(row.abs, 20.0);
        assert_relative_eq!(row.perc, 0.2);
        assert_eq!(row.bars_held, 2);
        assert_relative_eq!(row.profit_per_bar, 0.1);
        // window bars 0..=2: low 8, high 14
        assert_relative_eq!(row.mae, -20.0);
        assert_relative_eq!(row.mfe, 40.0);
    }

    #[test]
    fn short_trade_excursions_reversed() {
        let (portfolio, bars) = closed(Side::Sell, 0, 2);
        let stats = compute_trade_stats(&portfolio.positions, &bars).unwrap();
        assert_relative_eq!(stats[0].mae, -40.0);
        assert_relative_eq!(stats[0].mfe, 20.0);
    }

    #[test]
    fn same_bar_trade_uses_that_bar() {
        let (portfolio, bars) = closed(Side::Buy, 3, 3);
        let stats = compute_trade_stats(&portfolio.positions, &bars).unwrap();
        assert_eq!(stats[0].bars_held, 0);
        assert_relative_eq!(stats[0].profit_per_bar, 0.0);
        assert_relative_eq!(stats[0].mae, 10.0);
        assert_relative_eq!(stats[0].mfe, 30.0);
    }

    #[test]
    fn open_position_is_rejected() {
        let bars = series();
        let mut portfolio = Portfolio::new(10_000.0, 1.0);
        portfolio
            .open_position(
                &bars,
                OpenRequest::new(
                    Arc::new(Instrument::shares("ABC", 0.01)),
                    Side::Buy,
                    10.0,
                    1.0,
                    t(0),
                ),
            )
            .unwrap();
        let err = compute_trade_stats(&portfolio.positions, &bars).unwrap_err();
        assert!(matches!(err, TradelabError::InvalidState { .. }));
    }

    #[test]
    fn cohorts_iterate_in_report_order() {
        let cohorts = Cohorts {
            all: 1,
            long: 2,
            short: 3,
            market: 4,
        };
        let labels: Vec<_> = cohorts.iter().map(|(c, v)| (c.label(), *v)).collect();
        assert_eq!(labels, vec![("All", 1), ("Long", 2), ("Short", 3), ("Market", 4)]);
        assert_eq!(*cohorts.get(Cohort::Short), 3);
    }
}
