//! Portfolio ledger: position admission, closing, balance and summarization.

use chrono::NaiveDateTime;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

use super::curves::Curves;
use super::error::TradelabError;
use super::instrument::Instrument;
use super::metrics::{AggregatePerformance, BriefPerformance};
use super::ohlcv::BarSeries;
use super::position::{Position, PositionStatus, Side, Ticket};
use super::stats::{compute_trade_stats, Cohort, Cohorts, TradeStat};

pub const DEFAULT_INITIAL_BALANCE: f64 = 100_000.0;
pub const DEFAULT_LEVERAGE: f64 = 5.0;

/// Parameters of an order-open call.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub instrument: Arc<Instrument>,
    pub side: Side,
    pub price: f64,
    pub volume: f64,
    pub time: NaiveDateTime,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_label: String,
    pub comment: String,
}

impl OpenRequest {
    pub fn new(
        instrument: Arc<Instrument>,
        side: Side,
        price: f64,
        volume: f64,
        time: NaiveDateTime,
    ) -> Self {
        OpenRequest {
            instrument,
            side,
            price,
            volume,
            time,
            stop_loss: None,
            take_profit: None,
            entry_label: String::new(),
            comment: String::new(),
        }
    }

    pub fn with_stops(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.entry_label = label.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Parameters of an order-close call.
///
/// Positions are only ever closed in full: a `volume` that differs from the
/// position's volume is rejected.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub price: f64,
    pub time: NaiveDateTime,
    pub volume: Option<f64>,
    pub exit_label: String,
}

impl CloseRequest {
    pub fn new(price: f64, time: NaiveDateTime) -> Self {
        CloseRequest {
            price,
            time,
            volume: None,
            exit_label: String::new(),
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.exit_label = label.into();
        self
    }
}

/// Everything `summarize` derives from a finished run.
#[derive(Debug, Clone)]
pub struct Summary {
    pub stats: Cohorts<Vec<TradeStat>>,
    pub performance: Cohorts<AggregatePerformance>,
    pub curves: Curves,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    initial_balance: f64,
    pub balance: f64,
    pub leverage: f64,
    pub positions: Vec<Position>,
    pub summary: Option<Summary>,
    pub brief_performance: Vec<BriefPerformance>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Portfolio::new(DEFAULT_INITIAL_BALANCE, DEFAULT_LEVERAGE)
    }
}

impl Portfolio {
    pub fn new(initial_balance: f64, leverage: f64) -> Self {
        Portfolio {
            initial_balance,
            balance: initial_balance,
            leverage,
            positions: Vec::new(),
            summary: None,
            brief_performance: Vec::new(),
        }
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Drop all positions and restore the initial balance.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.balance = self.initial_balance;
    }

    /// Admit a position, assigning it the next 1-based ticket.
    pub fn add_position(&mut self, mut position: Position) -> Ticket {
        let ticket = self.positions.len() + 1;
        position.ticket = ticket;
        self.positions.push(position);
        ticket
    }

    pub fn position_count(&self, side: Option<Side>) -> usize {
        match side {
            Some(side) => self.positions.iter().filter(|p| p.side == side).count(),
            None => self.positions.len(),
        }
    }

    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        ticket
            .checked_sub(1)
            .and_then(|i| self.positions.get(i))
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn has_open_positions(&self) -> bool {
        self.positions.iter().any(Position::is_open)
    }

    /// Open a position at a bar's exact time. No margin is reserved.
    pub fn open_position(
        &mut self,
        bars: &BarSeries,
        request: OpenRequest,
    ) -> Result<Ticket, TradelabError> {
        let open_bar_index = bars.index_of(request.time)?;
        let position = Position {
            ticket: 0,
            side: request.side,
            instrument: request.instrument,
            open_price: request.price,
            close_price: None,
            open_time: request.time,
            close_time: None,
            volume: request.volume,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            status: PositionStatus::Open,
            profit: None,
            profit_percent: None,
            open_bar_index,
            close_bar_index: None,
            entry_label: request.entry_label,
            exit_label: String::new(),
            running_total_profit: 0.0,
            comment: request.comment,
        };
        Ok(self.add_position(position))
    }

    /// Close an open position and credit its profit to the balance.
    ///
    /// Returns the realized profit.
    pub fn close_position(
        &mut self,
        bars: &BarSeries,
        ticket: Ticket,
        request: CloseRequest,
    ) -> Result<f64, TradelabError> {
        let close_bar_index = bars.index_of(request.time)?;
        let balance = self.balance;
        let position = ticket
            .checked_sub(1)
            .and_then(|i| self.positions.get_mut(i))
            .ok_or_else(|| {
                TradelabError::invalid_state(format!("no position with ticket {ticket}"))
            })?;

        if position.status != PositionStatus::Open {
            return Err(TradelabError::invalid_state(format!(
                "position {ticket} is not open ({:?})",
                position.status
            )));
        }
        if let Some(volume) = request.volume {
            if (volume - position.volume).abs() > f64::EPSILON {
                return Err(TradelabError::invalid_state(format!(
                    "partial close of position {ticket} ({volume} of {}) is not supported",
                    position.volume
                )));
            }
        }
        if close_bar_index < position.open_bar_index {
            return Err(TradelabError::invalid_state(format!(
                "position {ticket} cannot close before it opened"
            )));
        }

        let profit = position.profit_at(request.price, position.volume);
        let profit_percent = if balance != 0.0 {
            profit / balance * 100.0
        } else {
            0.0
        };

        position.close_price = Some(request.price);
        position.close_time = Some(request.time);
        position.close_bar_index = Some(close_bar_index);
        position.profit = Some(profit);
        position.profit_percent = Some(profit_percent);
        position.exit_label = request.exit_label;
        position.status = PositionStatus::Closed;

        self.balance += profit;
        position.running_total_profit = self.balance - self.initial_balance;

        debug!(
            "closed position {ticket}: profit {profit:.2}, balance {:.2}",
            self.balance
        );
        Ok(profit)
    }

    /// Force-close every open position at the final bar's open price.
    pub fn close_all_open(&mut self, bars: &BarSeries) -> Result<usize, TradelabError> {
        let last = bars.last();
        let (price, time) = (last.open, last.time);
        let open: Vec<Ticket> = self.open_positions().map(|p| p.ticket).collect();
        for &ticket in &open {
            self.close_position(bars, ticket, CloseRequest::new(price, time))?;
        }
        Ok(open.len())
    }

    /// Synthetic buy-and-hold position spanning the whole series, sized
    /// like the first real position.
    pub fn market_position(&self, bars: &BarSeries) -> Option<Position> {
        let template = self.positions.first()?;
        let first = bars.first();
        let last = bars.last();
        let mut position = Position {
            ticket: 0,
            side: Side::Buy,
            instrument: Arc::clone(&template.instrument),
            open_price: first.open,
            close_price: Some(last.close),
            open_time: first.time,
            close_time: Some(last.time),
            volume: template.volume,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Closed,
            profit: None,
            profit_percent: None,
            open_bar_index: first.index,
            close_bar_index: Some(last.index),
            entry_label: String::new(),
            exit_label: String::new(),
            running_total_profit: 0.0,
            comment: String::new(),
        };
        let profit = position.mark_to_market(last.close);
        position.profit = Some(profit);
        position.profit_percent = Some(profit / self.initial_balance * 100.0);
        position.running_total_profit = profit;
        Some(position)
    }

    /// Realize all positions and derive cohort statistics, performance and curves.
    pub fn summarize(&mut self, bars: &BarSeries) -> Result<&Summary, TradelabError> {
        let started = Instant::now();
        self.close_all_open(bars)?;

        let (long, short): (Vec<Position>, Vec<Position>) =
            self.positions.iter().cloned().partition(Position::is_long);
        let market: Vec<Position> = self.market_position(bars).into_iter().collect();

        let stats = Cohorts {
            all: compute_trade_stats(&self.positions, bars)?,
            long: compute_trade_stats(&long, bars)?,
            short: compute_trade_stats(&short, bars)?,
            market: compute_trade_stats(&market, bars)?,
        };
        let initial = self.initial_balance;
        let performance = Cohorts {
            all: AggregatePerformance::compute(Cohort::All, &stats.all, initial, bars),
            long: AggregatePerformance::compute(Cohort::Long, &stats.long, initial, bars),
            short: AggregatePerformance::compute(Cohort::Short, &stats.short, initial, bars),
            market: AggregatePerformance::compute(Cohort::Market, &stats.market, initial, bars),
        };
        let curves = Curves::build(&self.positions, &stats, market.first(), bars);

        info!(
            "summarized {} positions in {:.2?}",
            self.positions.len(),
            started.elapsed()
        );
        Ok(&*self.summary.insert(Summary {
            stats,
            performance,
            curves,
        }))
    }

    /// Run `f` against a fresh ledger, then restore balance and positions.
    pub fn with_optimization_scope<T>(&mut self, f: impl FnOnce(&mut Portfolio) -> T) -> T {
        let saved_balance = self.balance;
        let saved_positions = std::mem::take(&mut self.positions);
        self.balance = self.initial_balance;

        let result = f(self);

        self.balance = saved_balance;
        self.positions = saved_positions;
        result
    }
}
