//! Trade positions: lifecycle state, profit and excursion calculations.

use chrono::NaiveDateTime;
use std::sync::Arc;

use super::instrument::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn direction(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
    Canceled,
}

/// 1-based position identifier, assigned when the portfolio admits it.
pub type Ticket = usize;

#[derive(Debug, Clone)]
pub struct Position {
    pub ticket: Ticket,
    pub side: Side,
    pub instrument: Arc<Instrument>,
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub open_time: NaiveDateTime,
    pub close_time: Option<NaiveDateTime>,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
    pub profit: Option<f64>,
    pub profit_percent: Option<f64>,
    pub open_bar_index: usize,
    pub close_bar_index: Option<usize>,
    pub entry_label: String,
    pub exit_label: String,
    pub running_total_profit: f64,
    pub comment: String,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Sell
    }

    /// Profit if the position were closed at `close_price` with `volume`.
    pub fn profit_at(&self, close_price: f64, volume: f64) -> f64 {
        let price_delta = (close_price - self.open_price) * self.side.direction();
        self.instrument.profit(price_delta, close_price, volume)
    }

    /// Mark-to-market profit at `price` for the full volume.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.profit_at(price, self.volume)
    }

    /// Maximum adverse excursion given the window's low/high.
    pub fn mae(&self, low: f64, high: f64) -> f64 {
        match self.side {
            Side::Buy => self.mark_to_market(low),
            Side::Sell => self.mark_to_market(high),
        }
    }

    /// Maximum favorable excursion given the window's low/high.
    pub fn mfe(&self, low: f64, high: f64) -> f64 {
        match self.side {
            Side::Buy => self.mark_to_market(high),
            Side::Sell => self.mark_to_market(low),
        }
    }

    /// Bars between open and close; `None` while open.
    pub fn bars_held(&self) -> Option<usize> {
        self.close_bar_index
            .map(|close| close.saturating_sub(self.open_bar_index))
    }

    pub fn realized_profit(&self) -> f64 {
        self.profit.unwrap_or(0.0)
    }
}
