#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::io::Write;
use std::sync::Arc;
use tradelab::domain::error::TradelabError;
use tradelab::domain::instrument::Instrument;
pub use tradelab::domain::ohlcv::{Bar, BarSeries, TimeFrame};
use tradelab::domain::portfolio::{CloseRequest, OpenRequest, Portfolio};
use tradelab::domain::position::{Side, Ticket};
use tradelab::ports::data_port::DataPort;

/// In-memory bar source.
pub struct MockDataPort {
    pub bars: Vec<Bar>,
}

impl DataPort for MockDataPort {
    fn load_bars(&self) -> Result<BarSeries, TradelabError> {
        BarSeries::new(self.bars.clone(), TimeFrame::D1)
    }
}

pub fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(n)
}

pub fn make_bar(index: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        index,
        time: day(index as i64),
        open,
        high,
        low,
        close,
        volume: 1_000,
    }
}

/// Daily bars whose open equals the previous close.
pub fn series_from_closes(closes: &[f64]) -> BarSeries {
    let mut prev = closes.first().copied().unwrap_or(0.0);
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            make_bar(i, open, open.max(close) + 0.5, open.min(close) - 0.5, close)
        })
        .collect();
    BarSeries::new(bars, TimeFrame::D1).unwrap()
}

/// Flat series of `n` bars at `price`.
pub fn flat_series(n: usize, price: f64) -> BarSeries {
    series_from_closes(&vec![price; n])
}

pub fn shares() -> Arc<Instrument> {
    Arc::new(Instrument::shares("ABC", 0.01))
}

pub fn open(
    portfolio: &mut Portfolio,
    bars: &BarSeries,
    instrument: &Arc<Instrument>,
    side: Side,
    price: f64,
    volume: f64,
    bar: i64,
) -> Ticket {
    portfolio
        .open_position(
            bars,
            OpenRequest::new(Arc::clone(instrument), side, price, volume, day(bar)),
        )
        .unwrap()
}

pub fn close(
    portfolio: &mut Portfolio,
    bars: &BarSeries,
    ticket: Ticket,
    price: f64,
    bar: i64,
) -> f64 {
    portfolio
        .close_position(bars, ticket, CloseRequest::new(price, day(bar)))
        .unwrap()
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// CSV text for `closes`, one daily bar each.
pub fn bars_csv(closes: &[f64]) -> String {
    let series = series_from_closes(closes);
    let mut out = String::from("time,open,high,low,close,volume\n");
    for bar in series.bars() {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.time.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    out
}
