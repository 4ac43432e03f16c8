//! Backtest engine and event loop.
//!
//! Walks a bar series one bar at a time, feeding each bar to a strategy that
//! places orders against the portfolio through a [`RunContext`].

use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::TradelabError;
use super::instrument::Instrument;
use super::ohlcv::{Bar, BarSeries};
use super::portfolio::{CloseRequest, OpenRequest, Portfolio, Summary};
use super::position::{Position, Side, Ticket};
use super::strategy::{Params, Strategy};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_balance: f64,
    pub leverage: f64,
    /// Evaluate optimization trials on a thread pool.
    pub parallel: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_balance: super::portfolio::DEFAULT_INITIAL_BALANCE,
            leverage: super::portfolio::DEFAULT_LEVERAGE,
            parallel: false,
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running engine.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), TradelabError> {
        if self.is_cancelled() {
            Err(TradelabError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Lifecycle of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Constructed,
    Initialized,
    Running,
    Finished,
}

/// What a strategy sees while handling a bar: the bars so far and the order API.
pub struct RunContext<'a> {
    bars: &'a BarSeries,
    portfolio: &'a mut Portfolio,
    current: usize,
}

impl<'a> RunContext<'a> {
    pub fn bar(&self) -> &Bar {
        &self.bars.bars()[self.current]
    }

    pub fn bar_index(&self) -> usize {
        self.current
    }

    /// Bars up to and including the current one.
    pub fn history(&self) -> &[Bar] {
        self.bars.history(self.current)
    }

    pub fn balance(&self) -> f64 {
        self.portfolio.balance
    }

    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        self.portfolio.position(ticket)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.portfolio.open_positions()
    }

    /// Open a position. The order time may not lie after the current bar.
    pub fn open(&mut self, request: OpenRequest) -> Result<Ticket, TradelabError> {
        self.ensure_not_future(&request.time)?;
        self.portfolio.open_position(self.bars, request)
    }

    /// Market order at `price` stamped with the current bar's time.
    pub fn market_order(
        &mut self,
        instrument: &Arc<Instrument>,
        side: Side,
        price: f64,
        volume: f64,
    ) -> Result<Ticket, TradelabError> {
        let time = self.bar().time;
        self.open(OpenRequest::new(Arc::clone(instrument), side, price, volume, time))
    }

    pub fn close(&mut self, ticket: Ticket, request: CloseRequest) -> Result<f64, TradelabError> {
        self.ensure_not_future(&request.time)?;
        self.portfolio.close_position(self.bars, ticket, request)
    }

    /// Close the most recently opened position still open, at the current bar's time.
    pub fn close_latest(&mut self, price: f64) -> Result<f64, TradelabError> {
        let ticket = self
            .portfolio
            .open_positions()
            .map(|p| p.ticket)
            .last()
            .ok_or_else(|| TradelabError::invalid_state("no open positions to close"))?;
        let time = self.bar().time;
        self.close(ticket, CloseRequest::new(price, time))
    }

    /// Close every open position at `price` and the current bar's time.
    pub fn close_all(&mut self, price: f64) -> Result<f64, TradelabError> {
        let tickets: Vec<Ticket> = self.portfolio.open_positions().map(|p| p.ticket).collect();
        let time = self.bar().time;
        let mut total = 0.0;
        for ticket in tickets {
            total += self.close(ticket, CloseRequest::new(price, time))?;
        }
        Ok(total)
    }

    fn ensure_not_future(&self, time: &chrono::NaiveDateTime) -> Result<(), TradelabError> {
        if *time > self.bar().time {
            return Err(TradelabError::invalid_state(format!(
                "order at {time} lies after the current bar at {}",
                self.bar().time
            )));
        }
        Ok(())
    }
}

/// Drives one strategy through a bar series.
pub struct Engine<'a> {
    bars: &'a BarSeries,
    cancel: CancelToken,
    state: RunState,
}

impl<'a> Engine<'a> {
    pub fn new(bars: &'a BarSeries) -> Self {
        Engine {
            bars,
            cancel: CancelToken::new(),
            state: RunState::Constructed,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Initialise the strategy and hand it every bar in ascending order.
    ///
    /// Errors are reported with the strategy name and parameter values;
    /// cancellation is returned as is.
    pub fn run(
        &mut self,
        strategy: &mut dyn Strategy,
        params: &Params,
        portfolio: &mut Portfolio,
    ) -> Result<(), TradelabError> {
        self.state = RunState::Constructed;
        debug!("starting backtest of strategy {} [{params}]", strategy.name());

        let result = self.walk(strategy, params, portfolio);
        self.state = RunState::Finished;

        match result {
            Ok(()) => {
                debug!("backtest of {} done", strategy.name());
                Ok(())
            }
            Err(TradelabError::Cancelled) => {
                warn!("backtest of {} cancelled", strategy.name());
                Err(TradelabError::Cancelled)
            }
            Err(source) => Err(TradelabError::StrategyFailed {
                strategy: strategy.name().to_string(),
                params: params.to_string(),
                source: Box::new(source),
            }),
        }
    }

    fn walk(
        &mut self,
        strategy: &mut dyn Strategy,
        params: &Params,
        portfolio: &mut Portfolio,
    ) -> Result<(), TradelabError> {
        let bars = self.bars;
        strategy.init(params)?;
        self.state = RunState::Initialized;

        for bar in bars.bars() {
            self.cancel.check()?;
            self.state = RunState::Running;
            let mut ctx = RunContext {
                bars,
                portfolio: &mut *portfolio,
                current: bar.index,
            };
            strategy.handle(bar, &mut ctx)?;
        }
        Ok(())
    }
}

/// Fresh run on `portfolio` followed by `summarize`.
pub fn run_backtest<'p>(
    strategy: &mut dyn Strategy,
    params: &Params,
    bars: &BarSeries,
    portfolio: &'p mut Portfolio,
    cancel: Option<CancelToken>,
) -> Result<&'p Summary, TradelabError> {
    portfolio.clear();
    let mut engine = Engine::new(bars);
    if let Some(cancel) = cancel {
        engine = engine.with_cancel(cancel);
    }
    engine.run(strategy, params, portfolio)?;
    portfolio.summarize(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::TimeFrame;
    use crate::domain::strategy::ParamSpec;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t(day: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(day)
    }

    fn series(n: usize) -> BarSeries {
        let bars = (0..n)
            .map(|i| Bar {
                index: i,
                time: t(i as i64),
                open: 10.0 + i as f64,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.5 + i as f64,
                volume: 100,
            })
            .collect();
        BarSeries::new(bars, TimeFrame::D1).unwrap()
    }

    /// Records what it saw; buys on bar `buy_at`.
    struct Recorder {
        seen: Vec<(usize, usize)>,
        inits: usize,
        buy_at: usize,
        instrument: Arc<Instrument>,
    }

    impl Recorder {
        fn new(buy_at: usize) -> Self {
            Recorder {
                seen: Vec::new(),
                inits: 0,
                buy_at,
                instrument: Arc::new(Instrument::shares("ABC", 0.01)),
            }
        }
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::new("buy_at", self.buy_at as f64, 0.0, 100.0, 1.0)]
        }

        fn init(&mut self, params: &Params) -> Result<(), TradelabError> {
            self.inits += 1;
            self.seen.clear();
            self.buy_at = params.get_usize("buy_at", self.buy_at);
            Ok(())
        }

        fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
            self.seen.push((bar.index, ctx.history().len()));
            if bar.index == self.buy_at {
                let instrument = Arc::clone(&self.instrument);
                ctx.market_order(&instrument, Side::Buy, bar.open, 1.0)?;
            }
            Ok(())
        }
    }

    #[test]
    fn handles_every_bar_in_order_without_look_ahead() {
        let bars = series(4);
        let mut strategy = Recorder::new(1);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let params = Params::resolve(&strategy.parameters(), &[]).unwrap();
        let mut engine = Engine::new(&bars);
        assert_eq!(engine.state(), RunState::Constructed);

        engine.run(&mut strategy, &params, &mut portfolio).unwrap();

        assert_eq!(engine.state(), RunState::Finished);
        assert_eq!(strategy.inits, 1);
        assert_eq!(strategy.seen, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
        assert_eq!(portfolio.positions.len(), 1);
        assert_eq!(portfolio.positions[0].open_bar_index, 1);
    }

    #[test]
    fn rerun_reinitialises_strategy() {
        let bars = series(3);
        let mut strategy = Recorder::new(0);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let params = Params::resolve(&strategy.parameters(), &[]).unwrap();
        run_backtest(&mut strategy, &params, &bars, &mut portfolio, None).unwrap();
        run_backtest(&mut strategy, &params, &bars, &mut portfolio, None).unwrap();
        assert_eq!(strategy.inits, 2);
        assert_eq!(strategy.seen.len(), 3);
        assert_eq!(portfolio.positions.len(), 1);
    }

    #[test]
    fn run_backtest_summarizes() {
        let bars = series(3);
        let mut strategy = Recorder::new(0);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let params = Params::resolve(&strategy.parameters(), &[("buy_at".into(), 0.0)]).unwrap();
        assert_eq!(params.get_usize("buy_at", 99), 0);
        let summary = run_backtest(&mut strategy, &params, &bars, &mut portfolio, None).unwrap();
        // bought at 10.0, force-closed at last open 12.0
        assert_relative_eq!(summary.performance.all.net_profit_abs, 2.0);
        assert_eq!(summary.curves.equity.len(), 3);
    }

    #[test]
    fn cancelled_run_stops_before_bars() {
        let bars = series(3);
        let mut strategy = Recorder::new(0);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let token = CancelToken::new();
        token.cancel();
        let err = Engine::new(&bars)
            .with_cancel(token)
            .run(&mut strategy, &Params::default(), &mut portfolio)
            .unwrap_err();
        assert!(matches!(err, TradelabError::Cancelled));
        assert!(strategy.seen.is_empty());
    }

    struct FutureOrder;

    impl Strategy for FutureOrder {
        fn name(&self) -> &str {
            "future_order"
        }

        fn init(&mut self, _params: &Params) -> Result<(), TradelabError> {
            Ok(())
        }

        fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
            let next = bar.time + Duration::days(1);
            let instrument = Arc::new(Instrument::shares("ABC", 0.01));
            ctx.open(OpenRequest::new(instrument, Side::Buy, bar.close, 1.0, next))?;
            Ok(())
        }
    }

    #[test]
    fn orders_in_the_future_are_rejected_with_context() {
        let bars = series(3);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let err = Engine::new(&bars)
            .run(&mut FutureOrder, &Params::default(), &mut portfolio)
            .unwrap_err();
        assert!(err.to_string().contains("future_order"));
        assert!(matches!(err.root(), TradelabError::InvalidState { .. }));
        assert!(portfolio.positions.is_empty());
    }

    struct Closer;

    impl Strategy for Closer {
        fn name(&self) -> &str {
            "closer"
        }

        fn init(&mut self, _params: &Params) -> Result<(), TradelabError> {
            Ok(())
        }

        fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
            ctx.close_latest(bar.close)?;
            Ok(())
        }
    }

    #[test]
    fn close_with_nothing_open_fails() {
        let bars = series(2);
        let mut portfolio = Portfolio::new(1_000.0, 1.0);
        let err = Engine::new(&bars)
            .run(&mut Closer, &Params::default(), &mut portfolio)
            .unwrap_err();
        assert!(matches!(err.root(), TradelabError::InvalidState { .. }));
    }
}
