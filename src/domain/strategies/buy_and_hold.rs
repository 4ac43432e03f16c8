//! Baseline strategy: buy at the open of a chosen bar and hold to the end.

use std::sync::Arc;

use crate::domain::backtest::RunContext;
use crate::domain::error::TradelabError;
use crate::domain::instrument::Instrument;
use crate::domain::ohlcv::Bar;
use crate::domain::position::Side;
use crate::domain::strategy::{ParamSpec, Params, Strategy};

pub const NAME: &str = "buy_and_hold";

#[derive(Debug, Clone)]
pub struct BuyAndHoldStrategy {
    instrument: Arc<Instrument>,
    volume: f64,
    entry_bar: usize,
    entered: bool,
}

impl BuyAndHoldStrategy {
    pub fn new(instrument: Arc<Instrument>, volume: f64) -> Self {
        BuyAndHoldStrategy {
            instrument,
            volume,
            entry_bar: 0,
            entered: false,
        }
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new("entry_bar", 0.0, 0.0, 1_000.0, 1.0)]
    }

    fn init(&mut self, params: &Params) -> Result<(), TradelabError> {
        self.entry_bar = params.get_usize("entry_bar", 0);
        self.entered = false;
        Ok(())
    }

    fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
        if !self.entered && bar.index >= self.entry_bar {
            ctx.market_order(&self.instrument, Side::Buy, bar.open, self.volume)?;
            self.entered = true;
        }
        Ok(())
    }
}
