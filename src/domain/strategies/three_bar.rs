//! Reversal strategy: go long after N consecutive rising bars, short after N
//! consecutive falling bars.

use std::sync::Arc;

use crate::domain::backtest::RunContext;
use crate::domain::error::TradelabError;
use crate::domain::instrument::Instrument;
use crate::domain::ohlcv::Bar;
use crate::domain::portfolio::{CloseRequest, OpenRequest};
use crate::domain::position::{Side, Ticket};
use crate::domain::strategy::{ParamSpec, Params, Strategy};

pub const NAME: &str = "three_bar";

const DEFAULT_BARS: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct ThreeBarStrategy {
    instrument: Arc<Instrument>,
    volume: f64,
    high_bars: usize,
    low_bars: usize,
    seq_high: usize,
    seq_low: usize,
    signal: Option<Side>,
    last: Option<(Ticket, Side)>,
}

impl ThreeBarStrategy {
    pub fn new(instrument: Arc<Instrument>, volume: f64) -> Self {
        ThreeBarStrategy {
            instrument,
            volume,
            high_bars: DEFAULT_BARS as usize,
            low_bars: DEFAULT_BARS as usize,
            seq_high: 0,
            seq_low: 0,
            signal: None,
            last: None,
        }
    }

    /// Act on the signal raised by the previous bar, at this bar's open.
    fn execute(
        &mut self,
        side: Side,
        bar: &Bar,
        ctx: &mut RunContext<'_>,
    ) -> Result<(), TradelabError> {
        let instrument = Arc::clone(&self.instrument);
        let request = OpenRequest::new(instrument, side, bar.open, self.volume, bar.time)
            .with_label(format!("{} bars", self.streak_for(side)));
        match self.last {
            None => {
                self.last = Some((ctx.open(request)?, side));
            }
            Some((ticket, held)) if held != side => {
                ctx.close(ticket, CloseRequest::new(bar.open, bar.time).with_label("reverse"))?;
                self.last = Some((ctx.open(request)?, side));
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn streak_for(&self, side: Side) -> usize {
        match side {
            Side::Buy => self.high_bars,
            Side::Sell => self.low_bars,
        }
    }
}

impl Strategy for ThreeBarStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::new("high_bars", DEFAULT_BARS, 1.0, 10.0, 1.0),
            ParamSpec::new("low_bars", DEFAULT_BARS, 1.0, 10.0, 1.0),
        ]
    }

    fn init(&mut self, params: &Params) -> Result<(), TradelabError> {
        self.high_bars = params.get_usize("high_bars", DEFAULT_BARS as usize);
        self.low_bars = params.get_usize("low_bars", DEFAULT_BARS as usize);
        self.seq_high = 0;
        self.seq_low = 0;
        self.signal = None;
        self.last = None;
        Ok(())
    }

    fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
        if let Some(side) = self.signal.take() {
            self.execute(side, bar, ctx)?;
            self.seq_high = 0;
            self.seq_low = 0;
        }

        if bar.close > bar.open {
            self.seq_high += 1;
            self.seq_low = 0;
        } else {
            self.seq_high = 0;
            self.seq_low += 1;
        }

        if self.seq_high == self.high_bars {
            self.signal = Some(Side::Buy);
        } else if self.seq_low == self.low_bars {
            self.signal = Some(Side::Sell);
        }
        Ok(())
    }
}
