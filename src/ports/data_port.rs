//! Bar source port.

use crate::domain::error::TradelabError;
use crate::domain::ohlcv::BarSeries;

/// Anything that can produce an immutable, validated bar series.
pub trait DataPort {
    fn load_bars(&self) -> Result<BarSeries, TradelabError>;
}
