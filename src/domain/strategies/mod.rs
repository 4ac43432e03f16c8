//! Built-in strategies and the name registry used by the CLI.

pub mod buy_and_hold;
pub mod three_bar;

use std::sync::Arc;

use super::error::TradelabError;
use super::instrument::Instrument;
use super::strategy::Strategy;

pub use buy_and_hold::BuyAndHoldStrategy;
pub use three_bar::ThreeBarStrategy;

/// Names accepted by [`StrategyKind::parse`].
pub const STRATEGY_NAMES: &[&str] = &[three_bar::NAME, buy_and_hold::NAME];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ThreeBar,
    BuyAndHold,
}

impl StrategyKind {
    pub fn parse(name: &str) -> Result<StrategyKind, TradelabError> {
        match name.trim().to_ascii_lowercase().as_str() {
            three_bar::NAME => Ok(StrategyKind::ThreeBar),
            buy_and_hold::NAME => Ok(StrategyKind::BuyAndHold),
            other => Err(TradelabError::configuration(format!(
                "unknown strategy '{other}' (expected one of: {})",
                STRATEGY_NAMES.join(", ")
            ))),
        }
    }

    pub fn build(self, instrument: Arc<Instrument>, volume: f64) -> Box<dyn Strategy + Send> {
        match self {
            StrategyKind::ThreeBar => Box::new(ThreeBarStrategy::new(instrument, volume)),
            StrategyKind::BuyAndHold => Box::new(BuyAndHoldStrategy::new(instrument, volume)),
        }
    }
}

/// Instantiate a built-in strategy by name.
pub fn create_strategy(
    name: &str,
    instrument: Arc<Instrument>,
    volume: f64,
) -> Result<Box<dyn Strategy + Send>, TradelabError> {
    Ok(StrategyKind::parse(name)?.build(instrument, volume))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names() {
        let instrument = Arc::new(Instrument::shares("ABC", 0.01));
        let strategy = create_strategy("Three_Bar", Arc::clone(&instrument), 1.0).unwrap();
        assert_eq!(strategy.name(), "three_bar");
        assert_eq!(strategy.parameters().len(), 2);
        let strategy = create_strategy("buy_and_hold", instrument, 1.0).unwrap();
        assert_eq!(strategy.name(), "buy_and_hold");
    }

    #[test]
    fn registry_rejects_unknown_name() {
        let err = StrategyKind::parse("martingale").unwrap_err();
        assert!(matches!(err, TradelabError::Configuration { .. }));
        assert!(err.to_string().contains("three_bar"));
    }
}
