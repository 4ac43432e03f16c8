//! Configuration validation and loading.
//!
//! Validates the INI sections before a run and turns them into domain values:
//! `[backtest]`, `[instrument]`, `[strategy]` and the optional `[optimize]` grid.

use std::sync::Arc;

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::TradelabError;
use crate::domain::instrument::{Instrument, InstrumentClass};
use crate::domain::optimizer::ParamGrid;
use crate::domain::portfolio::{DEFAULT_INITIAL_BALANCE, DEFAULT_LEVERAGE};
use crate::domain::strategies::StrategyKind;
use crate::domain::strategy::{range_count, MAX_RANGE_CANDIDATES};
use crate::ports::config_port::ConfigPort;

/// Keys of `[strategy]` that are not strategy parameters.
const STRATEGY_RESERVED_KEYS: &[&str] = &["name", "volume"];

pub const DEFAULT_VOLUME: f64 = 1.0;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TradelabError {
    TradelabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> TradelabError {
    TradelabError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, TradelabError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(section, key)),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let balance = config.get_double("backtest", "initial_balance", DEFAULT_INITIAL_BALANCE);
    if balance <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_balance",
            "initial_balance must be positive",
        ));
    }
    let leverage = config.get_double("backtest", "leverage", DEFAULT_LEVERAGE);
    if leverage <= 0.0 {
        return Err(invalid("backtest", "leverage", "leverage must be positive"));
    }
    Ok(())
}

pub fn validate_instrument_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    required_string(config, "instrument", "ticker")?;

    let class_name = required_string(config, "instrument", "class")?;
    let class = InstrumentClass::parse(&class_name).ok_or_else(|| {
        invalid(
            "instrument",
            "class",
            format!("unknown instrument class '{class_name}'"),
        )
    })?;

    if config.get_double("instrument", "tick_size", 0.0) <= 0.0 {
        return Err(invalid("instrument", "tick_size", "tick_size must be positive"));
    }

    if class == InstrumentClass::Futures
        && config.get_double("instrument", "tick_value", 0.0) <= 0.0
    {
        return Err(invalid(
            "instrument",
            "tick_value",
            "futures require a positive tick_value",
        ));
    }

    if config.get_string("instrument", "contract_size").is_some()
        && config.get_int("instrument", "contract_size", 0) <= 0
    {
        return Err(invalid(
            "instrument",
            "contract_size",
            "contract_size must be a positive integer",
        ));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    let name = required_string(config, "strategy", "name")?;
    StrategyKind::parse(&name).map_err(|e| invalid("strategy", "name", e.to_string()))?;

    if config.get_double("strategy", "volume", DEFAULT_VOLUME) <= 0.0 {
        return Err(invalid("strategy", "volume", "volume must be positive"));
    }
    strategy_overrides(config)?;
    Ok(())
}

/// Run every section check that applies to a plain backtest.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TradelabError> {
    validate_backtest_config(config)?;
    validate_instrument_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

pub fn load_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    BacktestConfig {
        initial_balance: config.get_double("backtest", "initial_balance", DEFAULT_INITIAL_BALANCE),
        leverage: config.get_double("backtest", "leverage", DEFAULT_LEVERAGE),
        parallel: config.get_bool("backtest", "parallel", false),
    }
}

pub fn load_instrument(config: &dyn ConfigPort) -> Result<Arc<Instrument>, TradelabError> {
    validate_instrument_config(config)?;
    let ticker = required_string(config, "instrument", "ticker")?;
    let class_name = required_string(config, "instrument", "class")?;
    let class = InstrumentClass::parse(&class_name)
        .ok_or_else(|| invalid("instrument", "class", "unknown instrument class"))?;

    let tick_value = config
        .get_string("instrument", "tick_value")
        .map(|_| config.get_double("instrument", "tick_value", 0.0));
    let contract_size = config
        .get_string("instrument", "contract_size")
        .map(|_| config.get_int("instrument", "contract_size", 0));

    Ok(Arc::new(Instrument::new(
        ticker,
        class,
        config.get_double("instrument", "tick_size", 0.0),
        tick_value,
        contract_size,
    )))
}

/// Strategy name and order volume from `[strategy]`.
pub fn load_strategy_kind(config: &dyn ConfigPort) -> Result<(StrategyKind, f64), TradelabError> {
    let name = required_string(config, "strategy", "name")?;
    let kind = StrategyKind::parse(&name).map_err(|e| invalid("strategy", "name", e.to_string()))?;
    Ok((kind, config.get_double("strategy", "volume", DEFAULT_VOLUME)))
}

/// Parameter overrides: every `[strategy]` key other than name and volume.
pub fn strategy_overrides(config: &dyn ConfigPort) -> Result<Vec<(String, f64)>, TradelabError> {
    config
        .keys("strategy")
        .into_iter()
        .filter(|key| !STRATEGY_RESERVED_KEYS.contains(&key.as_str()))
        .map(|key| {
            let raw = config.get_string("strategy", &key).unwrap_or_default();
            let value = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid("strategy", &key, format!("'{raw}' is not a number")))?;
            Ok((key, value))
        })
        .collect()
}

/// Parameter grid from `[optimize]`, keys in file order.
pub fn load_param_grid(config: &dyn ConfigPort) -> Result<ParamGrid, TradelabError> {
    if !config.has_section("optimize") {
        return Err(missing("optimize", "*"));
    }
    let mut grid = ParamGrid::new();
    for key in config.keys("optimize") {
        let raw = config.get_string("optimize", &key).unwrap_or_default();
        let candidates = parse_candidates(&raw).map_err(|e| TradelabError::Configuration {
            reason: format!("[optimize] {key}: {e}"),
        })?;
        grid = grid.axis(key, candidates);
    }
    grid.validate()?;
    Ok(grid)
}

/// Candidate list: `a,b,c` or an inclusive `min:max:step` range.
pub fn parse_candidates(raw: &str) -> Result<Vec<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("no candidate values".to_string());
    }

    let number = |s: &str| -> Result<f64, String> {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{}' is not a number", s.trim()))
    };

    if raw.contains(':') {
        let parts: Vec<&str> = raw.split(':').collect();
        let [min, max, step] = parts.as_slice() else {
            return Err(format!("range '{raw}' must be min:max:step"));
        };
        let (min, max, step) = (number(*min)?, number(*max)?, number(*step)?);
        if step <= 0.0 {
            return Err(format!("range step {step} must be positive"));
        }
        if max < min {
            return Err(format!("range {min}:{max} is empty"));
        }
        let count = range_count(min, max, step).ok_or_else(|| {
            format!("range {min}:{max}:{step} exceeds {MAX_RANGE_CANDIDATES} candidates")
        })?;
        return Ok((0..count).map(|i| min + step * i as f64).collect());
    }

    raw.split(',').map(number).collect()
}
