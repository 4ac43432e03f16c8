//! Strategy plugin trait and its declared parameter schema.

use std::fmt;

use super::backtest::RunContext;
use super::error::TradelabError;
use super::ohlcv::Bar;

/// A user strategy driven bar by bar by the backtest engine.
///
/// `init` is called once before the first bar of every run and must reset all
/// strategy-local state; `handle` is then called once per bar in order.
pub trait Strategy {
    fn name(&self) -> &str;

    /// Optimizable parameters with their defaults.
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn init(&mut self, params: &Params) -> Result<(), TradelabError>;

    fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        (**self).parameters()
    }

    fn init(&mut self, params: &Params) -> Result<(), TradelabError> {
        (**self).init(params)
    }

    fn handle(&mut self, bar: &Bar, ctx: &mut RunContext<'_>) -> Result<(), TradelabError> {
        (**self).handle(bar, ctx)
    }
}

/// Declared numeric parameter: default value and inclusive search range.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, default: f64, min: f64, max: f64, step: f64) -> Self {
        ParamSpec {
            name: name.into(),
            default,
            min,
            max,
            step,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// `min, min + step, ..., max`.
    pub fn candidates(&self) -> Result<Vec<f64>, TradelabError> {
        if self.step <= 0.0 || self.max < self.min {
            return Ok(vec![self.default]);
        }
        let count = range_count(self.min, self.max, self.step).ok_or_else(|| {
            TradelabError::configuration(format!(
                "parameter '{}' range {}:{}:{} exceeds {MAX_RANGE_CANDIDATES} candidates",
                self.name, self.min, self.max, self.step
            ))
        })?;
        Ok((0..count).map(|i| self.min + self.step * i as f64).collect())
    }
}

/// Largest number of values a single `min:max:step` range may expand to.
pub const MAX_RANGE_CANDIDATES: usize = 1_000_000;

/// Number of values in the inclusive range `min..=max` by `step`.
///
/// `None` when the count is not finite or above [`MAX_RANGE_CANDIDATES`].
pub fn range_count(min: f64, max: f64, step: f64) -> Option<usize> {
    let count = ((max - min) / step + 1e-9).floor() + 1.0;
    if !count.is_finite() || count < 1.0 || count > MAX_RANGE_CANDIDATES as f64 {
        return None;
    }
    Some(count as usize)
}

/// Resolved parameter values in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, f64)>,
}

impl Params {
    /// Defaults from `specs`, overridden by `overrides`.
    ///
    /// Unknown names, non-finite values and values outside the declared range are
    /// configuration errors.
    pub fn resolve(
        specs: &[ParamSpec],
        overrides: &[(String, f64)],
    ) -> Result<Params, TradelabError> {
        let mut values: Vec<(String, f64)> =
            specs.iter().map(|s| (s.name.clone(), s.default)).collect();

        for (name, value) in overrides {
            let spec = specs.iter().find(|s| &s.name == name).ok_or_else(|| {
                TradelabError::configuration(format!("unknown parameter '{name}'"))
            })?;
            if !value.is_finite() {
                return Err(TradelabError::configuration(format!(
                    "parameter '{name}' has non-numeric value {value}"
                )));
            }
            if !spec.contains(*value) {
                return Err(TradelabError::configuration(format!(
                    "parameter '{name}' = {value} is outside [{}, {}]",
                    spec.min, spec.max
                )));
            }
            if let Some(slot) = values.iter_mut().find(|(n, _)| n == name) {
                slot.1 = *value;
            }
        }
        Ok(Params { values })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Integer view of a parameter, rounded to the nearest whole number.
    pub fn get_usize(&self, name: &str, default: usize) -> usize {
        self.get(name)
            .map(|v| v.round().max(0.0) as usize)
            .unwrap_or(default)
    }

    pub fn values(&self) -> &[(String, f64)] {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<(String, f64)> {
        self.values.clone()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
