//! Exhaustive parameter-grid optimization.
//!
//! Every combination of candidate values is run as an independent trial on a
//! clean ledger and condensed into one [`BriefPerformance`] row. Rows follow
//! combination order: the first grid parameter is the outermost loop and the
//! last one varies fastest.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::time::Instant;

use super::backtest::{CancelToken, Engine};
use super::error::TradelabError;
use super::metrics::BriefPerformance;
use super::ohlcv::BarSeries;
use super::portfolio::Portfolio;
use super::strategy::{ParamSpec, Params, Strategy};

/// Ordered mapping of parameter name to candidate values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter axis. Axes keep insertion order.
    pub fn axis(mut self, name: impl Into<String>, candidates: Vec<f64>) -> Self {
        self.axes.push((name.into(), candidates));
        self
    }

    /// One axis per declared parameter, spanning its range.
    pub fn from_specs(specs: &[ParamSpec]) -> Result<Self, TradelabError> {
        let axes = specs
            .iter()
            .map(|s| Ok((s.name.clone(), s.candidates()?)))
            .collect::<Result<_, TradelabError>>()?;
        Ok(ParamGrid { axes })
    }

    pub fn axes(&self) -> &[(String, Vec<f64>)] {
        &self.axes
    }

    /// Number of combinations: the product of the candidate counts.
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, c)| c.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject empty grids, empty or non-finite candidate lists and duplicate names.
    pub fn validate(&self) -> Result<(), TradelabError> {
        if self.axes.is_empty() {
            return Err(TradelabError::configuration("parameter grid is empty"));
        }
        for (i, (name, candidates)) in self.axes.iter().enumerate() {
            if candidates.is_empty() {
                return Err(TradelabError::configuration(format!(
                    "parameter '{name}' has no candidate values"
                )));
            }
            if let Some(bad) = candidates.iter().find(|v| !v.is_finite()) {
                return Err(TradelabError::configuration(format!(
                    "parameter '{name}' has non-numeric candidate {bad}"
                )));
            }
            if self.axes[..i].iter().any(|(other, _)| other == name) {
                return Err(TradelabError::configuration(format!(
                    "parameter '{name}' appears twice in the grid"
                )));
            }
        }
        Ok(())
    }

    /// Cartesian product in row order.
    pub fn combinations(&self) -> Vec<Vec<(String, f64)>> {
        let total = self.len();
        let mut rows = Vec::with_capacity(total);
        let mut cursor = vec![0usize; self.axes.len()];
        for _ in 0..total {
            rows.push(
                self.axes
                    .iter()
                    .zip(&cursor)
                    .map(|((name, candidates), &i)| (name.clone(), candidates[i]))
                    .collect(),
            );
            for axis in (0..cursor.len()).rev() {
                cursor[axis] += 1;
                if cursor[axis] < self.axes[axis].1.len() {
                    break;
                }
                cursor[axis] = 0;
            }
        }
        rows
    }
}

fn format_combination(combination: &[(String, f64)]) -> String {
    combination
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One trial on a clean ledger: run, realize, condense.
fn run_trial(
    strategy: &mut dyn Strategy,
    combination: &[(String, f64)],
    bars: &BarSeries,
    portfolio: &mut Portfolio,
    cancel: &CancelToken,
) -> Result<BriefPerformance, TradelabError> {
    portfolio.clear();
    let params = Params::resolve(&strategy.parameters(), combination)?;
    Engine::new(bars)
        .with_cancel(cancel.clone())
        .run(strategy, &params, portfolio)?;
    portfolio.close_all_open(bars)?;
    let row = BriefPerformance::compute(
        combination.to_vec(),
        &portfolio.positions,
        portfolio.initial_balance(),
    );
    portfolio.clear();
    Ok(row)
}

/// Turn a trial result into a row; failed trials are flagged, cancellation aborts.
fn settle(
    combination: Vec<(String, f64)>,
    result: Result<BriefPerformance, TradelabError>,
) -> Result<BriefPerformance, TradelabError> {
    match result {
        Ok(row) => Ok(row),
        Err(TradelabError::Cancelled) => Err(TradelabError::Cancelled),
        Err(err) => {
            warn!(
                "skipping combination [{}]: {err}",
                format_combination(&combination)
            );
            Ok(BriefPerformance::failed(combination, err.to_string()))
        }
    }
}

impl Portfolio {
    /// Run `strategy` once per grid combination and store one brief row each.
    ///
    /// Balance and positions are set aside for the duration and restored
    /// afterwards. A failing trial is recorded as a flagged row and the grid
    /// continues; cancellation between trials aborts the whole run.
    pub fn run_optimization(
        &mut self,
        strategy: &mut dyn Strategy,
        grid: &ParamGrid,
        bars: &BarSeries,
        cancel: Option<&CancelToken>,
    ) -> Result<&[BriefPerformance], TradelabError> {
        grid.validate()?;
        let started = Instant::now();
        let cancel = cancel.cloned().unwrap_or_default();
        let combinations = grid.combinations();

        let rows = self.with_optimization_scope(|portfolio| {
            let mut rows = Vec::with_capacity(combinations.len());
            for combination in combinations {
                cancel.check()?;
                debug!("optimization trial [{}]", format_combination(&combination));
                let result = run_trial(&mut *strategy, &combination, bars, portfolio, &cancel);
                portfolio.clear();
                rows.push(settle(combination, result)?);
            }
            Ok::<_, TradelabError>(rows)
        })?;

        info!(
            "optimization of {} finished: {} combinations in {:.2?}",
            strategy.name(),
            rows.len(),
            started.elapsed()
        );
        self.brief_performance = rows;
        Ok(&self.brief_performance)
    }
}

/// Evaluate the grid on a thread pool.
///
/// Each trial builds its own strategy with `factory` and its own portfolio
/// seeded with `initial_balance`; only the bar series is shared.
pub fn run_optimization_parallel<S, F>(
    factory: F,
    grid: &ParamGrid,
    bars: &BarSeries,
    initial_balance: f64,
    leverage: f64,
    cancel: Option<&CancelToken>,
) -> Result<Vec<BriefPerformance>, TradelabError>
where
    S: Strategy,
    F: Fn() -> S + Sync,
{
    grid.validate()?;
    let started = Instant::now();
    let cancel = cancel.cloned().unwrap_or_default();

    let rows = grid
        .combinations()
        .into_par_iter()
        .map(|combination| {
            cancel.check()?;
            let mut strategy = factory();
            let mut portfolio = Portfolio::new(initial_balance, leverage);
            let result = run_trial(&mut strategy, &combination, bars, &mut portfolio, &cancel);
            settle(combination, result)
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "parallel optimization finished: {} combinations in {:.2?}",
        rows.len(),
        started.elapsed()
    );
    Ok(rows)
}
