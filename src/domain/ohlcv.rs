//! OHLCV bars and the bar series that serves as the shared time axis.

use chrono::NaiveDateTime;

use super::error::TradelabError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub index: usize,
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Bar spacing of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN,
}

impl TimeFrame {
    pub fn from_minutes(minutes: i64) -> Option<TimeFrame> {
        match minutes {
            1 => Some(TimeFrame::M1),
            5 => Some(TimeFrame::M5),
            15 => Some(TimeFrame::M15),
            30 => Some(TimeFrame::M30),
            60 => Some(TimeFrame::H1),
            240 => Some(TimeFrame::H4),
            1440 => Some(TimeFrame::D1),
            10080 => Some(TimeFrame::W1),
            _ => None,
        }
    }
}

/// Ordered, immutable sequence of bars with contiguous 0-based indices.
#[derive(Debug, Clone)]
pub struct BarSeries {
    bars: Vec<Bar>,
    timeframe: TimeFrame,
}

impl BarSeries {
    /// Build a series, checking index contiguity, strictly increasing time
    /// and the absence of NaN prices.
    pub fn new(bars: Vec<Bar>, default_timeframe: TimeFrame) -> Result<Self, TradelabError> {
        if bars.is_empty() {
            return Err(TradelabError::degenerate("bar series is empty"));
        }
        for (i, bar) in bars.iter().enumerate() {
            if bar.index != i {
                return Err(TradelabError::degenerate(format!(
                    "bar at position {i} has index {}",
                    bar.index
                )));
            }
            if [bar.open, bar.high, bar.low, bar.close]
                .iter()
                .any(|v| v.is_nan())
            {
                return Err(TradelabError::degenerate(format!(
                    "bar {i} contains a NaN price"
                )));
            }
            if i > 0 && bar.time <= bars[i - 1].time {
                return Err(TradelabError::degenerate(format!(
                    "bar {i} at {} is not after bar {}",
                    bar.time,
                    i - 1
                )));
            }
        }
        let timeframe = infer_timeframe(&bars).unwrap_or(default_timeframe);
        Ok(BarSeries { bars, timeframe })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    /// Bars up to and including `index`.
    pub fn history(&self, index: usize) -> &[Bar] {
        let end = (index + 1).min(self.bars.len());
        &self.bars[..end]
    }

    /// Index of the bar whose time equals `time` exactly.
    pub fn index_of(&self, time: NaiveDateTime) -> Result<usize, TradelabError> {
        self.bars
            .binary_search_by(|bar| bar.time.cmp(&time))
            .map_err(|_| TradelabError::BarNotFound { time })
    }

    /// (min low, max high) over bars `from..=to`.
    pub fn extremes(&self, from: usize, to: usize) -> (f64, f64) {
        let to = to.min(self.bars.len() - 1);
        let from = from.min(to);
        self.bars[from..=to]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), bar| {
                (lo.min(bar.low), hi.max(bar.high))
            })
    }

    /// Close-to-close percentage changes, paired with the later bar's time.
    pub fn close_returns_pct(&self) -> Vec<(NaiveDateTime, f64)> {
        self.bars
            .windows(2)
            .map(|w| {
                let change = if w[0].close != 0.0 {
                    (w[1].close - w[0].close) / w[0].close * 100.0
                } else {
                    0.0
                };
                (w[1].time, change)
            })
            .collect()
    }
}

/// Smallest spacing among the last ten bars, mapped onto a known timeframe.
fn infer_timeframe(bars: &[Bar]) -> Option<TimeFrame> {
    let tail = &bars[bars.len().saturating_sub(10)..];
    let minutes = tail
        .windows(2)
        .map(|w| (w[1].time - w[0].time).num_minutes())
        .min()?;
    TimeFrame::from_minutes(minutes)
}
