//! CSV bar source.
//!
//! Expects a header row followed by `time,open,high,low,close,volume` records.
//! Empty price cells are filled by linear interpolation over the row index.

use crate::domain::error::TradelabError;
use crate::domain::ohlcv::{Bar, BarSeries, TimeFrame};
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use std::path::PathBuf;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    path: PathBuf,
    default_timeframe: TimeFrame,
}

/// One parsed row before gaps are filled.
struct RawRow {
    time: NaiveDateTime,
    prices: [Option<f64>; 4],
    volume: i64,
}

impl CsvAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_timeframe: TimeFrame::D1,
        }
    }

    /// Timeframe used when the series is too short to infer one.
    pub fn with_timeframe(mut self, timeframe: TimeFrame) -> Self {
        self.default_timeframe = timeframe;
        self
    }

    fn read_rows(&self) -> Result<Vec<RawRow>, TradelabError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| TradelabError::Data {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut rows = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| TradelabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            // header is line 1
            let row = line + 2;

            let time_str = record.get(0).ok_or_else(|| TradelabError::Data {
                reason: format!("row {row}: missing time column"),
            })?;
            let time = parse_time(time_str).ok_or_else(|| TradelabError::Data {
                reason: format!("row {row}: invalid time '{time_str}'"),
            })?;

            let mut prices = [None; 4];
            for (i, name) in ["open", "high", "low", "close"].iter().enumerate() {
                prices[i] = parse_cell(record.get(i + 1), name, row)?;
            }
            let volume = match record.get(5).filter(|v| !v.is_empty()) {
                Some(v) => v.parse::<f64>().map_err(|e| TradelabError::Data {
                    reason: format!("row {row}: invalid volume value: {e}"),
                })? as i64,
                None => 0,
            };

            rows.push(RawRow {
                time,
                prices,
                volume,
            });
        }
        Ok(rows)
    }
}

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_cell(cell: Option<&str>, name: &str, row: usize) -> Result<Option<f64>, TradelabError> {
    match cell.filter(|c| !c.is_empty()) {
        None => Ok(None),
        Some(c) => c
            .parse::<f64>()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .map_err(|e| TradelabError::Data {
                reason: format!("row {row}: invalid {name} value: {e}"),
            }),
    }
}

/// Fill gaps linearly between known neighbours; leading and trailing gaps
/// take the nearest known value.
fn interpolate(column: &[Option<f64>]) -> Option<Vec<f64>> {
    let known: Vec<(usize, f64)> = column
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    let (&(first_i, first_v), &(last_i, last_v)) = (known.first()?, known.last()?);

    let mut filled = Vec::with_capacity(column.len());
    let mut next = 0;
    for (i, value) in column.iter().enumerate() {
        if let Some(v) = value {
            filled.push(*v);
            next += 1;
            continue;
        }
        let v = if i < first_i {
            first_v
        } else if i > last_i {
            last_v
        } else {
            let (li, lv) = known[next - 1];
            let (ri, rv) = known[next];
            lv + (rv - lv) * (i - li) as f64 / (ri - li) as f64
        };
        filled.push(v);
    }
    Some(filled)
}

impl DataPort for CsvAdapter {
    fn load_bars(&self) -> Result<BarSeries, TradelabError> {
        let mut rows = self.read_rows()?;
        if rows.is_empty() {
            return Err(TradelabError::Data {
                reason: format!("{} contains no bars", self.path.display()),
            });
        }
        rows.sort_by_key(|r| r.time);

        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(4);
        for (i, name) in ["open", "high", "low", "close"].iter().enumerate() {
            let column: Vec<Option<f64>> = rows.iter().map(|r| r.prices[i]).collect();
            let gaps = column.iter().filter(|v| v.is_none()).count();
            if gaps > 0 {
                debug!("interpolating {gaps} missing {name} values");
            }
            columns.push(interpolate(&column).ok_or_else(|| TradelabError::Data {
                reason: format!("column {name} has no values"),
            })?);
        }

        let bars = rows
            .iter()
            .enumerate()
            .map(|(index, row)| Bar {
                index,
                time: row.time,
                open: columns[0][index],
                high: columns[1][index],
                low: columns[2][index],
                close: columns[3][index],
                volume: row.volume,
            })
            .collect();

        let series = BarSeries::new(bars, self.default_timeframe)?;
        debug!(
            "loaded {} bars from {} ({:?})",
            series.len(),
            self.path.display(),
            series.timeframe()
        );
        Ok(series)
    }
}
