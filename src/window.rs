//! Harvest phase windowing.
//!
//! Slices a full-year histogram series down to the configured harvest phase
//! window, optionally keeping only a leading fraction of the season to model
//! early-season prediction. Missing periods are a data gap, never imputed.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use thiserror::Error;
use time::{Date, Month};

use crate::histstore::HistogramSeries;

/// A month-day pair, parsed from `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthDay {
    /// Calendar month, 1 through 12.
    pub month: u8,
    /// Day of month, 1 through 31.
    pub day: u8,
}

impl MonthDay {
    /// One-based day of year for `year`.
    ///
    /// A day past the end of the month (Feb 29 outside leap years) clamps to
    /// the month's last day.
    pub fn day_of_year(self, year: i32) -> u16 {
        let month = Month::try_from(self.month).expect("month validated on parse");
        let day = self.day.min(month.length(year));
        Date::from_calendar_date(year, month, day)
            .expect("clamped day is valid for month")
            .ordinal()
    }
}

impl FromStr for MonthDay {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (month_text, day_text) = text
            .split_once('-')
            .ok_or_else(|| format!("expected MM-DD, got {text:?}"))?;
        let month: u8 = month_text
            .parse()
            .map_err(|_| format!("invalid month in {text:?}"))?;
        let day: u8 = day_text
            .parse()
            .map_err(|_| format!("invalid day in {text:?}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in {text:?}"));
        }
        let max_day = Month::try_from(month)
            .expect("month range checked")
            .length(2000);
        if day < 1 || day > max_day {
            return Err(format!("day out of range in {text:?}"));
        }
        Ok(Self { month, day })
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl<'de> Deserialize<'de> for MonthDay {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Resolved harvest window parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    /// First month-day of the harvest phase.
    pub phase_begin: MonthDay,
    /// Last month-day of the harvest phase (inclusive).
    pub phase_end: MonthDay,
    /// Leading fraction of the phase window to retain, in `(0, 1]`.
    pub season_frac: f64,
}

/// Composite period index range selected by a window for one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    /// First period index (zero-based from Jan 1).
    pub first: usize,
    /// Periods spanned by the full phase window.
    pub full_len: usize,
    /// Periods retained after applying the season fraction (rounded down).
    pub retained: usize,
}

/// Errors produced while windowing a histogram series.
#[derive(Debug, Error)]
pub enum WindowError {
    /// The store's series ends before the retained window.
    #[error(
        "histogram series for {region} {year} has {available} periods, window needs {needed}"
    )]
    DataGap {
        /// Region whose series is short.
        region: String,
        /// Harvest year.
        year: i32,
        /// Periods required by the retained window.
        needed: usize,
        /// Periods present in the series.
        available: usize,
    },
}

impl WindowSpec {
    /// Map the phase window onto composite period indices for `year`.
    pub fn period_range(&self, year: i32, composite_days: u8) -> PeriodRange {
        let composite = usize::from(composite_days.max(1));
        let begin_doy = usize::from(self.phase_begin.day_of_year(year));
        let end_doy = usize::from(self.phase_end.day_of_year(year));
        let first = (begin_doy - 1) / composite;
        let last = (end_doy - 1) / composite;
        let full_len = last - first + 1;
        let retained = if self.season_frac >= 1.0 {
            full_len
        } else {
            (self.season_frac * full_len as f64).floor() as usize
        };
        PeriodRange {
            first,
            full_len,
            retained,
        }
    }
}

/// A windowed slice of one region-year series.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Periods retained.
    pub periods: usize,
    /// Period-major values, `periods x bands x bins`.
    pub values: Vec<f32>,
}

/// Slice `series` to the harvest window described by `spec`.
pub fn window_series(series: &HistogramSeries, spec: &WindowSpec) -> Result<Window, WindowError> {
    let range = spec.period_range(series.year, series.shape.composite_days);
    let needed = range.first + range.retained;
    let available = series.periods();
    if needed > available {
        return Err(WindowError::DataGap {
            region: series.region.clone(),
            year: series.year,
            needed,
            available,
        });
    }
    let stride = series.shape.period_len();
    let start = range.first * stride;
    let end = needed * stride;
    Ok(Window {
        periods: range.retained,
        values: series.values[start..end].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histstore::HistogramShape;

    fn series(periods: usize, shape: HistogramShape) -> HistogramSeries {
        let stride = shape.period_len();
        HistogramSeries {
            region: "Adams".to_string(),
            year: 2010,
            shape,
            values: (0..periods * stride).map(|v| v as f32).collect(),
        }
    }

    fn spec(begin: &str, end: &str, frac: f64) -> WindowSpec {
        WindowSpec {
            phase_begin: begin.parse().unwrap(),
            phase_end: end.parse().unwrap(),
            season_frac: frac,
        }
    }

    #[test]
    fn month_day_parses_and_orders() {
        let begin: MonthDay = "04-01".parse().unwrap();
        let end: MonthDay = "09-30".parse().unwrap();
        assert!(begin < end);
        assert_eq!(begin.to_string(), "04-01");
    }

    #[test]
    fn month_day_rejects_bad_input() {
        assert!("13-01".parse::<MonthDay>().is_err());
        assert!("02-30".parse::<MonthDay>().is_err());
        assert!("0401".parse::<MonthDay>().is_err());
    }

    #[test]
    fn feb_29_clamps_outside_leap_years() {
        let md: MonthDay = "02-29".parse().unwrap();
        assert_eq!(md.day_of_year(2004), 60);
        assert_eq!(md.day_of_year(2010), 59);
    }

    #[test]
    fn period_range_covers_phase_window() {
        // Apr 1 = doy 91, Sep 30 = doy 273 in a non-leap year.
        let range = spec("04-01", "09-30", 1.0).period_range(2010, 8);
        assert_eq!(range.first, 11);
        assert_eq!(range.full_len, 24);
        assert_eq!(range.retained, 24);
    }

    #[test]
    fn window_length_is_stable_across_leap_years() {
        let s = spec("04-01", "09-30", 1.0);
        let normal = s.period_range(2010, 1);
        let leap = s.period_range(2012, 1);
        assert_eq!(normal.full_len, leap.full_len);
    }

    #[test]
    fn season_frac_keeps_leading_half_rounded_down() {
        let s = spec("04-01", "09-30", 1.0);
        let half = spec("04-01", "09-30", 0.5);
        let full = s.period_range(2010, 8);
        let frac = half.period_range(2010, 8);
        assert_eq!(frac.retained, full.full_len / 2);
        assert_eq!(frac.first, full.first);
    }

    #[test]
    fn window_series_slices_retained_periods() {
        let shape = HistogramShape {
            bands: 2,
            bins: 3,
            composite_days: 8,
        };
        let s = series(46, shape);
        let window = window_series(&s, &spec("04-01", "09-30", 1.0)).unwrap();
        assert_eq!(window.periods, 24);
        assert_eq!(window.values.len(), 24 * shape.period_len());
        // First retained value is the start of period 11.
        assert_eq!(window.values[0], (11 * shape.period_len()) as f32);
    }

    #[test]
    fn short_series_is_a_data_gap() {
        let shape = HistogramShape {
            bands: 1,
            bins: 4,
            composite_days: 8,
        };
        let s = series(20, shape);
        let err = window_series(&s, &spec("04-01", "09-30", 1.0)).unwrap_err();
        match err {
            WindowError::DataGap {
                needed, available, ..
            } => {
                assert_eq!(needed, 35);
                assert_eq!(available, 20);
            }
        }
    }
}
