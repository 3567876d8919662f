//! Analysis configuration
//!
//! The configuration is a plain value passed into the pipeline. Loading it from
//! files or the environment is left to the caller.

use crate::error::ComputeError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Default analysis window in days
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Default |r| a correlation must reach to be significant
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.5;

/// Longest accepted analysis window in days
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// Default minimum number of day pairs for a defined correlation
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 5;

/// Default timeout for the language-model call
pub const DEFAULT_INSIGHT_TIMEOUT_SECS: u64 = 60;

/// Weights applied to sleep stage proportions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepStageWeights {
    pub deep: f64,
    pub rem: f64,
    pub light: f64,
    /// Usually negative (penalty)
    pub awake: f64,
}

impl Default for SleepStageWeights {
    fn default() -> Self {
        Self {
            deep: 0.5,
            rem: 0.3,
            light: 0.15,
            awake: -0.2,
        }
    }
}

impl SleepStageWeights {
    /// Largest weight; a night spent entirely in that stage scores 100
    pub fn max_weight(&self) -> f64 {
        self.deep.max(self.rem).max(self.light).max(self.awake)
    }
}

/// Tunable parameters of an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Window length in days, ending on the requested end date
    pub window_days: u32,
    /// Magnitude |r| a coefficient must reach to be flagged significant
    pub significance_threshold: f64,
    /// Minimum defined day pairs before a coefficient is computed
    pub min_sample_size: usize,
    pub sleep_weights: SleepStageWeights,
    /// Timeout handed to the insight provider
    pub insight_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            sleep_weights: SleepStageWeights::default(),
            insight_timeout_secs: DEFAULT_INSIGHT_TIMEOUT_SECS,
        }
    }
}

impl AnalysisConfig {
    /// Check the configuration before any stage runs
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.window_days == 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(ComputeError::InvalidConfig(format!(
                "window_days must be within 1..={MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }

        if !(0.0..=1.0).contains(&self.significance_threshold) {
            return Err(ComputeError::InvalidConfig(format!(
                "significance_threshold must be within [0, 1], got {}",
                self.significance_threshold
            )));
        }

        // Pearson needs at least two points
        if self.min_sample_size < 2 {
            return Err(ComputeError::InvalidConfig(format!(
                "min_sample_size must be at least 2, got {}",
                self.min_sample_size
            )));
        }

        let w = &self.sleep_weights;
        if [w.deep, w.rem, w.light, w.awake].iter().any(|v| !v.is_finite()) {
            return Err(ComputeError::InvalidConfig(
                "sleep_weights must be finite numbers".to_string(),
            ));
        }
        if w.max_weight() <= 0.0 {
            return Err(ComputeError::InvalidConfig(
                "at least one sleep stage weight must be positive".to_string(),
            ));
        }

        if self.insight_timeout_secs == 0 {
            return Err(ComputeError::InvalidConfig(
                "insight_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn insight_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.insight_timeout_secs)
    }
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window, failing when end precedes start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ComputeError> {
        if end < start {
            return Err(ComputeError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window of `days` days ending on `end` (inclusive)
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self, ComputeError> {
        if days == 0 {
            return Err(ComputeError::InvalidConfig(
                "window must span at least one day".to_string(),
            ));
        }
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days) - 1))
            .ok_or_else(|| {
                ComputeError::InvalidConfig(format!(
                    "a {days} day window ending on {end} starts before the earliest supported date"
                ))
            })?;
        Self::new(start, end)
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> Result<Self, ComputeError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn len_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Every date of the window in ascending order
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Result<NaiveDate, ComputeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ComputeError::DateParseError(format!("{value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_days, 30);
        assert_eq!(config.min_sample_size, 5);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = AnalysisConfig {
            significance_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_weights_without_positive_stage_rejected() {
        let config = AnalysisConfig {
            sleep_weights: SleepStageWeights {
                deep: 0.0,
                rem: 0.0,
                light: 0.0,
                awake: -0.2,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_end_before_start_fails() {
        let result = DateWindow::parse("2024-01-10", "2024-01-09");
        assert!(matches!(result, Err(ComputeError::InvalidWindow { .. })));
    }

    #[test]
    fn test_window_ending_on() {
        let end = parse_date("2024-01-31").unwrap();
        let window = DateWindow::ending_on(end, 30).unwrap();
        assert_eq!(window.start, parse_date("2024-01-02").unwrap());
        assert_eq!(window.len_days(), 30);
        assert_eq!(window.dates().count(), 30);
    }

    #[test]
    fn test_oversized_window_rejected() {
        let config = AnalysisConfig {
            window_days: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ComputeError::InvalidConfig(_))
        ));

        let longest = AnalysisConfig {
            window_days: MAX_WINDOW_DAYS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_window_before_earliest_date_is_config_error() {
        let end = parse_date("2024-01-01").unwrap();
        assert!(matches!(
            DateWindow::ending_on(end, u32::MAX),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_single_day_window() {
        let window = DateWindow::parse("2024-02-29", "2024-02-29").unwrap();
        assert_eq!(window.len_days(), 1);
        assert!(window.contains(parse_date("2024-02-29").unwrap()));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"min_sample_size": 7, "sleep_weights": {"awake": -0.5}}"#)
                .unwrap();
        assert_eq!(config.min_sample_size, 7);
        assert_eq!(config.window_days, 30);
        assert_eq!(config.sleep_weights.deep, 0.5);
        assert_eq!(config.sleep_weights.awake, -0.5);
    }
}
