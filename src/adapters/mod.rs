//! Provider payload adapters
//!
//! This module provides adapters that parse raw provider JSON payloads into
//! provider-agnostic, still unvalidated entries. Validation and per-day grouping
//! happen in the normalizer.

mod garmin;

pub use garmin::{explain_sleep_feedback, explain_sleep_insight, GarminAdapter};

use crate::config::DateWindow;
use crate::error::ComputeError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Trait for provider payload adapters
pub trait PayloadAdapter {
    /// Parse raw JSON into provider entries
    fn parse(&self, raw_json: &str) -> Result<ProviderPayload, ComputeError>;
}

/// Data-fetch collaborator: date window in, raw per-day entries out.
///
/// Authentication and token handling live entirely in the implementation.
pub trait DataProvider {
    fn fetch(&self, window: &DateWindow) -> Result<ProviderPayload, ComputeError>;
}

/// Raw entries for a date range, grouped only by signal family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub body_battery: Vec<RawBodyBattery>,
    pub sleep: Vec<RawSleep>,
    pub stress: Vec<RawStress>,
}

impl ProviderPayload {
    pub fn is_empty(&self) -> bool {
        self.body_battery.is_empty() && self.sleep.is_empty() && self.stress.is_empty()
    }
}

/// An already fetched payload serves any window; the normalizer drops
/// entries outside it.
impl DataProvider for ProviderPayload {
    fn fetch(&self, _window: &DateWindow) -> Result<ProviderPayload, ComputeError> {
        Ok(self.clone())
    }
}

/// Body battery totals as reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBodyBattery {
    pub date: NaiveDate,
    pub charged: Option<i64>,
    pub drained: Option<i64>,
}

/// Per-stage sleep totals in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStageSeconds {
    pub deep: Option<i64>,
    pub light: Option<i64>,
    pub rem: Option<i64>,
    pub awake: Option<i64>,
}

/// One sleep level interval; `None` fields could not be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSleepLevel {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// 0 deep, 1 light, 2 rem, 3 awake
    pub activity_level: Option<f64>,
}

/// Sleep data for one night, attributed to the day it ends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSleep {
    pub date: NaiveDate,
    pub stage_seconds: RawStageSeconds,
    pub levels: Vec<RawSleepLevel>,
    /// Explained sleep score feedback
    pub feedback: Option<String>,
    /// Explained sleep score insight
    pub insight: Option<String>,
}

/// Stress level value as it appeared in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawStressLevel {
    Level(i64),
    /// Explicit null reading
    Null,
    /// Not a number
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStressSample {
    /// Epoch milliseconds; `None` when the sample had no usable timestamp
    pub timestamp_millis: Option<i64>,
    pub level: RawStressLevel,
}

/// Stress samples for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStress {
    pub date: NaiveDate,
    /// Instant the day's minute 0 corresponds to; midnight UTC when absent
    pub day_start: Option<NaiveDateTime>,
    pub samples: Vec<RawStressSample>,
}
