//! Core types for the Energy Balance pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: per-day records, derived metrics, correlation results, insight
//! requests and the recommendations parsed back from the language model.
//!
//! Missing data is always an explicit `None`, never a zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Deep,
    Light,
    Rem,
    Awake,
}

/// A classified stretch of sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSegment {
    pub stage: SleepStage,
    pub duration_minutes: u32,
}

/// Stress level reading; the device reports some minutes as unmeasurable
/// (off-wrist, too much motion)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    /// Level on the 0-100 scale
    Measured(u8),
    Unmeasurable,
}

impl StressLevel {
    /// Numeric level, if one was measured
    pub fn value(&self) -> Option<u8> {
        match self {
            StressLevel::Measured(level) => Some(*level),
            StressLevel::Unmeasurable => None,
        }
    }
}

/// One stress reading within a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressSample {
    /// Minute of the day (0-1439)
    pub minute_of_day: u16,
    pub level: StressLevel,
}

/// Body battery energy charged and drained over a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyBattery {
    pub charged: u32,
    pub drained: u32,
}

impl BodyBattery {
    /// Net energy balance (charged - drained), may be negative
    pub fn net(&self) -> i64 {
        i64::from(self.charged) - i64::from(self.drained)
    }
}

/// Uniform per-day record produced by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    /// Body battery totals, `None` when the provider had none for this day
    pub body_battery: Option<BodyBattery>,
    /// Sleep segments in chronological order
    pub sleep_segments: Vec<SleepSegment>,
    /// Stress samples ordered by minute of day
    pub stress_samples: Vec<StressSample>,
    /// Explanation of the provider's sleep score feedback code
    pub sleep_feedback: Option<String>,
    /// Explanation of the provider's sleep score insight code
    pub sleep_insight: Option<String>,
}

impl DayRecord {
    /// A day with no data at all
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            body_battery: None,
            sleep_segments: Vec::new(),
            stress_samples: Vec::new(),
            sleep_feedback: None,
            sleep_insight: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.body_battery.is_some()
            || !self.sleep_segments.is_empty()
            || !self.stress_samples.is_empty()
    }
}

/// Counts of provider entries dropped during normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardCounts {
    /// Stress samples with an invalid level or a timestamp off their day
    pub stress_samples: usize,
    /// Sleep segments with an unknown stage or invalid time range
    pub sleep_segments: usize,
    /// Body battery entries with negative values or a duplicate date
    pub body_battery: usize,
    /// Sleep entries for a date that already has sleep data
    pub sleep_entries: usize,
    /// Entries dated outside the requested window
    pub out_of_window: usize,
}

impl DiscardCounts {
    /// Malformed entries (excludes out-of-window entries)
    pub fn malformed(&self) -> usize {
        self.stress_samples + self.sleep_segments + self.body_battery + self.sleep_entries
    }
}

/// Metrics derived from a single DayRecord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub date: NaiveDate,
    pub body_battery: Option<BodyBattery>,
    /// Charged minus drained
    pub net_energy_balance: Option<i64>,
    /// Weighted sleep stage composite (0-100)
    pub sleep_score: Option<f64>,
    /// Mean of measured stress levels (0-100)
    pub stress_index: Option<f64>,
    /// Minutes asleep (all stages except awake)
    pub sleep_minutes: Option<u32>,
    /// Highest measured stress level
    pub stress_peak: Option<u8>,
}

/// The three analyzed metric pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationPair {
    EnergySleep,
    EnergyStress,
    SleepStress,
}

impl CorrelationPair {
    pub const ALL: [CorrelationPair; 3] = [
        CorrelationPair::EnergySleep,
        CorrelationPair::EnergyStress,
        CorrelationPair::SleepStress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationPair::EnergySleep => "energy_sleep",
            CorrelationPair::EnergyStress => "energy_stress",
            CorrelationPair::SleepStress => "sleep_stress",
        }
    }
}

/// Human-readable magnitude of a coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    Negligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

/// Correlation between one metric pair over the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub pair: CorrelationPair,
    /// Pearson coefficient in [-1, 1]; `None` when too few points or no variance
    pub coefficient: Option<f64>,
    /// Days where both metrics were defined
    pub sample_size: usize,
    pub significant: bool,
    pub strength: Option<CorrelationStrength>,
    pub direction: Option<CorrelationDirection>,
}

/// Min/max/mean over the defined values of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Number of defined values reduced
    pub count: usize,
}

/// Window aggregates for each derived metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub net_energy_balance: Option<MetricAggregate>,
    pub sleep_score: Option<MetricAggregate>,
    pub stress_index: Option<MetricAggregate>,
}

/// Recommendation theme requested from the language model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Energy,
    Sleep,
    Stress,
    CrossCorrelation,
}

impl Theme {
    pub const ALL: [Theme; 4] = [
        Theme::Energy,
        Theme::Sleep,
        Theme::Stress,
        Theme::CrossCorrelation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Energy => "energy",
            Theme::Sleep => "sleep",
            Theme::Stress => "stress",
            Theme::CrossCorrelation => "cross_correlation",
        }
    }

    pub fn parse(name: &str) -> Option<Theme> {
        match name.trim().to_lowercase().as_str() {
            "energy" => Some(Theme::Energy),
            "sleep" => Some(Theme::Sleep),
            "stress" => Some(Theme::Stress),
            "cross_correlation" => Some(Theme::CrossCorrelation),
            _ => None,
        }
    }
}

/// Per-day line handed to the language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    pub charged: Option<u32>,
    pub drained: Option<u32>,
    pub net_energy_balance: Option<i64>,
    pub sleep_score: Option<f64>,
    pub sleep_minutes: Option<u32>,
    pub stress_index: Option<f64>,
    pub sleep_feedback: Option<String>,
    pub sleep_insight: Option<String>,
}

/// Structured request for the language-model collaborator.
///
/// Not `Clone`: a request is built once per run and moved into the provider.
#[derive(Debug, PartialEq, Serialize)]
pub struct InsightRequest {
    pub request_id: Uuid,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub aggregate_summary: AggregateSummary,
    pub correlations: Vec<CorrelationResult>,
    pub days: Vec<DaySnapshot>,
    pub free_text_context: Option<String>,
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// Chat message rendered from an InsightRequest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Natural-language recommendation for one theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub theme: Theme,
    pub text: String,
}

/// Validated recommendations, one per theme in `Theme::ALL` order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationSet {
    pub fn get(&self, theme: Theme) -> Option<&str> {
        self.recommendations
            .iter()
            .find(|r| r.theme == theme)
            .map(|r| r.text.as_str())
    }
}

/// Result of the insight step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InsightOutcome {
    /// Every theme has recommendation text
    Complete(RecommendationSet),
    /// The provider failed or answered badly; the listed themes have no text
    Unavailable {
        reason: String,
        missing_themes: Vec<Theme>,
    },
    /// No provider was configured for this run
    Skipped,
}

impl InsightOutcome {
    pub fn recommendations(&self) -> Option<&RecommendationSet> {
        match self {
            InsightOutcome::Complete(set) => Some(set),
            _ => None,
        }
    }
}

/// Overall direction of the window's energy balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyTrend {
    NetPositive,
    NetNegative,
}

/// Window-level energy totals for report renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub total_charged: u64,
    pub total_drained: u64,
    pub net_energy: i64,
    pub trend: EnergyTrend,
    /// Days with charged >= drained
    pub positive_days: usize,
    /// Days with charged < drained
    pub negative_days: usize,
    /// Weekday that most often ends negative
    pub most_negative_weekday: Option<chrono::Weekday>,
}
