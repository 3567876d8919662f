//! Report data assembly
//!
//! Packages everything a run produced into one serializable `EnergyReport`.
//! Rendering (markup, files, charts) belongs to whoever consumes it.

use crate::config::DateWindow;
use crate::types::{
    CorrelationResult, DayRecord, DerivedMetrics, DiscardCounts, EnergySummary, EnergyTrend,
    InsightOutcome,
};
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::Serialize;
use uuid::Uuid;

/// Structured result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window: DateWindow,
    /// One record per day of the window, ascending
    pub days: Vec<DayRecord>,
    pub metrics: Vec<DerivedMetrics>,
    pub correlations: Vec<CorrelationResult>,
    pub summary: EnergySummary,
    pub insights: InsightOutcome,
    pub discarded: DiscardCounts,
    /// Set when the data provider failed and the run used an empty payload
    pub provider_error: Option<String>,
}

/// Inputs gathered by the pipeline for one report
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub window: DateWindow,
    pub days: Vec<DayRecord>,
    pub metrics: Vec<DerivedMetrics>,
    pub correlations: Vec<CorrelationResult>,
    pub insights: InsightOutcome,
    pub discarded: DiscardCounts,
    pub provider_error: Option<String>,
}

impl EnergyReport {
    /// Build the report and its energy summary
    pub fn assemble(parts: ReportParts) -> Self {
        let summary = summarize_energy(&parts.days);

        Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            window: parts.window,
            days: parts.days,
            metrics: parts.metrics,
            correlations: parts.correlations,
            summary,
            insights: parts.insights,
            discarded: parts.discarded,
            provider_error: parts.provider_error,
        }
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Window totals over days that have body battery data
pub fn summarize_energy(days: &[DayRecord]) -> EnergySummary {
    let mut total_charged = 0u64;
    let mut total_drained = 0u64;
    let mut positive_days = 0;
    let mut negative_days = 0;
    let mut negative_by_weekday = [0usize; 7];

    for (date, bb) in days.iter().filter_map(|d| d.body_battery.map(|bb| (d.date, bb))) {
        total_charged += u64::from(bb.charged);
        total_drained += u64::from(bb.drained);
        if bb.charged >= bb.drained {
            positive_days += 1;
        } else {
            negative_days += 1;
            negative_by_weekday[date.weekday().num_days_from_monday() as usize] += 1;
        }
    }

    let net_energy = total_charged as i64 - total_drained as i64;

    EnergySummary {
        total_charged,
        total_drained,
        net_energy,
        trend: if net_energy >= 0 {
            EnergyTrend::NetPositive
        } else {
            EnergyTrend::NetNegative
        },
        positive_days,
        negative_days,
        most_negative_weekday: most_frequent_weekday(&negative_by_weekday),
    }
}

/// Weekday with the highest count; the earliest weekday wins ties
fn most_frequent_weekday(counts: &[usize; 7]) -> Option<Weekday> {
    let mut best: Option<(usize, usize)> = None;
    for (index, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((index, count));
        }
    }

    best.map(|(index, _)| weekday_from_monday(index))
}

fn weekday_from_monday(index: usize) -> Weekday {
    match index {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}
