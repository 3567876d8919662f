//! Metric derivation
//!
//! This module derives the daily metrics from a normalized `DayRecord`:
//! - Net energy balance (charged - drained)
//! - Sleep score from weighted stage proportions
//! - Stress index from measured stress samples
//!
//! Each day is derived on its own; nothing carries over between days.

use crate::config::SleepStageWeights;
use crate::types::{DayRecord, DerivedMetrics, SleepSegment, SleepStage, StressSample};

/// Deriver for computing per-day metrics
pub struct MetricDeriver;

impl MetricDeriver {
    /// Derive metrics for one day
    pub fn derive(record: &DayRecord, weights: &SleepStageWeights) -> DerivedMetrics {
        DerivedMetrics {
            date: record.date,
            body_battery: record.body_battery,
            net_energy_balance: record.body_battery.map(|bb| bb.net()),
            sleep_score: compute_sleep_score(&record.sleep_segments, weights),
            stress_index: compute_stress_index(&record.stress_samples),
            sleep_minutes: compute_sleep_minutes(&record.sleep_segments),
            stress_peak: record
                .stress_samples
                .iter()
                .filter_map(|s| s.level.value())
                .max(),
        }
    }

    /// Derive metrics for every day, preserving order
    pub fn derive_all(records: &[DayRecord], weights: &SleepStageWeights) -> Vec<DerivedMetrics> {
        records.iter().map(|r| Self::derive(r, weights)).collect()
    }
}

/// Weighted stage composite scaled so a night entirely in the best-weighted
/// stage scores 100. The raw sum can be negative (awake penalty); the result
/// is clamped to [0, 100].
fn compute_sleep_score(segments: &[SleepSegment], weights: &SleepStageWeights) -> Option<f64> {
    let total: u64 = segments.iter().map(|s| u64::from(s.duration_minutes)).sum();
    if total == 0 {
        return None;
    }

    let max_weight = weights.max_weight();
    if max_weight <= 0.0 {
        return None;
    }

    let weighted: f64 = segments
        .iter()
        .map(|s| stage_weight(s.stage, weights) * f64::from(s.duration_minutes) / total as f64)
        .sum();

    Some((weighted / max_weight * 100.0).clamp(0.0, 100.0))
}

fn stage_weight(stage: SleepStage, weights: &SleepStageWeights) -> f64 {
    match stage {
        SleepStage::Deep => weights.deep,
        SleepStage::Rem => weights.rem,
        SleepStage::Light => weights.light,
        SleepStage::Awake => weights.awake,
    }
}

/// Mean of measured levels; unmeasurable samples are skipped
fn compute_stress_index(samples: &[StressSample]) -> Option<f64> {
    let (sum, count) = samples
        .iter()
        .filter_map(|s| s.level.value())
        .fold((0u64, 0u64), |(sum, count), level| {
            (sum + u64::from(level), count + 1)
        });

    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64)
    }
}

/// Minutes asleep, excluding awake segments
fn compute_sleep_minutes(segments: &[SleepSegment]) -> Option<u32> {
    if segments.is_empty() {
        return None;
    }
    Some(
        segments
            .iter()
            .filter(|s| s.stage != SleepStage::Awake)
            .map(|s| s.duration_minutes)
            .sum(),
    )
}
