//! Garmin provider adapter
//!
//! Parses Garmin Connect shaped payloads (body battery, sleep, stress) into
//! provider entries.

use crate::adapters::{
    PayloadAdapter, ProviderPayload, RawBodyBattery, RawSleep, RawSleepLevel, RawStageSeconds,
    RawStress, RawStressLevel, RawStressSample,
};
use crate::config::parse_date;
use crate::error::ComputeError;
use chrono::NaiveDateTime;
use serde::Deserialize;

/// Garmin payload adapter
pub struct GarminAdapter;

impl PayloadAdapter for GarminAdapter {
    fn parse(&self, raw_json: &str) -> Result<ProviderPayload, ComputeError> {
        let payload: GarminPayload = serde_json::from_str(raw_json)?;

        let body_battery = payload
            .body_battery
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                Ok(RawBodyBattery {
                    date: parse_date(&entry.date)?,
                    charged: entry.charged,
                    drained: entry.drained,
                })
            })
            .collect::<Result<Vec<_>, ComputeError>>()?;

        let sleep = payload
            .sleep
            .unwrap_or_default()
            .into_iter()
            .map(convert_sleep)
            .collect::<Result<Vec<_>, ComputeError>>()?;

        let stress = payload
            .stress
            .unwrap_or_default()
            .into_iter()
            .map(convert_stress)
            .collect::<Result<Vec<_>, ComputeError>>()?;

        tracing::debug!(
            body_battery = body_battery.len(),
            sleep = sleep.len(),
            stress = stress.len(),
            "Parsed Garmin payload"
        );

        Ok(ProviderPayload {
            body_battery,
            sleep,
            stress,
        })
    }
}

fn convert_sleep(sleep: GarminSleep) -> Result<RawSleep, ComputeError> {
    let date = parse_date(&sleep.calendar_date)?;
    let dto = sleep.daily_sleep_dto.unwrap_or_default();

    let levels = sleep
        .sleep_levels
        .unwrap_or_default()
        .into_iter()
        .map(|level| RawSleepLevel {
            start: level.start_gmt.as_deref().and_then(parse_gmt),
            end: level.end_gmt.as_deref().and_then(parse_gmt),
            activity_level: level.activity_level,
        })
        .collect();

    Ok(RawSleep {
        date,
        stage_seconds: RawStageSeconds {
            deep: dto.deep_sleep_seconds,
            light: dto.light_sleep_seconds,
            rem: dto.rem_sleep_seconds,
            awake: dto.awake_sleep_seconds,
        },
        levels,
        feedback: dto.sleep_score_feedback.as_deref().map(explain_sleep_feedback),
        insight: dto.sleep_score_insight.as_deref().map(explain_sleep_insight),
    })
}

fn convert_stress(stress: GarminStress) -> Result<RawStress, ComputeError> {
    let date = parse_date(&stress.calendar_date)?;

    let samples = stress
        .stress_values_array
        .unwrap_or_default()
        .into_iter()
        .map(|value| convert_stress_value(&value))
        .collect();

    Ok(RawStress {
        date,
        day_start: stress.start_timestamp_gmt.as_deref().and_then(parse_gmt),
        samples,
    })
}

/// Garmin stress values are `[timestampMillis, level]` pairs
fn convert_stress_value(value: &serde_json::Value) -> RawStressSample {
    let pair = match value.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => {
            return RawStressSample {
                timestamp_millis: None,
                level: RawStressLevel::Unreadable,
            }
        }
    };

    let timestamp_millis = pair[0].as_i64();
    let level = match &pair[1] {
        serde_json::Value::Null => RawStressLevel::Null,
        v => match v.as_i64() {
            Some(level) => RawStressLevel::Level(level),
            None => match v.as_f64() {
                Some(f) if f.fract() == 0.0 => RawStressLevel::Level(f as i64),
                _ => RawStressLevel::Unreadable,
            },
        },
    };

    RawStressSample {
        timestamp_millis,
        level,
    }
}

/// Garmin GMT timestamps look like `2024-01-15T22:30:00.0`
fn parse_gmt(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Explain a Garmin sleep score feedback code; unknown codes pass through
pub fn explain_sleep_feedback(code: &str) -> String {
    let text = match code {
        "NEGATIVE_NOT_RESTORATIVE" => "Sleep was not restorative, which points to poor sleep quality from stress, a late bedtime or other disturbances.",
        "NEGATIVE_LONG_BUT_NOT_RESTORATIVE" => "Sleep was long but still not restorative, possibly after very strenuous exercise.",
        "NEGATIVE_SHORT_AND_POOR_QUALITY" => "Sleep was short and of poor quality.",
        "NEGATIVE_SHORT_AND_NONRECOVERING" => "Sleep was short with inadequate recovery, often after a late bedtime.",
        "POSITIVE_OPTIMAL_STRUCTURE" => "Sleep had an optimal structure without notable disturbances.",
        "POSITIVE_LONG_AND_CALM" => "Sleep was long and calm.",
        "POSITIVE_LONG_AND_CONTINUOUS" => "Sleep was long and uninterrupted.",
        "POSITIVE_DEEP" => "Sleep contained a good share of deep sleep.",
        other => other,
    };
    text.to_string()
}

/// Explain a Garmin sleep score insight code; unknown codes pass through
pub fn explain_sleep_insight(code: &str) -> String {
    let text = match code {
        "NONE" => "No specific factor influenced this night's sleep.",
        "NEGATIVE_LATE_BED_TIME" => "A late bedtime disrupted the sleep-wake cycle.",
        "NEGATIVE_VERY_STRENUOUS_EXERCISE" => "Very strenuous exercise close to bedtime hurt sleep quality.",
        "NEGATIVE_STRESSFUL_DAY" => "A stressful day made it harder to unwind and sleep well.",
        "POSITIVE_EXERCISE" => "Exercise had a positive effect on sleep.",
        "POSITIVE_LATE_BED_TIME" => "A later bedtime suited this night's sleep.",
        other => other,
    };
    text.to_string()
}

// Garmin API response structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminPayload {
    body_battery: Option<Vec<GarminBodyBattery>>,
    sleep: Option<Vec<GarminSleep>>,
    stress: Option<Vec<GarminStress>>,
}

#[derive(Debug, Deserialize)]
struct GarminBodyBattery {
    date: String,
    charged: Option<i64>,
    drained: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleep {
    calendar_date: String,
    #[serde(rename = "dailySleepDTO")]
    daily_sleep_dto: Option<GarminDailySleep>,
    sleep_levels: Option<Vec<GarminSleepLevel>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminDailySleep {
    deep_sleep_seconds: Option<i64>,
    light_sleep_seconds: Option<i64>,
    rem_sleep_seconds: Option<i64>,
    awake_sleep_seconds: Option<i64>,
    sleep_score_feedback: Option<String>,
    sleep_score_insight: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminSleepLevel {
    #[serde(rename = "startGMT")]
    start_gmt: Option<String>,
    #[serde(rename = "endGMT")]
    end_gmt: Option<String>,
    activity_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminStress {
    calendar_date: String,
    #[serde(rename = "startTimestampGMT")]
    start_timestamp_gmt: Option<String>,
    stress_values_array: Option<Vec<serde_json::Value>>,
}
