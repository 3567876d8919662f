//! Record normalization
//!
//! This module turns raw provider entries into one `DayRecord` per calendar day
//! of the requested window.
//! - Days without provider data still get a record, with empty collections
//! - Malformed samples are dropped and counted, never fatal
//! - Stress samples are ordered by minute of day, sleep segments by start time

use crate::adapters::{
    ProviderPayload, RawBodyBattery, RawSleep, RawStageSeconds, RawStress, RawStressLevel,
};
use crate::config::DateWindow;
use crate::types::{
    BodyBattery, DayRecord, DiscardCounts, SleepSegment, SleepStage, StressLevel, StressSample,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider sentinels for a minute the device could not measure
const UNMEASURABLE_LEVELS: [i64; 2] = [-1, -2];

const MILLIS_PER_MINUTE: i64 = 60_000;
const MINUTES_PER_DAY: i64 = 1440;

/// Ordered, gap-free records for a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWindow {
    pub window: DateWindow,
    /// One record per day, ascending by date
    pub records: Vec<DayRecord>,
    pub discarded: DiscardCounts,
}

/// Normalizer for converting provider entries to day records
pub struct Normalizer;

impl Normalizer {
    /// Normalize a payload over an inclusive window
    pub fn normalize(payload: &ProviderPayload, window: &DateWindow) -> NormalizedWindow {
        let mut discarded = DiscardCounts::default();
        let mut days: BTreeMap<NaiveDate, DayBuilder> = window
            .dates()
            .map(|date| (date, DayBuilder::new(date)))
            .collect();

        for entry in &payload.body_battery {
            match days.get_mut(&entry.date) {
                Some(day) => day.add_body_battery(entry, &mut discarded),
                None => discarded.out_of_window += 1,
            }
        }

        for entry in &payload.sleep {
            match days.get_mut(&entry.date) {
                Some(day) => day.add_sleep(entry, &mut discarded),
                None => discarded.out_of_window += 1,
            }
        }

        for entry in &payload.stress {
            match days.get_mut(&entry.date) {
                Some(day) => day.add_stress(entry, &mut discarded),
                None => discarded.out_of_window += 1,
            }
        }

        let records: Vec<DayRecord> = days.into_values().map(DayBuilder::finish).collect();

        if discarded.malformed() > 0 {
            tracing::warn!(
                stress_samples = discarded.stress_samples,
                sleep_segments = discarded.sleep_segments,
                body_battery = discarded.body_battery,
                sleep_entries = discarded.sleep_entries,
                "Discarded malformed provider samples"
            );
        }
        if discarded.out_of_window > 0 {
            tracing::debug!(
                entries = discarded.out_of_window,
                "Ignored provider entries outside the window"
            );
        }
        tracing::debug!(
            days = records.len(),
            days_with_data = records.iter().filter(|r| r.has_data()).count(),
            "Normalized provider payload"
        );

        NormalizedWindow {
            window: *window,
            records,
            discarded,
        }
    }
}

/// Accumulates one day's entries before the record is frozen
struct DayBuilder {
    record: DayRecord,
    /// Segments keyed by start minute offset for ordering
    timed_segments: Vec<(i64, SleepSegment)>,
    /// Set once a sleep entry with stage data has been taken
    has_sleep: bool,
}

impl DayBuilder {
    fn new(date: NaiveDate) -> Self {
        Self {
            record: DayRecord::empty(date),
            timed_segments: Vec::new(),
            has_sleep: false,
        }
    }

    fn add_body_battery(&mut self, entry: &RawBodyBattery, discarded: &mut DiscardCounts) {
        let (charged, drained) = match (entry.charged, entry.drained) {
            (None, None) => return,
            (Some(c), Some(d)) => (c, d),
            _ => {
                discarded.body_battery += 1;
                return;
            }
        };

        let value = match (u32::try_from(charged), u32::try_from(drained)) {
            (Ok(charged), Ok(drained)) => BodyBattery { charged, drained },
            _ => {
                discarded.body_battery += 1;
                return;
            }
        };

        // First entry for a date wins
        if self.record.body_battery.is_some() {
            discarded.body_battery += 1;
        } else {
            self.record.body_battery = Some(value);
        }
    }

    fn add_sleep(&mut self, entry: &RawSleep, discarded: &mut DiscardCounts) {
        if has_stage_data(entry) {
            // First entry for a date wins
            if self.has_sleep {
                discarded.sleep_entries += 1;
                return;
            }
            self.has_sleep = true;

            if entry.levels.is_empty() {
                self.add_stage_totals(&entry.stage_seconds, discarded);
            } else {
                self.add_levels(entry, discarded);
            }
        }

        if self.record.sleep_feedback.is_none() {
            self.record.sleep_feedback = entry.feedback.clone();
        }
        if self.record.sleep_insight.is_none() {
            self.record.sleep_insight = entry.insight.clone();
        }
    }

    fn add_levels(&mut self, entry: &RawSleep, discarded: &mut DiscardCounts) {
        for level in &entry.levels {
            let stage = level.activity_level.and_then(stage_from_activity_level);
            let valid = match (stage, level.start, level.end) {
                (Some(stage), Some(start), Some(end)) if end >= start => {
                    u32::try_from((end - start).num_minutes())
                        .ok()
                        .map(|minutes| (stage, start, minutes))
                }
                _ => None,
            };

            match valid {
                Some((stage, start, duration_minutes)) => self.timed_segments.push((
                    start.and_utc().timestamp_millis(),
                    SleepSegment {
                        stage,
                        duration_minutes,
                    },
                )),
                None => discarded.sleep_segments += 1,
            }
        }
    }

    /// Summary-only nights become one segment per stage with time in it
    fn add_stage_totals(&mut self, totals: &RawStageSeconds, discarded: &mut DiscardCounts) {
        let stages = [
            (SleepStage::Deep, totals.deep),
            (SleepStage::Light, totals.light),
            (SleepStage::Rem, totals.rem),
            (SleepStage::Awake, totals.awake),
        ];

        for (stage, seconds) in stages {
            match seconds {
                Some(secs) if secs > 0 => self.record.sleep_segments.push(SleepSegment {
                    stage,
                    duration_minutes: ((secs as f64) / 60.0).round() as u32,
                }),
                Some(secs) if secs < 0 => discarded.sleep_segments += 1,
                _ => {}
            }
        }
    }

    fn add_stress(&mut self, entry: &RawStress, discarded: &mut DiscardCounts) {
        let origin = entry
            .day_start
            .unwrap_or_else(|| entry.date.and_time(NaiveTime::MIN))
            .and_utc()
            .timestamp_millis();

        for sample in &entry.samples {
            let level = match sample.level {
                RawStressLevel::Level(l) if (0..=100).contains(&l) => StressLevel::Measured(l as u8),
                RawStressLevel::Level(l) if UNMEASURABLE_LEVELS.contains(&l) => {
                    StressLevel::Unmeasurable
                }
                RawStressLevel::Null => StressLevel::Unmeasurable,
                _ => {
                    discarded.stress_samples += 1;
                    continue;
                }
            };

            let minute = sample
                .timestamp_millis
                .map(|ts| (ts - origin).div_euclid(MILLIS_PER_MINUTE))
                .filter(|m| (0..MINUTES_PER_DAY).contains(m));

            match minute {
                Some(minute) => self.record.stress_samples.push(StressSample {
                    minute_of_day: minute as u16,
                    level,
                }),
                None => discarded.stress_samples += 1,
            }
        }
    }

    fn finish(mut self) -> DayRecord {
        if !self.timed_segments.is_empty() {
            self.timed_segments.sort_by_key(|(start, _)| *start);
            self.record
                .sleep_segments
                .extend(self.timed_segments.into_iter().map(|(_, segment)| segment));
        }
        self.record.stress_samples.sort_by_key(|s| s.minute_of_day);
        self.record
    }
}

fn has_stage_data(entry: &RawSleep) -> bool {
    let totals = &entry.stage_seconds;
    !entry.levels.is_empty()
        || [totals.deep, totals.light, totals.rem, totals.awake]
            .iter()
            .any(Option::is_some)
}

/// Garmin sleep levels: 0 deep, 1 light, 2 rem, 3 awake
fn stage_from_activity_level(level: f64) -> Option<SleepStage> {
    if level.fract() != 0.0 {
        return None;
    }
    match level as i64 {
        0 => Some(SleepStage::Deep),
        1 => Some(SleepStage::Light),
        2 => Some(SleepStage::Rem),
        3 => Some(SleepStage::Awake),
        _ => None,
    }
}
