//! Pipeline orchestration
//!
//! This module provides the public API for Energy Balance.
//! It runs the stages from a provider payload to an `EnergyReport`.

use crate::adapters::{DataProvider, GarminAdapter, PayloadAdapter, ProviderPayload};
use crate::config::{AnalysisConfig, DateWindow};
use crate::correlation::CorrelationAnalyzer;
use crate::error::ComputeError;
use crate::features::MetricDeriver;
use crate::insight::{request_insights, InsightProvider, InsightRequestBuilder};
use crate::normalizer::{NormalizedWindow, Normalizer};
use crate::report::{EnergyReport, ReportParts};
use crate::types::{CorrelationResult, DerivedMetrics, InsightOutcome, InsightRequest};

/// Build an energy report from a raw Garmin JSON payload.
///
/// Uses the default configuration and skips the insight step.
///
/// # Arguments
/// * `raw_json` - Garmin payload JSON (`bodyBattery`, `sleep`, `stress`)
/// * `start` - First day of the window, `YYYY-MM-DD`
/// * `end` - Last day of the window, `YYYY-MM-DD`
///
/// # Example
/// ```ignore
/// let report = garmin_energy_report(&garmin_json, "2024-01-01", "2024-01-30")?;
/// println!("{}", report.to_json()?);
/// ```
pub fn garmin_energy_report(
    raw_json: &str,
    start: &str,
    end: &str,
) -> Result<EnergyReport, ComputeError> {
    let window = DateWindow::parse(start, end)?;
    let payload = GarminAdapter.parse(raw_json)?;
    EnergyPipeline::new(AnalysisConfig::default())?.run(&payload, &window, None, None)
}

/// Output of the computational stages, before insights
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub normalized: NormalizedWindow,
    pub metrics: Vec<DerivedMetrics>,
    pub correlations: Vec<CorrelationResult>,
}

/// Configured pipeline.
///
/// Holds no state between runs; one instance can analyze any number of windows.
#[derive(Debug, Clone)]
pub struct EnergyPipeline {
    config: AnalysisConfig,
    analyzer: CorrelationAnalyzer,
}

impl EnergyPipeline {
    /// Create a pipeline, rejecting an invalid configuration up front
    pub fn new(config: AnalysisConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let analyzer = CorrelationAnalyzer::from_config(&config);
        Ok(Self { config, analyzer })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Window of the configured length ending on `end`
    pub fn window_ending_on(&self, end: chrono::NaiveDate) -> Result<DateWindow, ComputeError> {
        DateWindow::ending_on(end, self.config.window_days)
    }

    /// Run the computational stages.
    ///
    /// Pipeline stages:
    /// 1. Normalizer - Validate entries and build one record per day
    /// 2. MetricDeriver - Derive daily metrics
    /// 3. CorrelationAnalyzer - Correlate metric pairs
    pub fn analyze(&self, payload: &ProviderPayload, window: &DateWindow) -> AnalysisRun {
        // Stage 1: Normalize provider entries
        let normalized = Normalizer::normalize(payload, window);

        // Stage 2: Derive metrics
        let metrics = MetricDeriver::derive_all(&normalized.records, &self.config.sleep_weights);

        // Stage 3: Correlate
        let correlations = self.analyzer.analyze(&metrics);

        tracing::debug!(
            days = normalized.records.len(),
            significant = correlations.iter().filter(|c| c.significant).count(),
            "Analysis stages complete"
        );

        AnalysisRun {
            normalized,
            metrics,
            correlations,
        }
    }

    /// Build the insight request for an analysis run
    pub fn insight_request(&self, run: &AnalysisRun, context: Option<&str>) -> InsightRequest {
        let mut builder = InsightRequestBuilder::new();
        if let Some(context) = context {
            builder = builder.with_context(context);
        }
        builder.build(
            &run.normalized.window,
            &run.normalized.records,
            &run.metrics,
            &run.correlations,
        )
    }

    /// Fetch, analyze and, when a provider is given, request insights.
    ///
    /// A failing data provider or insight provider does not fail the run:
    /// the report records what went wrong.
    pub fn run(
        &self,
        provider: &dyn DataProvider,
        window: &DateWindow,
        insight_provider: Option<&dyn InsightProvider>,
        context: Option<&str>,
    ) -> Result<EnergyReport, ComputeError> {
        let (payload, provider_error) = match provider.fetch(window) {
            Ok(payload) => (payload, None),
            Err(err) => {
                tracing::warn!(error = %err, "Data provider failed; continuing without data");
                (ProviderPayload::default(), Some(err.to_string()))
            }
        };

        let run = self.analyze(&payload, window);

        let insights = match insight_provider {
            Some(insight_provider) => {
                let request = self.insight_request(&run, context);
                request_insights(insight_provider, request, self.config.insight_timeout())
            }
            None => InsightOutcome::Skipped,
        };

        let report = EnergyReport::assemble(ReportParts {
            window: *window,
            days: run.normalized.records,
            metrics: run.metrics,
            correlations: run.correlations,
            insights,
            discarded: run.normalized.discarded,
            provider_error,
        });

        tracing::info!(
            report_id = %report.report_id,
            start = %window.start,
            end = %window.end,
            net_energy = report.summary.net_energy,
            "Energy report generated"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{RawBodyBattery, RawSleep, RawStageSeconds};
    use crate::error::InsightError;
    use crate::types::{CorrelationPair, Theme};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Days 1-3 have body battery and sleep, days 4-5 body battery only
    fn five_day_payload() -> ProviderPayload {
        ProviderPayload {
            body_battery: (1..=5)
                .map(|d| RawBodyBattery {
                    date: date(d),
                    charged: Some(40 + i64::from(d) * 5),
                    drained: Some(50),
                })
                .collect(),
            sleep: (1..=3)
                .map(|d| RawSleep {
                    date: date(d),
                    stage_seconds: RawStageSeconds {
                        deep: Some(3600 + i64::from(d) * 600),
                        light: Some(14400),
                        rem: Some(5400),
                        awake: Some(600),
                    },
                    levels: Vec::new(),
                    feedback: None,
                    insight: None,
                })
                .collect(),
            stress: Vec::new(),
        }
    }

    struct FailingProvider;

    impl DataProvider for FailingProvider {
        fn fetch(&self, _window: &DateWindow) -> Result<ProviderPayload, ComputeError> {
            Err(ComputeError::Provider("session expired".to_string()))
        }
    }

    struct TimeoutInsights;

    impl InsightProvider for TimeoutInsights {
        fn complete(&self, _request: InsightRequest, timeout: Duration) -> Result<String, InsightError> {
            Err(InsightError::Timeout(timeout.as_secs()))
        }
    }

    struct RecordedInsights(&'static str);

    impl InsightProvider for RecordedInsights {
        fn complete(&self, request: InsightRequest, _timeout: Duration) -> Result<String, InsightError> {
            assert_eq!(request.themes, Theme::ALL.to_vec());
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_partial_days_below_minimum_sample() {
        let pipeline = EnergyPipeline::new(AnalysisConfig::default()).unwrap();
        let window = DateWindow::new(date(1), date(5)).unwrap();

        let run = pipeline.analyze(&five_day_payload(), &window);

        assert_eq!(run.normalized.records.len(), 5);
        assert_eq!(run.metrics.len(), 5);
        assert!(run.metrics[3].sleep_score.is_none());

        let energy_sleep = run
            .correlations
            .iter()
            .find(|c| c.pair == CorrelationPair::EnergySleep)
            .unwrap();
        assert_eq!(energy_sleep.sample_size, 3);
        assert_eq!(energy_sleep.coefficient, None);
        assert!(!energy_sleep.significant);
    }

    #[test]
    fn test_lower_minimum_sample_defines_coefficient() {
        let config = AnalysisConfig {
            min_sample_size: 3,
            ..Default::default()
        };
        let pipeline = EnergyPipeline::new(config).unwrap();
        let window = DateWindow::new(date(1), date(5)).unwrap();

        let run = pipeline.analyze(&five_day_payload(), &window);

        // more deep sleep and more charge each day
        let energy_sleep = &run.correlations[0];
        assert_eq!(energy_sleep.pair, CorrelationPair::EnergySleep);
        assert!(energy_sleep.coefficient.unwrap() > 0.99);
        assert!(energy_sleep.significant);
    }

    #[test]
    fn test_invalid_config_rejected_before_running() {
        let config = AnalysisConfig {
            min_sample_size: 1,
            ..Default::default()
        };
        assert!(matches!(
            EnergyPipeline::new(config),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_huge_window_rejected_before_running() {
        let config = AnalysisConfig {
            window_days: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(
            EnergyPipeline::new(config),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_window_end_before_start() {
        let result = garmin_energy_report("{}", "2024-01-10", "2024-01-01");
        assert!(matches!(result, Err(ComputeError::InvalidWindow { .. })));
    }

    #[test]
    fn test_provider_failure_is_soft() {
        let pipeline = EnergyPipeline::new(AnalysisConfig::default()).unwrap();
        let window = DateWindow::new(date(1), date(3)).unwrap();

        let report = pipeline.run(&FailingProvider, &window, None, None).unwrap();

        assert_eq!(report.days.len(), 3);
        assert!(report.days.iter().all(|d| !d.has_data()));
        assert_eq!(
            report.provider_error.as_deref(),
            Some("Data provider error: session expired")
        );
        assert_eq!(report.insights, InsightOutcome::Skipped);
    }

    #[test]
    fn test_insight_failure_still_produces_report() {
        let pipeline = EnergyPipeline::new(AnalysisConfig::default()).unwrap();
        let window = DateWindow::new(date(1), date(5)).unwrap();

        let report = pipeline
            .run(&five_day_payload(), &window, Some(&TimeoutInsights), None)
            .unwrap();

        assert_eq!(report.metrics.len(), 5);
        match &report.insights {
            InsightOutcome::Unavailable {
                reason,
                missing_themes,
            } => {
                assert_eq!(reason, "Insight provider timed out after 60 seconds");
                assert_eq!(missing_themes, &Theme::ALL.to_vec());
            }
            other => panic!("expected unavailable insights, got {other:?}"),
        }
    }

    #[test]
    fn test_run_with_recorded_insights() {
        let pipeline = EnergyPipeline::new(AnalysisConfig::default()).unwrap();
        let window = DateWindow::new(date(1), date(5)).unwrap();
        let response = RecordedInsights(
            r#"```json
{"recommendations": [
  {"theme": "energy", "text": "Your balance improves through the week."},
  {"theme": "sleep", "text": "Deep sleep rose each night."},
  {"theme": "stress", "text": "No stress data was recorded."},
  {"theme": "cross_correlation", "text": "More deep sleep came with more charge."}
]}
```"#,
        );

        let report = pipeline
            .run(&five_day_payload(), &window, Some(&response), Some("Rest week"))
            .unwrap();

        let set = report.insights.recommendations().unwrap();
        assert_eq!(set.get(Theme::Sleep), Some("Deep sleep rose each night."));
    }

    #[test]
    fn test_insight_request_from_run() {
        let pipeline = EnergyPipeline::new(AnalysisConfig::default()).unwrap();
        let window = DateWindow::new(date(1), date(5)).unwrap();
        let run = pipeline.analyze(&five_day_payload(), &window);

        let request = pipeline.insight_request(&run, Some("Rest week"));

        assert_eq!(request.days.len(), 5);
        assert_eq!(request.correlations.len(), 3);
        assert_eq!(request.aggregate_summary.sleep_score.unwrap().count, 3);
        assert_eq!(request.aggregate_summary.net_energy_balance.unwrap().count, 5);
        assert_eq!(request.free_text_context.as_deref(), Some("Rest week"));
    }

    #[test]
    fn test_garmin_energy_report() {
        let json = r#"{
            "bodyBattery": [
                {"date": "2024-01-01", "charged": 70, "drained": 40},
                {"date": "2024-01-02", "charged": 30, "drained": 65}
            ],
            "sleep": [{
                "calendarDate": "2024-01-02",
                "dailySleepDTO": {
                    "deepSleepSeconds": 5400,
                    "lightSleepSeconds": 14400,
                    "remSleepSeconds": 5400,
                    "awakeSleepSeconds": 1800
                }
            }]
        }"#;

        let report = garmin_energy_report(json, "2024-01-01", "2024-01-03").unwrap();

        assert_eq!(report.days.len(), 3);
        assert_eq!(report.metrics[0].net_energy_balance, Some(30));
        assert_eq!(report.metrics[1].net_energy_balance, Some(-35));
        assert!(report.metrics[1].sleep_score.is_some());
        assert_eq!(report.metrics[2].net_energy_balance, None);
        assert_eq!(report.summary.negative_days, 1);
        assert_eq!(report.summary.most_negative_weekday, Some(chrono::Weekday::Tue));

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["correlations"].as_array().unwrap().len(), 3);
        assert!(value["correlations"][0]["coefficient"].is_null());
    }

    #[test]
    fn test_invalid_json() {
        let result = garmin_energy_report("not json", "2024-01-01", "2024-01-02");
        assert!(matches!(result, Err(ComputeError::JsonError(_))));
    }

    #[test]
    fn test_window_ending_on_uses_configured_length() {
        let config = AnalysisConfig {
            window_days: 7,
            ..Default::default()
        };
        let pipeline = EnergyPipeline::new(config).unwrap();
        let window = pipeline.window_ending_on(date(31)).unwrap();
        assert_eq!(window.start, date(25));
        assert_eq!(window.len_days(), 7);
    }
}
