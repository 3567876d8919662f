//! Insight requests
//!
//! This module packages derived metrics and correlations into a single
//! `InsightRequest` for the language-model collaborator, renders it as chat
//! messages, and validates the structured answer into typed recommendations.
//!
//! The engine never writes recommendation text itself. A failed or partial
//! answer becomes `InsightOutcome::Unavailable`, naming the themes that lack text.

use crate::config::DateWindow;
use crate::error::InsightError;
use crate::types::{
    AggregateSummary, ChatMessage, ChatRole, CorrelationResult, DayRecord, DaySnapshot,
    DerivedMetrics, InsightOutcome, InsightRequest, MetricAggregate, Recommendation,
    RecommendationSet, Theme,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;
use std::time::Duration;
use uuid::Uuid;

const SYSTEM_PROMPT: &str = "You are an expert on sleep, stress and health. You spend all your \
time analyzing sleep and stress data and how it influences the energy level of people. Analyze \
the data you are given and advise how to achieve more days with a positive energy balance.";

/// Language-model collaborator.
///
/// Implementations own transport, retries and honoring the timeout. The
/// request is moved in: it is used exactly once.
pub trait InsightProvider {
    /// Send the request and return the raw response text
    fn complete(&self, request: InsightRequest, timeout: Duration) -> Result<String, InsightError>;
}

/// Builder for the per-run insight request
#[derive(Debug, Clone, Default)]
pub struct InsightRequestBuilder {
    free_text_context: Option<String>,
}

impl InsightRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach free text passed to the model alongside the data
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.free_text_context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    /// Assemble the request for a window
    pub fn build(
        &self,
        window: &DateWindow,
        records: &[DayRecord],
        metrics: &[DerivedMetrics],
        correlations: &[CorrelationResult],
    ) -> InsightRequest {
        let annotations: BTreeMap<_, _> = records
            .iter()
            .map(|r| (r.date, (r.sleep_feedback.clone(), r.sleep_insight.clone())))
            .collect();

        let mut days: Vec<DaySnapshot> = metrics
            .iter()
            .map(|m| {
                let (sleep_feedback, sleep_insight) =
                    annotations.get(&m.date).cloned().unwrap_or_default();
                DaySnapshot {
                    date: m.date,
                    charged: m.body_battery.map(|bb| bb.charged),
                    drained: m.body_battery.map(|bb| bb.drained),
                    net_energy_balance: m.net_energy_balance,
                    sleep_score: m.sleep_score,
                    sleep_minutes: m.sleep_minutes,
                    stress_index: m.stress_index,
                    sleep_feedback,
                    sleep_insight,
                }
            })
            .collect();
        days.sort_by_key(|d| d.date);

        let request = InsightRequest {
            request_id: Uuid::new_v4(),
            window_start: window.start,
            window_end: window.end,
            aggregate_summary: summarize(metrics),
            correlations: correlations.to_vec(),
            days,
            free_text_context: self.free_text_context.clone(),
            themes: Theme::ALL.to_vec(),
        };

        tracing::debug!(
            request_id = %request.request_id,
            days = request.days.len(),
            "Built insight request"
        );

        request
    }
}

/// Definedness-aware aggregates over the metric series
pub fn summarize(metrics: &[DerivedMetrics]) -> AggregateSummary {
    AggregateSummary {
        net_energy_balance: aggregate(
            metrics
                .iter()
                .map(|m| m.net_energy_balance.map(|v| v as f64)),
        ),
        sleep_score: aggregate(metrics.iter().map(|m| m.sleep_score)),
        stress_index: aggregate(metrics.iter().map(|m| m.stress_index)),
    }
}

/// Min/max/mean over defined values; `None` when nothing is defined
pub fn aggregate(values: impl IntoIterator<Item = Option<f64>>) -> Option<MetricAggregate> {
    let defined: Vec<f64> = values.into_iter().flatten().collect();
    if defined.is_empty() {
        return None;
    }

    let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
    let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = defined.iter().sum::<f64>() / defined.len() as f64;

    Some(MetricAggregate {
        min,
        max,
        mean,
        count: defined.len(),
    })
}

impl InsightRequest {
    /// Render the request as system and user chat messages
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: ChatRole::System,
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: ChatRole::User,
                content: self.render_user_prompt(),
            },
        ]
    }

    fn render_user_prompt(&self) -> String {
        let mut out = format!(
            "Analyze the energy balance data from {} to {}: body battery charged and drained, \
             sleep and stress levels. Use the sleep feedback and sleep insights to identify which \
             factors cause a negative energy balance and which cause a positive day.\n\n",
            self.window_start, self.window_end
        );

        out.push_str("Window aggregates (undefined values excluded):\n");
        let summary = &self.aggregate_summary;
        for (name, aggregate) in [
            ("net energy balance", &summary.net_energy_balance),
            ("sleep score (0-100)", &summary.sleep_score),
            ("stress index (0-100)", &summary.stress_index),
        ] {
            match aggregate {
                Some(a) => out.push_str(&format!(
                    "- {name}: min {:.1}, max {:.1}, mean {:.1} over {} days\n",
                    a.min, a.max, a.mean, a.count
                )),
                None => out.push_str(&format!("- {name}: no data\n")),
            }
        }

        out.push_str("\nCorrelations (Pearson, days with both values):\n");
        for c in &self.correlations {
            match c.coefficient {
                Some(r) => out.push_str(&format!(
                    "- {}: r={:.2}, n={}, {}\n",
                    c.pair.as_str(),
                    r,
                    c.sample_size,
                    if c.significant { "significant" } else { "not significant" }
                )),
                None => out.push_str(&format!(
                    "- {}: undefined (n={})\n",
                    c.pair.as_str(),
                    c.sample_size
                )),
            }
        }

        out.push_str("\nDaily data (date | charged | drained | net | sleep score | sleep minutes | stress index | sleep feedback | sleep insight):\n");
        for d in &self.days {
            out.push_str(&format!(
                "{} | {} | {} | {} | {} | {} | {} | {} | {}\n",
                d.date,
                or_na(d.charged),
                or_na(d.drained),
                or_na(d.net_energy_balance),
                or_na(d.sleep_score.map(|v| format!("{v:.1}"))),
                or_na(d.sleep_minutes),
                or_na(d.stress_index.map(|v| format!("{v:.1}"))),
                d.sleep_feedback.as_deref().unwrap_or("n/a"),
                d.sleep_insight.as_deref().unwrap_or("n/a"),
            ));
        }

        if let Some(context) = &self.free_text_context {
            out.push_str(&format!("\nAdditional context: {context}\n"));
        }

        let themes: Vec<&str> = self.themes.iter().map(|t| t.as_str()).collect();
        out.push_str(&format!(
            "\nRespond with JSON only, in the form \
             {{\"recommendations\": [{{\"theme\": \"<theme>\", \"text\": \"<recommendation>\"}}]}}, \
             with exactly one short recommendation for each of these themes: {}.\n",
            themes.join(", ")
        ));

        out
    }
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

#[derive(Debug, Deserialize)]
struct RawInsightResponse {
    recommendations: Vec<RawRecommendation>,
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    theme: String,
    text: Option<String>,
}

/// Validate a model response into one recommendation per theme
pub fn parse_recommendations(raw: &str) -> Result<RecommendationSet, InsightError> {
    let body = extract_json_object(raw)
        .ok_or_else(|| InsightError::MalformedResponse("no JSON object found".to_string()))?;
    let response: RawInsightResponse = serde_json::from_str(body)
        .map_err(|e| InsightError::MalformedResponse(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut found: Vec<Recommendation> = Vec::new();

    for entry in response.recommendations {
        let Some(theme) = Theme::parse(&entry.theme) else {
            tracing::warn!(theme = %entry.theme, "Ignoring recommendation for unknown theme");
            continue;
        };
        if !seen.insert(theme) {
            return Err(InsightError::DuplicateTheme(theme));
        }
        let text = entry.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(InsightError::EmptyRecommendation(theme));
        }
        found.push(Recommendation {
            theme,
            text: text.to_string(),
        });
    }

    let missing: Vec<Theme> = Theme::ALL
        .iter()
        .copied()
        .filter(|t| !seen.contains(t))
        .collect();
    if !missing.is_empty() {
        return Err(InsightError::MissingThemes(missing));
    }

    found.sort_by_key(|r| r.theme);
    Ok(RecommendationSet {
        recommendations: found,
    })
}

/// Strip Markdown fences and surrounding prose around the JSON object
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Send the request through the provider and validate the answer.
///
/// Failures are recoverable: they come back as `InsightOutcome::Unavailable`.
pub fn request_insights(
    provider: &dyn InsightProvider,
    request: InsightRequest,
    timeout: Duration,
) -> InsightOutcome {
    let request_id = request.request_id;

    match provider
        .complete(request, timeout)
        .and_then(|raw| parse_recommendations(&raw))
    {
        Ok(set) => {
            tracing::info!(%request_id, "Received recommendations for every theme");
            InsightOutcome::Complete(set)
        }
        Err(err) => {
            let missing_themes = err.missing_themes();
            tracing::warn!(
                %request_id,
                error = %err,
                missing = ?missing_themes,
                "Insight request did not yield recommendations"
            );
            InsightOutcome::Unavailable {
                reason: err.to_string(),
                missing_themes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyBattery, CorrelationPair};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn metrics(day: u32, energy: Option<i64>, sleep: Option<f64>) -> DerivedMetrics {
        DerivedMetrics {
            date: date(day),
            body_battery: energy.map(|e| BodyBattery {
                charged: (50 + e) as u32,
                drained: 50,
            }),
            net_energy_balance: energy,
            sleep_score: sleep,
            stress_index: None,
            sleep_minutes: None,
            stress_peak: None,
        }
    }

    fn complete_response() -> &'static str {
        r#"{"recommendations": [
            {"theme": "energy", "text": "Protect recovery time on Mondays."},
            {"theme": "sleep", "text": "Go to bed before 23:00."},
            {"theme": "stress", "text": "Take short breaks in the afternoon."},
            {"theme": "cross_correlation", "text": "Better sleep tracks with a positive balance."}
        ]}"#
    }

    struct FixedProvider {
        response: Result<String, InsightError>,
        calls: Cell<usize>,
    }

    impl InsightProvider for FixedProvider {
        fn complete(&self, _request: InsightRequest, _timeout: Duration) -> Result<String, InsightError> {
            self.calls.set(self.calls.get() + 1);
            self.response.clone()
        }
    }

    #[test]
    fn test_aggregate_excludes_undefined() {
        let aggregate = aggregate([Some(10.0), None, Some(20.0)]).unwrap();
        assert_eq!(aggregate.min, 10.0);
        assert_eq!(aggregate.max, 20.0);
        assert_eq!(aggregate.mean, 15.0);
        assert_eq!(aggregate.count, 2);
    }

    #[test]
    fn test_all_undefined_aggregate_is_undefined() {
        assert_eq!(aggregate([None, None]), None);
        assert_eq!(aggregate(Vec::new()), None);
    }

    #[test]
    fn test_summarize_series() {
        let series = vec![
            metrics(1, Some(10), None),
            metrics(2, None, None),
            metrics(3, Some(20), None),
        ];
        let summary = summarize(&series);
        let energy = summary.net_energy_balance.unwrap();
        assert_eq!((energy.min, energy.max, energy.mean), (10.0, 20.0, 15.0));
        assert_eq!(summary.sleep_score, None);
        assert_eq!(summary.stress_index, None);
    }

    #[test]
    fn test_build_request() {
        let window = DateWindow::new(date(1), date(2)).unwrap();
        let mut record = DayRecord::empty(date(2));
        record.sleep_feedback = Some("Sleep was long and calm.".to_string());
        let series = vec![metrics(2, Some(-5), Some(60.0)), metrics(1, Some(5), None)];
        let correlations = vec![CorrelationResult {
            pair: CorrelationPair::EnergySleep,
            coefficient: None,
            sample_size: 1,
            significant: false,
            strength: None,
            direction: None,
        }];

        let request = InsightRequestBuilder::new()
            .with_context("Training for a marathon")
            .build(&window, &[record], &series, &correlations);

        assert_eq!(request.window_start, date(1));
        assert_eq!(request.window_end, date(2));
        assert_eq!(request.themes, Theme::ALL.to_vec());
        assert_eq!(request.days[0].date, date(1));
        assert_eq!(
            request.days[1].sleep_feedback.as_deref(),
            Some("Sleep was long and calm.")
        );
        assert_eq!(request.days[1].charged, Some(45));
        assert_eq!(request.correlations, correlations);
        assert_eq!(request.free_text_context.as_deref(), Some("Training for a marathon"));

        let messages = request.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        let prompt = &messages[1].content;
        assert!(prompt.contains("from 2024-01-01 to 2024-01-02"));
        assert!(prompt.contains("energy_sleep: undefined (n=1)"));
        assert!(prompt.contains("2024-01-02 | 45 | 50 | -5 | 60.0 | n/a | n/a | Sleep was long and calm. | n/a"));
        assert!(prompt.contains("Additional context: Training for a marathon"));
        assert!(prompt.contains("energy, sleep, stress, cross_correlation"));
    }

    #[test]
    fn test_blank_context_dropped() {
        let window = DateWindow::new(date(1), date(1)).unwrap();
        let request = InsightRequestBuilder::new()
            .with_context("   ")
            .build(&window, &[], &[], &[]);
        assert_eq!(request.free_text_context, None);
    }

    #[test]
    fn test_parse_complete_response() {
        let set = parse_recommendations(complete_response()).unwrap();
        let themes: Vec<Theme> = set.recommendations.iter().map(|r| r.theme).collect();
        assert_eq!(themes, Theme::ALL.to_vec());
        assert_eq!(set.get(Theme::Sleep), Some("Go to bed before 23:00."));
    }

    #[test]
    fn test_parse_fenced_response_in_any_order() {
        let raw = "Here you go:\n```json\n{\"recommendations\": [\
            {\"theme\": \"cross_correlation\", \"text\": \"c\"},\
            {\"theme\": \"Stress\", \"text\": \"s\"},\
            {\"theme\": \"sleep\", \"text\": \"z\"},\
            {\"theme\": \"energy\", \"text\": \"e\"},\
            {\"theme\": \"hydration\", \"text\": \"drink water\"}]}\n```";
        let set = parse_recommendations(raw).unwrap();
        assert_eq!(set.recommendations.len(), 4);
        assert_eq!(set.recommendations[0].theme, Theme::Energy);
        assert_eq!(set.get(Theme::Stress), Some("s"));
    }

    #[test]
    fn test_missing_theme_reported_exactly() {
        let raw = r#"{"recommendations": [
            {"theme": "energy", "text": "e"},
            {"theme": "sleep", "text": "s"},
            {"theme": "cross_correlation", "text": "c"}
        ]}"#;
        assert_eq!(
            parse_recommendations(raw),
            Err(InsightError::MissingThemes(vec![Theme::Stress]))
        );
    }

    #[test]
    fn test_empty_text_rejected() {
        let raw = r#"{"recommendations": [{"theme": "energy", "text": "  "}]}"#;
        assert_eq!(
            parse_recommendations(raw),
            Err(InsightError::EmptyRecommendation(Theme::Energy))
        );
    }

    #[test]
    fn test_duplicate_theme_rejected() {
        let raw = r#"{"recommendations": [{"theme": "sleep", "text": "a"}, {"theme": "sleep", "text": "b"}]}"#;
        assert_eq!(
            parse_recommendations(raw),
            Err(InsightError::DuplicateTheme(Theme::Sleep))
        );
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(matches!(
            parse_recommendations("Sleep more and stress less."),
            Err(InsightError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_recommendations(r#"{"advice": "sleep more"}"#),
            Err(InsightError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_insights_complete() {
        let provider = FixedProvider {
            response: Ok(complete_response().to_string()),
            calls: Cell::new(0),
        };
        let window = DateWindow::new(date(1), date(1)).unwrap();
        let request = InsightRequestBuilder::new().build(&window, &[], &[], &[]);

        let outcome = request_insights(&provider, request, Duration::from_secs(5));

        assert_eq!(provider.calls.get(), 1);
        assert!(outcome.recommendations().is_some());
    }

    #[test]
    fn test_request_insights_missing_theme_is_recoverable() {
        let provider = FixedProvider {
            response: Ok(r#"{"recommendations": [
                {"theme": "energy", "text": "e"},
                {"theme": "sleep", "text": "s"},
                {"theme": "cross_correlation", "text": "c"}
            ]}"#
            .to_string()),
            calls: Cell::new(0),
        };
        let window = DateWindow::new(date(1), date(1)).unwrap();
        let request = InsightRequestBuilder::new().build(&window, &[], &[], &[]);

        let outcome = request_insights(&provider, request, Duration::from_secs(5));

        match outcome {
            InsightOutcome::Unavailable {
                missing_themes,
                reason,
            } => {
                assert_eq!(missing_themes, vec![Theme::Stress]);
                assert!(reason.contains("stress"));
            }
            other => panic!("expected unavailable outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_request_insights_timeout() {
        let provider = FixedProvider {
            response: Err(InsightError::Timeout(5)),
            calls: Cell::new(0),
        };
        let window = DateWindow::new(date(1), date(1)).unwrap();
        let request = InsightRequestBuilder::new().build(&window, &[], &[], &[]);

        let outcome = request_insights(&provider, request, Duration::from_secs(5));

        assert_eq!(
            outcome,
            InsightOutcome::Unavailable {
                reason: "Insight provider timed out after 5 seconds".to_string(),
                missing_themes: Theme::ALL.to_vec(),
            }
        );
    }
}
