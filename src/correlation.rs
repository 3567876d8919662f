//! Correlation analysis
//!
//! Computes Pearson correlation coefficients between the three daily metric
//! pairs: energy/sleep, energy/stress and sleep/stress.
//!
//! Only days where both metrics of a pair are defined take part. Series are
//! reduced in date order, so shuffling the input never changes a result.

use crate::config::AnalysisConfig;
use crate::types::{
    CorrelationDirection, CorrelationPair, CorrelationResult, CorrelationStrength, DerivedMetrics,
};

/// Calculate correlations between daily metrics
#[derive(Debug, Clone, Copy)]
pub struct CorrelationAnalyzer {
    significance_threshold: f64,
    min_sample_size: usize,
}

impl CorrelationAnalyzer {
    pub fn new(significance_threshold: f64, min_sample_size: usize) -> Self {
        Self {
            significance_threshold,
            min_sample_size,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.significance_threshold, config.min_sample_size)
    }

    /// Correlate every pair, in `CorrelationPair::ALL` order
    pub fn analyze(&self, metrics: &[DerivedMetrics]) -> Vec<CorrelationResult> {
        let mut ordered: Vec<&DerivedMetrics> = metrics.iter().collect();
        ordered.sort_by_key(|m| m.date);

        CorrelationPair::ALL
            .iter()
            .map(|&pair| self.analyze_ordered(pair, &ordered))
            .collect()
    }

    /// Correlate a single pair
    pub fn analyze_pair(&self, pair: CorrelationPair, metrics: &[DerivedMetrics]) -> CorrelationResult {
        let mut ordered: Vec<&DerivedMetrics> = metrics.iter().collect();
        ordered.sort_by_key(|m| m.date);
        self.analyze_ordered(pair, &ordered)
    }

    fn analyze_ordered(&self, pair: CorrelationPair, ordered: &[&DerivedMetrics]) -> CorrelationResult {
        let (xs, ys): (Vec<f64>, Vec<f64>) = ordered
            .iter()
            .filter_map(|m| match pair_values(pair, m) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => None,
            })
            .unzip();

        let sample_size = xs.len();
        let coefficient = if sample_size < self.min_sample_size {
            None
        } else {
            pearson_correlation(&xs, &ys)
        };

        let significant = coefficient
            .map(|r| r.abs() >= self.significance_threshold)
            .unwrap_or(false)
            && sample_size >= self.min_sample_size;

        tracing::debug!(
            pair = pair.as_str(),
            sample_size,
            coefficient = ?coefficient,
            significant,
            "Correlated metric pair"
        );

        CorrelationResult {
            pair,
            coefficient,
            sample_size,
            significant,
            strength: coefficient.map(correlation_strength),
            direction: coefficient.map(correlation_direction),
        }
    }
}

fn pair_values(pair: CorrelationPair, m: &DerivedMetrics) -> (Option<f64>, Option<f64>) {
    let energy = m.net_energy_balance.map(|v| v as f64);
    match pair {
        CorrelationPair::EnergySleep => (energy, m.sleep_score),
        CorrelationPair::EnergyStress => (energy, m.stress_index),
        CorrelationPair::SleepStress => (m.sleep_score, m.stress_index),
    }
}

/// Calculate the Pearson correlation coefficient.
///
/// Returns `None` for mismatched or empty input and when either series has
/// zero variance; otherwise a value in [-1, 1].
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }

    Some((cov / denominator).clamp(-1.0, 1.0))
}

/// Convert a coefficient to a human-readable strength
fn correlation_strength(r: f64) -> CorrelationStrength {
    let abs_r = r.abs();
    if abs_r > 0.7 {
        CorrelationStrength::Strong
    } else if abs_r > 0.5 {
        CorrelationStrength::Moderate
    } else if abs_r > 0.3 {
        CorrelationStrength::Weak
    } else {
        CorrelationStrength::Negligible
    }
}

fn correlation_direction(r: f64) -> CorrelationDirection {
    if r < 0.0 {
        CorrelationDirection::Negative
    } else {
        CorrelationDirection::Positive
    }
}
