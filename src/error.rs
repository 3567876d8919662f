//! Error types for Energy Balance

use crate::types::Theme;
use thiserror::Error;

/// Errors that stop a run before or while computing
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid window: end {end} is before start {start}")]
    InvalidWindow { start: String, end: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data provider error: {0}")]
    Provider(String),
}

/// Recoverable failures at the language-model boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsightError {
    #[error("Insight provider failed: {0}")]
    Provider(String),

    #[error("Insight provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("Malformed insight response: {0}")]
    MalformedResponse(String),

    #[error("Insight response is missing themes: {}", format_themes(.0))]
    MissingThemes(Vec<Theme>),

    #[error("Insight response repeats theme {}", .0.as_str())]
    DuplicateTheme(Theme),

    #[error("Insight response has empty text for theme {}", .0.as_str())]
    EmptyRecommendation(Theme),
}

impl InsightError {
    /// Themes left without recommendation text by this failure
    pub fn missing_themes(&self) -> Vec<Theme> {
        match self {
            InsightError::MissingThemes(themes) => themes.clone(),
            _ => Theme::ALL.to_vec(),
        }
    }
}

fn format_themes(themes: &[Theme]) -> String {
    themes
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_themes_message() {
        let err = InsightError::MissingThemes(vec![Theme::Stress]);
        assert_eq!(
            err.to_string(),
            "Insight response is missing themes: stress"
        );
        assert_eq!(err.missing_themes(), vec![Theme::Stress]);
    }

    #[test]
    fn test_transport_failure_leaves_every_theme_missing() {
        let err = InsightError::Timeout(30);
        assert_eq!(err.missing_themes(), Theme::ALL.to_vec());
    }
}
