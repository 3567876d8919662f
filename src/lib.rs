//! Energy Balance - correlation and insight engine for daily wearable signals
//!
//! Energy Balance turns per-day body battery, sleep and stress data into derived
//! metrics, correlations and an insight request through a deterministic
//! pipeline: provider adaptation → normalization → metric derivation
//! → correlation → insight request → report assembly.
//!
//! Data fetching and the language model stay outside the crate, behind the
//! `DataProvider` and `InsightProvider` traits.

pub mod adapters;
pub mod config;
pub mod correlation;
pub mod error;
pub mod features;
pub mod insight;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod types;

pub use adapters::{DataProvider, GarminAdapter, PayloadAdapter, ProviderPayload};
pub use config::{AnalysisConfig, DateWindow, SleepStageWeights};
pub use error::{ComputeError, InsightError};
pub use insight::{parse_recommendations, InsightProvider, InsightRequestBuilder};
pub use pipeline::{garmin_energy_report, AnalysisRun, EnergyPipeline};
pub use report::EnergyReport;

/// Engine version recorded by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
