//! Churn Prediction Service Library
//!
//! Aggregates six months of telecom or insurance customer history into one
//! feature row per customer, scores it with a trained classifier and maps
//! the churn probability to a Low / Medium / High risk tier.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod generator;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod service;
pub mod store;
pub mod training;
pub mod types;

pub use aggregator::{AggregationSummary, FeatureAggregator};
pub use config::AppConfig;
pub use error::{ChurnError, Result};
pub use feature_extractor::FeatureExtractor;
pub use models::{ArtifactStore, PredictionContext};
pub use service::{BatchPrediction, CustomerLookup, PredictionService};
pub use store::FeatureTableStore;
pub use types::{Industry, RiskLevel, ScoredPrediction};
