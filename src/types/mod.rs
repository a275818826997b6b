//! Type definitions for the churn prediction service

pub mod features;
pub mod industry;
pub mod prediction;
pub mod record;

pub use features::{FeatureRow, InsuranceFeatures, TelecomFeatures};
pub use industry::Industry;
pub use prediction::{RiskLevel, RiskLevelThresholds, ScoredPrediction};
pub use record::{InsuranceRecord, MonthlyRecord, RawBatch, TelecomRecord};
