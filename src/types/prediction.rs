//! Churn prediction results and the risk scoring contract

use crate::error::{ChurnError, Result};
use serde::{Deserialize, Serialize};

/// Probabilities strictly above this are at least `Medium` risk.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.45;

/// Probabilities strictly above this are `High` risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

/// Risk tier derived from churn probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from probability and thresholds
    pub fn from_probability(probability: f64, thresholds: &RiskLevelThresholds) -> Self {
        if probability > thresholds.high {
            RiskLevel::High
        } else if probability > thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// Risk tier cut-offs, shared by every prediction path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
}

impl RiskLevelThresholds {
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.medium) || !in_range(self.high) || self.medium >= self.high {
            return Err(ChurnError::Validation(format!(
                "risk thresholds must satisfy 0 <= medium < high <= 1 (medium={}, high={})",
                self.medium, self.high
            )));
        }
        Ok(())
    }

    pub fn classify(&self, probability: f64) -> RiskLevel {
        RiskLevel::from_probability(probability, self)
    }
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: MEDIUM_RISK_THRESHOLD,
            high: HIGH_RISK_THRESHOLD,
        }
    }
}

/// Churn probability and tier for one customer or feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    /// Customer identifier; absent for ad-hoc feature predictions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Probability of churn next month (0.0 - 1.0)
    pub churn_probability: f64,

    pub churn_risk: RiskLevel,
}

impl ScoredPrediction {
    pub fn new(probability: f64, thresholds: &RiskLevelThresholds) -> Self {
        Self {
            id: None,
            churn_probability: probability,
            churn_risk: thresholds.classify(probability),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_probability() {
        let thresholds = RiskLevelThresholds::default();

        assert_eq!(thresholds.classify(0.1), RiskLevel::Low);
        assert_eq!(thresholds.classify(0.45), RiskLevel::Low);
        assert_eq!(thresholds.classify(0.46), RiskLevel::Medium);
        assert_eq!(thresholds.classify(0.70), RiskLevel::Medium);
        assert_eq!(thresholds.classify(0.71), RiskLevel::High);
    }

    #[test]
    fn test_risk_level_is_monotonic() {
        let thresholds = RiskLevelThresholds::default();
        let mut previous = RiskLevel::Low;
        for step in 0..=1000 {
            let level = thresholds.classify(step as f64 / 1000.0);
            assert!(level >= previous, "tier dropped at p={}", step as f64 / 1000.0);
            previous = level;
        }
    }

    #[test]
    fn test_partial_thresholds_fill_defaults() {
        let thresholds: RiskLevelThresholds = serde_json::from_str(r#"{"medium": 0.3}"#).unwrap();
        assert_eq!(thresholds.medium, 0.3);
        assert_eq!(thresholds.high, RiskLevelThresholds::default().high);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(RiskLevelThresholds::default().validate().is_ok());
        assert!(RiskLevelThresholds { medium: 0.7, high: 0.45 }.validate().is_err());
        assert!(RiskLevelThresholds { medium: 0.2, high: 1.2 }.validate().is_err());
    }

    #[test]
    fn test_prediction_serialization() {
        let prediction = ScoredPrediction::new(0.82, &RiskLevelThresholds::default());
        let json = serde_json::to_value(&prediction).unwrap();

        assert_eq!(json["churn_risk"], "High");
        assert!(json.get("id").is_none());

        let with_id = prediction.with_id("0111234567");
        let json = serde_json::to_value(&with_id).unwrap();
        assert_eq!(json["id"], "0111234567");
    }
}
