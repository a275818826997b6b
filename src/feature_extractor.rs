//! Feature extraction for ad-hoc predictions.
//!
//! Turns a caller-supplied feature map into a vector in the industry's fixed
//! feature order, the same order the scaler and model were fitted on.

use crate::error::{ChurnError, Result};
use crate::types::Industry;
use serde_json::{Map, Value};

/// Feature extractor that orders and validates named feature values.
///
/// Values may be JSON numbers or strings holding a number. Keys outside the
/// industry's feature order are ignored.
pub struct FeatureExtractor {
    industry: Industry,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new(industry: Industry) -> Self {
        Self { industry }
    }

    /// Extract features from a feature map.
    ///
    /// Fails with a validation error naming the first missing or non-numeric feature.
    pub fn extract(&self, features: &Map<String, Value>) -> Result<Vec<f64>> {
        self.feature_names()
            .iter()
            .map(|&name| {
                let value = features.get(name).ok_or_else(|| {
                    ChurnError::Validation(format!(
                        "missing feature '{}' for {}",
                        name, self.industry
                    ))
                })?;
                numeric_value(value).ok_or_else(|| {
                    ChurnError::Validation(format!(
                        "feature '{}' must be numeric, got {}",
                        name, value
                    ))
                })
            })
            .collect()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.industry.feature_count()
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        self.industry.feature_order()
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
