//! Classifier abstraction and the native logistic regression model

use crate::error::{ChurnError, Result};
use crate::types::Industry;
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// A fitted binary classifier returning P(churn) for one scaled feature vector
pub trait ChurnClassifier: Send + Sync {
    /// Model name for logs
    fn name(&self) -> &str;

    /// Number of input features the model was fitted on
    fn n_features(&self) -> usize;

    /// Probability of the positive (churn) class
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<f64>;
}

/// L2-regularised logistic regression parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Self {
        Self { weights, intercept }
    }

    pub fn decision_function(&self, features: ArrayView1<'_, f64>) -> f64 {
        ArrayView1::from(&self.weights[..]).dot(&features) + self.intercept
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Hold-out metrics recorded when the model was trained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub samples: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc_roc: f64,
}

/// Persisted classifier bound to one industry's feature order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub industry: Industry,
    pub name: String,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub classifier: LogisticModel,
    #[serde(default)]
    pub evaluation: Option<ModelEvaluation>,
}

impl ModelArtifact {
    pub fn new(industry: Industry, classifier: LogisticModel) -> Self {
        Self {
            industry,
            name: "logistic_regression".to_string(),
            feature_names: industry.feature_order().iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
            classifier,
            evaluation: None,
        }
    }

    pub fn with_evaluation(mut self, evaluation: ModelEvaluation) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    pub fn check_compatible(&self, industry: Industry) -> Result<()> {
        let mismatch = |reason: String| ChurnError::ArtifactMismatch { industry, reason };

        if self.industry != industry {
            return Err(mismatch(format!("model was trained for {}", self.industry)));
        }
        let expected = industry.feature_order();
        if self.feature_names.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(mismatch(format!(
                "model feature order {:?} differs from {:?}",
                self.feature_names, expected
            )));
        }
        if self.classifier.weights.len() != expected.len() {
            return Err(mismatch(format!(
                "model has {} weights, expected {}",
                self.classifier.weights.len(),
                expected.len()
            )));
        }
        Ok(())
    }
}

impl ChurnClassifier for ModelArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> usize {
        self.classifier.weights.len()
    }

    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        if features.len() != self.n_features() {
            return Err(ChurnError::Model(format!(
                "{} expects {} features, got {}",
                self.name,
                self.n_features(),
                features.len()
            )));
        }
        Ok(sigmoid(self.classifier.decision_function(features)))
    }
}

/// Convenience for batch evaluation during training
pub fn predict_many(model: &dyn ChurnClassifier, rows: &ndarray::Array2<f64>) -> Result<Array1<f64>> {
    rows.outer_iter()
        .map(|row| model.predict_proba(row))
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(2.0) > sigmoid(1.0));
    }

    #[test]
    fn test_logistic_prediction() {
        let weights = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0];
        let artifact = ModelArtifact::new(Industry::Telecom, LogisticModel::new(weights, 0.0));

        let p = artifact
            .predict_proba(array![2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0].view())
            .unwrap();
        assert_eq!(p, 0.5);

        let high = artifact
            .predict_proba(array![3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0].view())
            .unwrap();
        assert!(high > 0.9);
    }

    #[test]
    fn test_wrong_width_is_model_error() {
        let artifact = ModelArtifact::new(Industry::Telecom, LogisticModel::new(vec![0.0; 7], 0.0));
        assert!(matches!(
            artifact.predict_proba(array![1.0].view()),
            Err(ChurnError::Model(_))
        ));
    }

    #[test]
    fn test_compatibility_check() {
        let artifact = ModelArtifact::new(Industry::Insurance, LogisticModel::new(vec![0.0; 7], 0.0));
        assert!(artifact.check_compatible(Industry::Insurance).is_ok());
        assert!(artifact.check_compatible(Industry::Telecom).is_err());

        let short = ModelArtifact::new(Industry::Insurance, LogisticModel::new(vec![0.0; 6], 0.0));
        assert!(short.check_compatible(Industry::Insurance).is_err());
    }
}
