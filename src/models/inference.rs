//! Scoring against the loaded artifacts of both industries

use crate::error::{ChurnError, Result};
use crate::models::classifier::ChurnClassifier;
use crate::models::loader::ArtifactStore;
use crate::models::scaler::ScalerArtifact;
use crate::types::Industry;
use tracing::{debug, info};

/// Scaler and classifier of one industry, applied in that order
pub struct IndustryModel {
    scaler: ScalerArtifact,
    model: Box<dyn ChurnClassifier>,
}

impl IndustryModel {
    pub fn new(scaler: ScalerArtifact, model: Box<dyn ChurnClassifier>) -> Self {
        Self { scaler, model }
    }

    pub fn industry(&self) -> Industry {
        self.scaler.industry
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Churn probability for one raw feature vector in the industry's order
    pub fn score(&self, features: &[f64]) -> Result<f64> {
        let scaled = self.scaler.transform(features)?;
        let probability = self.model.predict_proba(scaled.view())?;

        if probability.is_nan() {
            return Err(ChurnError::Model(format!(
                "{} returned NaN for {}",
                self.model.name(),
                self.industry()
            )));
        }

        debug!(industry = %self.industry(), probability, "Scored feature vector");
        Ok(probability.clamp(0.0, 1.0))
    }
}

/// Read-only artifacts shared by every request for the server's lifetime
pub struct PredictionContext {
    telecom: IndustryModel,
    insurance: IndustryModel,
}

impl PredictionContext {
    pub fn new(telecom: IndustryModel, insurance: IndustryModel) -> Self {
        Self { telecom, insurance }
    }

    /// Load both industries; any missing or mismatched artifact is an error
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let load = |industry: Industry| -> Result<IndustryModel> {
            let (scaler, model) = store.load(industry)?;
            Ok(IndustryModel::new(scaler, model))
        };

        let context = Self::new(load(Industry::Telecom)?, load(Industry::Insurance)?);
        info!(
            telecom_model = %context.telecom.model_name(),
            insurance_model = %context.insurance.model_name(),
            "Prediction context initialized"
        );
        Ok(context)
    }

    pub fn model(&self, industry: Industry) -> &IndustryModel {
        match industry {
            Industry::Telecom => &self.telecom,
            Industry::Insurance => &self.insurance,
        }
    }
}
