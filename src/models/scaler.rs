//! Feature standardization and the persisted scaler artifact

use crate::error::{ChurnError, Result};
use crate::normalizer::OutlierNormalizer;
use crate::types::Industry;
use chrono::{DateTime, Utc};
use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling fitted per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; constant columns use 1.0
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the records of a training dataset through linfa's standard scaler
    pub fn fit<T>(dataset: &DatasetBase<Array2<f64>, T>) -> Result<Self>
    where
        T: AsTargets,
    {
        if dataset.nsamples() == 0 {
            return Err(ChurnError::Validation(
                "cannot fit scaler on an empty dataset".to_string(),
            ));
        }
        let fitted = LinearScaler::standard()
            .fit(dataset)
            .map_err(|e| ChurnError::Training(e.to_string()))?;
        Ok(Self::from_linear(&fitted))
    }

    /// Keep only the fitted parameters of a linfa standard scaler.
    ///
    /// linfa stores the reciprocal standard deviation; constant columns
    /// come back with a unit scale.
    pub fn from_linear(fitted: &LinearScaler<f64>) -> Self {
        let scale = fitted
            .scales()
            .iter()
            .map(|&inv| {
                let std_dev = 1.0 / inv;
                if std_dev.is_finite() && std_dev > f64::EPSILON {
                    std_dev
                } else {
                    1.0
                }
            })
            .collect();

        Self {
            mean: fitted.offsets().to_vec(),
            scale,
        }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if row.len() != self.n_features() {
            return Err(ChurnError::Validation(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        Ok((&row - &mean) / &scale)
    }

    pub fn transform_matrix(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.n_features() {
            return Err(ChurnError::Validation(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                data.ncols()
            )));
        }
        let mean = ArrayView1::from(&self.mean[..]);
        let scale = ArrayView1::from(&self.scale[..]);
        Ok((data - &mean) / &scale)
    }
}

/// Everything applied to a raw feature vector before the model sees it.
///
/// Bound to one industry and to the feature order it was fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub industry: Industry,
    pub feature_names: Vec<String>,
    pub fitted_at: DateTime<Utc>,
    #[serde(default)]
    pub outliers: OutlierNormalizer,
    pub scaler: StandardScaler,
}

impl ScalerArtifact {
    pub fn new(industry: Industry, outliers: OutlierNormalizer, scaler: StandardScaler) -> Self {
        Self {
            industry,
            feature_names: industry.feature_order().iter().map(|s| s.to_string()).collect(),
            fitted_at: Utc::now(),
            outliers,
            scaler,
        }
    }

    /// Reject artifacts fitted on a different feature order or width
    pub fn check_compatible(&self, industry: Industry) -> Result<()> {
        let mismatch = |reason: String| ChurnError::ArtifactMismatch { industry, reason };

        if self.industry != industry {
            return Err(mismatch(format!("scaler was fitted for {}", self.industry)));
        }
        let expected = industry.feature_order();
        if self.feature_names.iter().map(String::as_str).ne(expected.iter().copied()) {
            return Err(mismatch(format!(
                "scaler feature order {:?} differs from {:?}",
                self.feature_names, expected
            )));
        }
        if self.scaler.n_features() != expected.len() || self.scaler.scale.len() != expected.len() {
            return Err(mismatch(format!(
                "scaler has {} columns, expected {}",
                self.scaler.n_features(),
                expected.len()
            )));
        }
        self.outliers.check_feature_order(expected).map_err(mismatch)
    }

    /// Outlier transform then standardization of one raw feature vector
    pub fn transform(&self, features: &[f64]) -> Result<Array1<f64>> {
        let mut row = features.to_vec();
        self.outliers.apply(&mut row)?;
        let scaled = self.scaler.transform(ArrayView1::from(&row[..]))?;

        if let Some(idx) = scaled.iter().position(|v| !v.is_finite()) {
            return Err(ChurnError::Validation(format!(
                "feature '{}' is not a finite number after scaling",
                self.feature_names.get(idx).map(String::as_str).unwrap_or("?")
            )));
        }
        Ok(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_and_transform() {
        let data = array![[1.0, 10.0], [3.0, 10.0]];
        let dataset = DatasetBase::from(data.clone());
        let scaler = StandardScaler::fit(&dataset).unwrap();

        assert_eq!(scaler.mean, vec![2.0, 10.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);

        let scaled = scaler.transform(array![3.0, 12.0].view()).unwrap();
        assert_eq!(scaled.to_vec(), vec![1.0, 2.0]);

        let matrix = scaler.transform_matrix(&data).unwrap();
        assert_eq!(matrix.row(0).to_vec(), vec![-1.0, 0.0]);
    }

    #[test]
    fn test_matches_linfa_transform() {
        let data = array![[1.0, 200.0, 5.0], [4.0, 260.0, 5.0], [7.0, 230.0, 5.0], [2.0, 250.0, 5.0]];
        let fitted = LinearScaler::standard()
            .fit(&DatasetBase::from(data.clone()))
            .unwrap();

        let ours = StandardScaler::from_linear(&fitted).transform_matrix(&data).unwrap();
        let theirs = fitted.transform(data.clone());

        for (a, b) in ours.iter().zip(theirs.iter()) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
        };
        assert!(scaler.transform(array![1.0, 2.0].view()).is_err());
    }

    #[test]
    fn test_artifact_order_check() {
        let scaler = StandardScaler {
            mean: vec![0.0; 7],
            scale: vec![1.0; 7],
        };
        let mut artifact = ScalerArtifact::new(Industry::Telecom, OutlierNormalizer::identity(), scaler);
        assert!(artifact.check_compatible(Industry::Telecom).is_ok());
        assert!(artifact.check_compatible(Industry::Insurance).is_err());

        artifact.feature_names.swap(0, 1);
        assert!(matches!(
            artifact.check_compatible(Industry::Telecom),
            Err(ChurnError::ArtifactMismatch { .. })
        ));
    }
}
