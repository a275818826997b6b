//! Outlier clipping and skew correction for numeric feature columns.
//!
//! Fitted once on the training set and persisted with the scaler, so serving
//! replays exactly the transform the model was trained behind.

use crate::error::{ChurnError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lower quantile used as Q1 for the clip range
pub const LOWER_QUANTILE: f64 = 0.05;
/// Upper quantile used as Q3 for the clip range
pub const UPPER_QUANTILE: f64 = 0.95;
/// Clipped columns more skewed than this get log(1+x)
pub const SKEW_THRESHOLD: f64 = 1.0;

/// Fitted transform for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransform {
    pub column: String,
    /// Position of the column in the industry's feature order
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub log1p: bool,
}

impl ColumnTransform {
    fn apply(&self, value: f64) -> Result<f64> {
        let clipped = value.clamp(self.lower, self.upper);
        if !self.log1p {
            return Ok(clipped);
        }
        if clipped <= -1.0 {
            return Err(ChurnError::Validation(format!(
                "feature '{}' value {} is outside the log transform domain",
                self.column, value
            )));
        }
        Ok(clipped.ln_1p())
    }
}

/// Fitted per-column clip and log transforms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlierNormalizer {
    pub transforms: Vec<ColumnTransform>,
}

impl OutlierNormalizer {
    /// Normalizer that leaves every value untouched
    pub fn identity() -> Self {
        Self::default()
    }

    /// Fit clip ranges and log flags for `columns` over the rows of `data`.
    ///
    /// `feature_names` gives the column order of `data`.
    pub fn fit(data: &Array2<f64>, feature_names: &[&str], columns: &[String]) -> Result<Self> {
        if data.ncols() != feature_names.len() {
            return Err(ChurnError::Validation(format!(
                "expected {} feature columns, got {}",
                feature_names.len(),
                data.ncols()
            )));
        }
        if data.nrows() == 0 {
            return Err(ChurnError::Validation(
                "cannot fit outlier normalizer on an empty dataset".to_string(),
            ));
        }

        let mut transforms = Vec::with_capacity(columns.len());
        for column in columns {
            let index = feature_names
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| {
                    ChurnError::Validation(format!("unknown column '{}' for outlier handling", column))
                })?;

            let values = data.column(index);
            let q1 = quantile(values, LOWER_QUANTILE);
            let q3 = quantile(values, UPPER_QUANTILE);
            let iqr = q3 - q1;
            let lower = q1 - 1.5 * iqr;
            let upper = q3 + 1.5 * iqr;

            let clipped: Vec<f64> = values.iter().map(|v| v.clamp(lower, upper)).collect();
            let skew = skewness(&clipped);
            let min = clipped.iter().copied().fold(f64::INFINITY, f64::min);

            let log1p = if skew > SKEW_THRESHOLD && min <= -1.0 {
                warn!(column = %column, skew, min, "Skewed column has values outside log domain, skipping log transform");
                false
            } else {
                skew > SKEW_THRESHOLD
            };

            debug!(column = %column, lower, upper, skew, log1p, "Fitted outlier transform");

            transforms.push(ColumnTransform {
                column: column.clone(),
                index,
                lower,
                upper,
                log1p,
            });
        }

        Ok(Self { transforms })
    }

    /// Apply the fitted transforms to one feature vector in place
    pub fn apply(&self, row: &mut [f64]) -> Result<()> {
        for transform in &self.transforms {
            let slot = row.get_mut(transform.index).ok_or_else(|| {
                ChurnError::Validation(format!(
                    "feature vector too short for column '{}'",
                    transform.column
                ))
            })?;
            *slot = transform.apply(*slot)?;
        }
        Ok(())
    }

    /// Apply the fitted transforms to every row of a matrix
    pub fn apply_matrix(&self, data: &mut Array2<f64>) -> Result<()> {
        for transform in &self.transforms {
            if transform.index >= data.ncols() {
                return Err(ChurnError::Validation(format!(
                    "matrix has no column for '{}'",
                    transform.column
                )));
            }
            for value in data.column_mut(transform.index).iter_mut() {
                *value = transform.apply(*value)?;
            }
        }
        Ok(())
    }

    /// Check every transform points at the column it was fitted on
    pub fn check_feature_order(&self, feature_names: &[&str]) -> std::result::Result<(), String> {
        for transform in &self.transforms {
            match feature_names.get(transform.index) {
                Some(name) if *name == transform.column => {}
                other => {
                    return Err(format!(
                        "outlier transform for '{}' targets index {} ({:?})",
                        transform.column, transform.index, other
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: ArrayView1<'_, f64>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (position - lo as f64)
}

/// Bias-adjusted sample skewness; 0 for fewer than three values or constant data
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_quantile_interpolates() {
        let values = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(quantile(values.view(), 0.0), 1.0);
        assert_eq!(quantile(values.view(), 0.5), 3.0);
        assert!((quantile(values.view(), 0.95) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn test_skewness() {
        assert_eq!(skewness(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(skewness(&[5.0, 5.0, 5.0, 5.0]), 0.0);
        assert!(skewness(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 50.0]) > 1.0);
    }

    #[test]
    fn test_fit_flags_skewed_column_only() {
        let names = ["symmetric", "skewed"];
        let data = array![
            [1.0, 1.0],
            [2.0, 1.0],
            [3.0, 1.0],
            [4.0, 1.0],
            [5.0, 1.0],
            [6.0, 2.0],
            [7.0, 1.0],
            [8.0, 40.0],
        ];
        let columns = vec!["symmetric".to_string(), "skewed".to_string()];

        let normalizer = OutlierNormalizer::fit(&data, &names, &columns).unwrap();

        assert_eq!(normalizer.transforms.len(), 2);
        assert!(!normalizer.transforms[0].log1p);
        assert!(normalizer.transforms[1].log1p);
        assert_eq!(normalizer.transforms[1].index, 1);
    }

    #[test]
    fn test_apply_matches_matrix_transform() {
        let normalizer = OutlierNormalizer {
            transforms: vec![ColumnTransform {
                column: "b".into(),
                index: 1,
                lower: 0.0,
                upper: 10.0,
                log1p: true,
            }],
        };

        let mut matrix = array![[3.0, 25.0], [4.0, 5.0]];
        normalizer.apply_matrix(&mut matrix).unwrap();

        let mut row = vec![3.0, 25.0];
        normalizer.apply(&mut row).unwrap();

        assert_eq!(row[0], 3.0);
        assert!((row[1] - 10f64.ln_1p()).abs() < 1e-12);
        assert_eq!(matrix[[0, 1]], row[1]);
        assert!((matrix[[1, 1]] - 5f64.ln_1p()).abs() < 1e-12);
    }

    #[test]
    fn test_log_domain_violation_is_validation_error() {
        let normalizer = OutlierNormalizer {
            transforms: vec![ColumnTransform {
                column: "a".into(),
                index: 0,
                lower: -5.0,
                upper: 5.0,
                log1p: true,
            }],
        };
        let mut row = vec![-3.0];
        assert!(matches!(
            normalizer.apply(&mut row),
            Err(ChurnError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let data = array![[1.0], [2.0]];
        let result = OutlierNormalizer::fit(&data, &["a"], &["b".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_feature_order() {
        let normalizer = OutlierNormalizer {
            transforms: vec![ColumnTransform {
                column: "bill_amount".into(),
                index: 2,
                lower: 0.0,
                upper: 1.0,
                log1p: false,
            }],
        };
        assert!(normalizer
            .check_feature_order(&["data_usage_mb", "login_attempts", "bill_amount"])
            .is_ok());
        assert!(normalizer
            .check_feature_order(&["bill_amount", "login_attempts", "data_usage_mb"])
            .is_err());
    }
}
