//! Offline training: aggregated rows in, fitted scaler and classifier out.
//!
//! The pipeline mirrors serving exactly: outlier normalizer, then standard
//! scaler, then the classifier. Fitting goes through linfa; only the fitted
//! parameters are persisted so the server can replay them without it.

use crate::config::TrainingConfig;
use crate::error::{ChurnError, Result};
use crate::models::classifier::{predict_many, ChurnClassifier};
use crate::models::{
    ArtifactStore, LogisticModel, ModelArtifact, ModelEvaluation, ScalerArtifact, StandardScaler,
};
use crate::normalizer::OutlierNormalizer;
use crate::types::{FeatureRow, Industry};
use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{concatenate, Array1, Array2, Axis, Ix1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Fitted artifacts plus hold-out metrics
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub scaler: ScalerArtifact,
    pub model: ModelArtifact,
    pub evaluation: ModelEvaluation,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Fit normalizer, scaler and classifier on the labelled rows of one industry
    pub fn train(&self, industry: Industry, rows: &[FeatureRow]) -> Result<TrainedModel> {
        let labelled: Vec<(&FeatureRow, bool)> = rows
            .iter()
            .filter(|row| row.industry() == industry)
            .filter_map(|row| row.label().map(|label| (row, label == 1)))
            .collect();

        let positives = labelled.iter().filter(|(_, churned)| *churned).count();
        if positives == 0 || positives == labelled.len() {
            return Err(ChurnError::Validation(format!(
                "{} training data needs both classes ({} rows, {} churned)",
                industry,
                labelled.len(),
                positives
            )));
        }

        let width = industry.feature_count();
        let flat: Vec<f64> = labelled
            .iter()
            .flat_map(|(row, _)| row.feature_vector())
            .collect();
        let records = Array2::from_shape_vec((labelled.len(), width), flat)?;
        let targets: Array1<bool> = labelled.iter().map(|(_, churned)| *churned).collect();
        let dataset = Dataset::new(records, targets).with_feature_names(industry.feature_order().to_vec());

        let (mut train, mut test) = stratified_split(dataset, self.config.test_fraction, self.config.seed)?;
        info!(
            industry = %industry,
            rows = labelled.len(),
            churned = positives,
            train = train.nsamples(),
            test = test.nsamples(),
            "Starting training"
        );

        let outliers = OutlierNormalizer::fit(
            &train.records,
            industry.feature_order(),
            self.config.outlier_columns.for_industry(industry),
        )?;
        outliers.apply_matrix(&mut train.records)?;
        outliers.apply_matrix(&mut test.records)?;

        let scaler = StandardScaler::fit(&train)?;
        train.records = scaler.transform_matrix(&train.records)?;
        test.records = scaler.transform_matrix(&test.records)?;

        let fitted = LogisticRegression::default()
            .alpha(self.config.l2_penalty)
            .max_iterations(self.config.max_iterations)
            .gradient_tolerance(self.config.gradient_tolerance)
            .fit(&train)
            .map_err(|e| ChurnError::Training(e.to_string()))?;
        let model = ModelArtifact::new(industry, churn_oriented(&fitted));
        debug!(intercept = model.classifier.intercept, "Fitted logistic regression");

        let evaluation = evaluate(&model, &test)?;

        info!(
            industry = %industry,
            accuracy = evaluation.accuracy,
            precision = evaluation.precision,
            recall = evaluation.recall,
            f1 = evaluation.f1,
            auc_roc = evaluation.auc_roc,
            "Model evaluation"
        );

        Ok(TrainedModel {
            scaler: ScalerArtifact::new(industry, outliers, scaler),
            model: model.with_evaluation(evaluation.clone()),
            evaluation,
        })
    }

    pub fn train_and_save(
        &self,
        industry: Industry,
        rows: &[FeatureRow],
        store: &ArtifactStore,
    ) -> Result<TrainedModel> {
        let trained = self.train(industry, rows)?;
        store.save(industry, &trained.scaler, &trained.model)?;
        Ok(trained)
    }
}

/// Shuffle and split each class separately so both keep their share in the test set
pub fn stratified_split(
    dataset: Dataset<f64, bool, Ix1>,
    test_fraction: f64,
    seed: u64,
) -> Result<(Dataset<f64, bool, Ix1>, Dataset<f64, bool, Ix1>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let train_ratio = (1.0 - test_fraction) as f32;
    let feature_names = dataset.feature_names();

    let mut train_parts = Vec::with_capacity(2);
    let mut test_parts = Vec::with_capacity(2);
    for class in [false, true] {
        let members: Vec<usize> = dataset
            .targets
            .iter()
            .enumerate()
            .filter(|(_, churned)| **churned == class)
            .map(|(i, _)| i)
            .collect();
        let subset = Dataset::new(
            dataset.records.select(Axis(0), &members),
            dataset.targets.select(Axis(0), &members),
        );
        let (train, test) = subset.shuffle(&mut rng).split_with_ratio(train_ratio);
        train_parts.push(train);
        test_parts.push(test);
    }

    let join = |parts: &[Dataset<f64, bool, Ix1>]| -> Result<Dataset<f64, bool, Ix1>> {
        let records: Vec<_> = parts.iter().map(|p| p.records.view()).collect();
        let targets: Vec<_> = parts.iter().map(|p| p.targets.view()).collect();
        Ok(Dataset::new(concatenate(Axis(0), &records)?, concatenate(Axis(0), &targets)?)
            .with_feature_names(feature_names.clone()))
    };

    Ok((join(&train_parts)?, join(&test_parts)?))
}

/// Serving parameters for P(churn).
///
/// linfa treats one of the two labels as its positive class; when that label
/// is "not churned" the decision function is negated.
fn churn_oriented(fitted: &FittedLogisticRegression<f64, bool>) -> LogisticModel {
    let weights = fitted.params().to_vec();
    let intercept = fitted.intercept();
    if fitted.labels().pos.class {
        LogisticModel::new(weights, intercept)
    } else {
        LogisticModel::new(weights.into_iter().map(|w| -w).collect(), -intercept)
    }
}

/// Hold-out metrics at a 0.5 decision threshold, churn being the positive class
pub fn evaluate(model: &dyn ChurnClassifier, test: &Dataset<f64, bool, Ix1>) -> Result<ModelEvaluation> {
    let scores = predict_many(model, &test.records)?;
    let predicted = scores.mapv(|p| p >= 0.5);
    let truth = test.targets.to_vec();

    let accuracy = predicted
        .confusion_matrix(test)
        .map_err(|e| ChurnError::Training(e.to_string()))?
        .accuracy();

    // linfa's binary precision and recall follow its own label order, so count churn directly
    let (mut tp, mut fp, mut fn_) = (0.0, 0.0, 0.0);
    for (&guess, &actual) in predicted.iter().zip(&truth) {
        match (guess, actual) {
            (true, true) => tp += 1.0,
            (true, false) => fp += 1.0,
            (false, true) => fn_ += 1.0,
            (false, false) => {}
        }
    }
    let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);

    Ok(ModelEvaluation {
        samples: test.nsamples(),
        accuracy: f64::from(accuracy),
        precision,
        recall,
        f1: ratio(2.0 * precision * recall, precision + recall),
        auc_roc: auc_roc(&scores, &truth)?,
    })
}

/// Area under the ROC curve; 0.5 when only one class is present
pub fn auc_roc(scores: &Array1<f64>, labels: &[bool]) -> Result<f64> {
    if labels.iter().all(|&l| l) || labels.iter().all(|&l| !l) {
        return Ok(0.5);
    }
    let probabilities = scores
        .iter()
        .map(|p| Pr::try_from(p.clamp(0.0, 1.0) as f32).map_err(|e| ChurnError::Training(e.to_string())))
        .collect::<Result<Array1<Pr>>>()?;
    let roc = probabilities
        .roc(labels)
        .map_err(|e| ChurnError::Training(e.to_string()))?;
    Ok(f64::from(roc.area_under_curve()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelecomFeatures;
    use ndarray::array;

    fn telecom_row(i: usize, churned: bool) -> FeatureRow {
        FeatureRow::from(TelecomFeatures {
            customer_id: i.to_string(),
            broadband_number: format!("011{:07}", i),
            data_usage_mb: 3000.0 - if churned { 1500.0 } else { 0.0 } + (i % 10) as f64 * 20.0,
            login_attempts: 100 + (i % 7) as u64,
            bill_amount: 300.0,
            payment_delay_days: if churned { 9 } else { 3 },
            network_latency_ms: 50.0 + (i % 5) as f64,
            packet_loss_percent: 0.8,
            download_speed_mbps: 95.0,
            churn_next_month: Some(u8::from(churned)),
        })
    }

    #[test]
    fn test_auc_roc() {
        let perfect = auc_roc(&array![0.1, 0.2, 0.8, 0.9], &[false, false, true, true]).unwrap();
        assert!((perfect - 1.0).abs() < 1e-6);
        let inverted = auc_roc(&array![0.9, 0.8, 0.2, 0.1], &[false, false, true, true]).unwrap();
        assert!(inverted < 1e-6);
        assert_eq!(auc_roc(&array![0.3, 0.4], &[true, true]).unwrap(), 0.5);
    }

    #[test]
    fn test_stratified_split_keeps_both_classes() {
        // row index stored in the single feature so rows can be traced after shuffling
        let records = Array2::from_shape_fn((50, 1), |(i, _)| i as f64);
        let targets: Array1<bool> = (0..50).map(|i| i % 5 == 0).collect();
        let (train, test) = stratified_split(Dataset::new(records, targets), 0.2, 42).unwrap();

        assert_eq!(train.nsamples() + test.nsamples(), 50);
        for part in [&train, &test] {
            assert!(part.targets.iter().any(|&t| t));
            assert!(part.targets.iter().any(|&t| !t));
        }
        let test_rows: Vec<f64> = test.records.column(0).to_vec();
        assert!(train.records.column(0).iter().all(|i| !test_rows.contains(i)));
        for (&row, &churned) in test.records.column(0).iter().zip(test.targets.iter()) {
            assert_eq!(churned, row as usize % 5 == 0);
        }
    }

    #[test]
    fn test_training_separates_classes() {
        let rows: Vec<FeatureRow> = (0..200).map(|i| telecom_row(i, i % 4 == 0)).collect();
        let trained = Trainer::new(TrainingConfig::default())
            .train(Industry::Telecom, &rows)
            .unwrap();

        assert!(trained.evaluation.auc_roc > 0.95);
        assert!(trained.evaluation.accuracy > 0.9);
        // lower usage means churn
        assert!(trained.model.classifier.weights[0] < 0.0);
        assert!(trained.scaler.check_compatible(Industry::Telecom).is_ok());
        assert_eq!(trained.model.evaluation.as_ref(), Some(&trained.evaluation));
    }

    #[test]
    fn test_single_class_is_rejected() {
        let rows: Vec<FeatureRow> = (0..20).map(|i| telecom_row(i, false)).collect();
        assert!(matches!(
            Trainer::new(TrainingConfig::default()).train(Industry::Telecom, &rows),
            Err(ChurnError::Validation(_))
        ));
    }
}
