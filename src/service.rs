//! Prediction service: ad-hoc, batch and lookup scoring.
//!
//! Every path ends in the same place: a raw feature vector in the industry's
//! order goes through the stored normalizer, scaler and model, and the
//! probability is tiered by one shared set of thresholds.

use crate::aggregator::{Aggregation, AggregationSummary, FeatureAggregator};
use crate::error::{ChurnError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::metrics::ServiceMetrics;
use crate::models::PredictionContext;
use crate::store::FeatureTableStore;
use crate::types::record::flexible_id;
use crate::types::{
    FeatureRow, Industry, InsuranceFeatures, RawBatch, RiskLevelThresholds, ScoredPrediction,
    TelecomFeatures,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Today's date in UTC, the default aggregation clock
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Identity supplied to a single-customer lookup
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerLookup {
    #[serde(default, deserialize_with = "flexible_id::deserialize_option")]
    pub broadband_number: Option<String>,
    #[serde(default, deserialize_with = "flexible_id::deserialize_option")]
    pub customer_id: Option<String>,
    /// Forces the industry instead of inferring it from the identity field
    #[serde(default)]
    pub industry: Option<Industry>,
}

impl CustomerLookup {
    pub fn broadband(number: impl Into<String>) -> Self {
        Self {
            broadband_number: Some(number.into()),
            ..Self::default()
        }
    }

    pub fn customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
            ..Self::default()
        }
    }

    pub fn with_industry(mut self, industry: Industry) -> Self {
        self.industry = Some(industry);
        self
    }

    fn target(&self) -> Result<LookupTarget<'_>> {
        let broadband = self.broadband_number.as_deref();
        let customer = self.customer_id.as_deref();

        match (self.industry, broadband, customer) {
            (None | Some(Industry::Telecom), Some(number), _) => Ok(LookupTarget::Broadband(number)),
            (Some(Industry::Telecom), None, Some(id)) => Ok(LookupTarget::TelecomCustomer(id)),
            (None | Some(Industry::Insurance), _, Some(id)) => Ok(LookupTarget::InsuranceCustomer(id)),
            (Some(Industry::Insurance), Some(_), None) => Err(ChurnError::Validation(
                "insurance lookups require customer_id".to_string(),
            )),
            (_, None, None) => Err(ChurnError::Validation(
                "either broadband_number or customer_id is required".to_string(),
            )),
        }
    }
}

enum LookupTarget<'a> {
    Broadband(&'a str),
    TelecomCustomer(&'a str),
    InsuranceCustomer(&'a str),
}

impl LookupTarget<'_> {
    fn industry(&self) -> Industry {
        match self {
            LookupTarget::Broadband(_) | LookupTarget::TelecomCustomer(_) => Industry::Telecom,
            LookupTarget::InsuranceCustomer(_) => Industry::Insurance,
        }
    }

    fn key(&self) -> &str {
        match self {
            LookupTarget::Broadband(key)
            | LookupTarget::TelecomCustomer(key)
            | LookupTarget::InsuranceCustomer(key) => key,
        }
    }
}

/// Predictions for every accepted customer plus who was dropped
#[derive(Debug, Clone, Serialize)]
pub struct BatchPrediction {
    pub predictions: Vec<ScoredPrediction>,
    pub summary: AggregationSummary,
}

/// Scores requests against a shared, read-only prediction context
pub struct PredictionService {
    context: Arc<PredictionContext>,
    tables: FeatureTableStore,
    thresholds: RiskLevelThresholds,
    metrics: Arc<ServiceMetrics>,
    clock: fn() -> NaiveDate,
}

impl PredictionService {
    pub fn new(
        context: Arc<PredictionContext>,
        tables: FeatureTableStore,
        thresholds: RiskLevelThresholds,
    ) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            context,
            tables,
            thresholds,
            metrics: Arc::new(ServiceMetrics::new()),
            clock: today,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the date used for policy age
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    pub fn thresholds(&self) -> &RiskLevelThresholds {
        &self.thresholds
    }

    /// Score a caller-supplied feature map
    pub fn predict(&self, industry: Industry, features: &Map<String, Value>) -> Result<ScoredPrediction> {
        let start = Instant::now();
        let vector = FeatureExtractor::new(industry).extract(features)?;
        let prediction = self.score(industry, &vector)?;
        self.metrics.record_latency(start.elapsed());

        debug!(
            industry = %industry,
            probability = prediction.churn_probability,
            risk = prediction.churn_risk.as_str(),
            "Feature prediction"
        );
        Ok(prediction)
    }

    /// Aggregate raw monthly records, store the table and score every complete customer
    pub fn predict_batch(&self, batch: RawBatch) -> Result<BatchPrediction> {
        let start = Instant::now();
        let industry = batch.industry();
        if batch.is_empty() {
            return Err(ChurnError::Validation("batch contains no records".to_string()));
        }

        let identities = self.tables.load_identities(industry)?;
        let aggregator = FeatureAggregator::new((self.clock)()).with_identities(identities);

        let (predictions, summary) = match &batch {
            RawBatch::Telecom(records) => self
                .score_and_store::<TelecomFeatures>(industry, aggregator.aggregate_telecom(records))?,
            RawBatch::Insurance(records) => self
                .score_and_store::<InsuranceFeatures>(industry, aggregator.aggregate_insurance(records))?,
        };

        if !summary.rejected.is_empty() {
            let dropped: Vec<&str> = summary
                .rejected
                .iter()
                .map(|r| r.customer_id.as_str())
                .collect();
            warn!(
                industry = %industry,
                rejected = summary.rejected_count(),
                customers = ?dropped,
                "Customers without six valid monthly records were skipped"
            );
        }

        self.metrics
            .record_batch(summary.accepted, summary.rejected_count());
        self.metrics.record_latency(start.elapsed());

        info!(
            industry = %industry,
            records = batch.len(),
            accepted = summary.accepted,
            rejected = summary.rejected_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch prediction complete"
        );

        Ok(BatchPrediction { predictions, summary })
    }

    /// Score one customer from the most recently stored table
    pub fn predict_single(&self, lookup: &CustomerLookup) -> Result<ScoredPrediction> {
        let start = Instant::now();
        let target = lookup.target()?;
        let industry = target.industry();

        let row = self.find_row(&target)?;
        let prediction = self.score(industry, &row.feature_vector())?.with_id(row.lookup_id());
        self.metrics.record_latency(start.elapsed());

        debug!(
            industry = %industry,
            id = %row.lookup_id(),
            probability = prediction.churn_probability,
            "Single customer prediction"
        );
        Ok(prediction)
    }

    fn find_row(&self, target: &LookupTarget<'_>) -> Result<FeatureRow> {
        let industry = target.industry();
        let not_stored = || {
            ChurnError::NotFound(format!(
                "no {} feature table has been stored; submit a batch first",
                industry
            ))
        };
        let missing = || ChurnError::NotFound(format!("{} not found", target.key()));

        match target {
            LookupTarget::Broadband(number) => {
                let table: Vec<TelecomFeatures> =
                    self.tables.load_table(industry)?.ok_or_else(not_stored)?;
                table
                    .into_iter()
                    .find(|row| row.broadband_number == *number)
                    .map(FeatureRow::from)
                    .ok_or_else(missing)
            }
            LookupTarget::TelecomCustomer(id) => {
                let table: Vec<TelecomFeatures> =
                    self.tables.load_table(industry)?.ok_or_else(not_stored)?;
                table
                    .into_iter()
                    .find(|row| row.customer_id == *id)
                    .map(FeatureRow::from)
                    .ok_or_else(missing)
            }
            LookupTarget::InsuranceCustomer(id) => {
                let table: Vec<InsuranceFeatures> =
                    self.tables.load_table(industry)?.ok_or_else(not_stored)?;
                let mut row = table
                    .into_iter()
                    .find(|row| row.customer_id == *id)
                    .ok_or_else(missing)?;
                row.refresh_policy_age((self.clock)());
                Ok(FeatureRow::from(row))
            }
        }
    }

    /// Score every row, then replace the stored table. A row that fails to
    /// score leaves the previous table in place.
    fn score_and_store<T>(
        &self,
        industry: Industry,
        aggregation: Aggregation<T>,
    ) -> Result<(Vec<ScoredPrediction>, AggregationSummary)>
    where
        T: Serialize + Clone + Into<FeatureRow>,
    {
        let Aggregation { rows, summary } = aggregation;
        let feature_rows: Vec<FeatureRow> = rows.iter().cloned().map(Into::into).collect();

        let predictions = feature_rows
            .iter()
            .map(|row| Ok(self.score(industry, &row.feature_vector())?.with_id(row.lookup_id())))
            .collect::<Result<Vec<_>>>()?;

        // An upload with no complete customer keeps the previous table
        if !feature_rows.is_empty() {
            let identities: Vec<(String, String)> = feature_rows
                .iter()
                .map(|row| (row.customer_id().to_string(), row.external_number().to_string()))
                .collect();
            self.tables.replace_table(industry, &rows, &identities)?;
        }

        Ok((predictions, summary))
    }

    fn score(&self, industry: Industry, features: &[f64]) -> Result<ScoredPrediction> {
        let probability = self.context.model(industry).score(features)?;
        let prediction = ScoredPrediction::new(probability, &self.thresholds);
        self.metrics.record_prediction(industry, prediction.churn_risk);
        Ok(prediction)
    }
}
