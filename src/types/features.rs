//! Aggregated one-row-per-customer feature sets

use crate::types::Industry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Six months of telecom usage reduced to one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelecomFeatures {
    pub customer_id: String,
    pub broadband_number: String,
    pub data_usage_mb: f64,
    pub login_attempts: u64,
    pub bill_amount: f64,
    pub payment_delay_days: i64,
    pub network_latency_ms: f64,
    pub packet_loss_percent: f64,
    pub download_speed_mbps: f64,
    pub churn_next_month: Option<u8>,
}

impl TelecomFeatures {
    /// Values in `Industry::Telecom.feature_order()`
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.data_usage_mb,
            self.login_attempts as f64,
            self.bill_amount,
            self.payment_delay_days as f64,
            self.network_latency_ms,
            self.packet_loss_percent,
            self.download_speed_mbps,
        ]
    }
}

/// Six months of policy activity reduced to one row.
///
/// `policy_start_date` is kept so `policy_age` can be re-derived when the row
/// is scored later than it was aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceFeatures {
    pub customer_id: String,
    pub policy_number: String,
    pub policy_start_date: NaiveDate,
    pub customer_age: f64,
    pub policy_age: i64,
    pub vehicle_value: f64,
    pub total_claims: u32,
    pub avg_claim_processing: f64,
    pub vehicle_changes: u32,
    pub months_to_renewal: f64,
    pub churn_next_month: Option<u8>,
}

impl InsuranceFeatures {
    /// Values in `Industry::Insurance.feature_order()`
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.customer_age,
            self.policy_age as f64,
            self.vehicle_value,
            self.total_claims as f64,
            self.avg_claim_processing,
            self.vehicle_changes as f64,
            self.months_to_renewal,
        ]
    }

    /// Recompute `policy_age` as of `as_of`
    pub fn refresh_policy_age(&mut self, as_of: NaiveDate) {
        self.policy_age = policy_age_days(self.policy_start_date, as_of);
    }
}

/// Days since policy start, never negative
pub fn policy_age_days(start: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - start).num_days().max(0)
}

/// Aggregated row of either industry
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureRow {
    Telecom(TelecomFeatures),
    Insurance(InsuranceFeatures),
}

impl FeatureRow {
    pub fn industry(&self) -> Industry {
        match self {
            FeatureRow::Telecom(_) => Industry::Telecom,
            FeatureRow::Insurance(_) => Industry::Insurance,
        }
    }

    pub fn customer_id(&self) -> &str {
        match self {
            FeatureRow::Telecom(row) => &row.customer_id,
            FeatureRow::Insurance(row) => &row.customer_id,
        }
    }

    /// Identifier reported with predictions and used for point lookups:
    /// the broadband number for telecom, the customer id for insurance.
    pub fn lookup_id(&self) -> &str {
        match self {
            FeatureRow::Telecom(row) => &row.broadband_number,
            FeatureRow::Insurance(row) => &row.customer_id,
        }
    }

    /// Broadband or policy number stored in the identity mapping
    pub fn external_number(&self) -> &str {
        match self {
            FeatureRow::Telecom(row) => &row.broadband_number,
            FeatureRow::Insurance(row) => &row.policy_number,
        }
    }

    pub fn feature_vector(&self) -> Vec<f64> {
        match self {
            FeatureRow::Telecom(row) => row.feature_vector(),
            FeatureRow::Insurance(row) => row.feature_vector(),
        }
    }

    pub fn label(&self) -> Option<u8> {
        match self {
            FeatureRow::Telecom(row) => row.churn_next_month,
            FeatureRow::Insurance(row) => row.churn_next_month,
        }
    }
}

impl From<TelecomFeatures> for FeatureRow {
    fn from(row: TelecomFeatures) -> Self {
        FeatureRow::Telecom(row)
    }
}

impl From<InsuranceFeatures> for FeatureRow {
    fn from(row: InsuranceFeatures) -> Self {
        FeatureRow::Insurance(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insurance_row() -> InsuranceFeatures {
        InsuranceFeatures {
            customer_id: "42".to_string(),
            policy_number: "POL-42".to_string(),
            policy_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            customer_age: 35.0,
            policy_age: 0,
            vehicle_value: 20000.0,
            total_claims: 1,
            avg_claim_processing: 12.0,
            vehicle_changes: 0,
            months_to_renewal: 4.0,
            churn_next_month: None,
        }
    }

    #[test]
    fn test_insurance_vector_follows_feature_order() {
        let mut row = insurance_row();
        row.refresh_policy_age(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        let vector = row.feature_vector();

        assert_eq!(vector.len(), Industry::Insurance.feature_count());
        assert_eq!(vector[0], 35.0);
        assert_eq!(vector[1], 30.0);
        assert_eq!(vector[6], 4.0);
    }

    #[test]
    fn test_policy_age_never_negative() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let before = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert_eq!(policy_age_days(start, before), 0);
    }

    #[test]
    fn test_lookup_id_per_industry() {
        let row = FeatureRow::from(insurance_row());
        assert_eq!(row.lookup_id(), "42");
        assert_eq!(row.industry(), Industry::Insurance);
    }
}
