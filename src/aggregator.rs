//! Per-customer feature aggregation.
//!
//! Reduces a customer's six monthly records to one feature row. The same
//! reductions feed training and serving, so any change here invalidates the
//! fitted artifacts.
//!
//! Reduction rules:
//! - sums: data usage, logins, bill amount, claims, vehicle changes
//! - means: payment delay (integer), latency, packet loss, download speed,
//!   claim processing over claimed months only
//! - point-in-time values (age, vehicle value, renewal, policy start, label)
//!   come from the record with the highest month, never from input position

use crate::types::features::policy_age_days;
use crate::types::{
    FeatureRow, InsuranceFeatures, InsuranceRecord, MonthlyRecord, RawBatch, TelecomFeatures,
    TelecomRecord,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Number of monthly records a customer needs before it can be scored.
pub const AGGREGATION_WINDOW: usize = 6;

/// Why a customer group produced no feature row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TooFewMonths,
    TooManyMonths,
    DuplicateMonth,
    /// A reduction overflowed or a record carried NaN/inf
    NonFiniteFeature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCustomer {
    pub customer_id: String,
    pub record_count: usize,
    pub reason: RejectionReason,
}

/// Accepted and rejected customer counts of one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
    pub accepted: usize,
    pub rejected: Vec<RejectedCustomer>,
}

impl AggregationSummary {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Feature rows plus the summary of who was dropped
#[derive(Debug, Clone)]
pub struct Aggregation<T> {
    pub rows: Vec<T>,
    pub summary: AggregationSummary,
}

impl<T> Aggregation<T> {
    /// Move rows with any non-finite feature into the rejected list
    fn reject_non_finite(mut self, features: fn(&T) -> Vec<f64>, customer_id: fn(&T) -> &str) -> Self {
        let (finite, broken): (Vec<T>, Vec<T>) = self
            .rows
            .into_iter()
            .partition(|row| features(row).iter().all(|v| v.is_finite()));
        if broken.is_empty() {
            self.rows = finite;
            return self;
        }

        for row in &broken {
            debug!(customer_id = %customer_id(row), "Customer dropped with non-finite features");
            self.summary.rejected.push(RejectedCustomer {
                customer_id: customer_id(row).to_string(),
                record_count: AGGREGATION_WINDOW,
                reason: RejectionReason::NonFiniteFeature,
            });
        }
        self.summary
            .rejected
            .sort_by(|a, b| compare_customer_ids(&a.customer_id, &b.customer_id));
        self.summary.accepted = finite.len();
        self.rows = finite;
        self
    }

    fn map_rows<U>(self, f: impl FnMut(T) -> U) -> Aggregation<U> {
        Aggregation {
            rows: self.rows.into_iter().map(f).collect(),
            summary: self.summary,
        }
    }
}

/// Groups monthly records by customer and reduces complete groups.
pub struct FeatureAggregator {
    /// Date `policy_age` is measured against
    as_of: NaiveDate,
    /// customer_id -> external number, used when uploads omit it
    identities: HashMap<String, String>,
}

impl FeatureAggregator {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            identities: HashMap::new(),
        }
    }

    pub fn with_identities(mut self, identities: HashMap<String, String>) -> Self {
        self.identities = identities;
        self
    }

    /// Aggregate a batch of either industry
    pub fn aggregate(&self, batch: &RawBatch) -> Aggregation<FeatureRow> {
        match batch {
            RawBatch::Telecom(records) => self.aggregate_telecom(records).map_rows(FeatureRow::from),
            RawBatch::Insurance(records) => {
                self.aggregate_insurance(records).map_rows(FeatureRow::from)
            }
        }
    }

    pub fn aggregate_telecom(&self, records: &[TelecomRecord]) -> Aggregation<TelecomFeatures> {
        let (groups, summary) = complete_groups(records);

        let rows = groups
            .into_iter()
            .map(|(customer_id, months)| {
                let n = months.len() as f64;
                let sum = |f: fn(&TelecomRecord) -> f64| months.iter().map(|r| f(r)).sum::<f64>();
                let last = months[months.len() - 1];

                TelecomFeatures {
                    broadband_number: self.external_number(&customer_id, &months),
                    data_usage_mb: round_to(sum(|r| r.data_usage_mb), 2),
                    login_attempts: months.iter().map(|r| u64::from(r.login_attempts)).sum(),
                    bill_amount: round_to(sum(|r| r.bill_amount), 2),
                    payment_delay_days: round_to(sum(|r| r.payment_delay_days) / n, 0) as i64,
                    network_latency_ms: round_to(sum(|r| r.network_latency_ms) / n, 2),
                    packet_loss_percent: round_to(sum(|r| r.packet_loss_percent) / n, 2),
                    download_speed_mbps: round_to(sum(|r| r.download_speed_mbps) / n, 2),
                    churn_next_month: last.churn_next_month,
                    customer_id,
                }
            })
            .collect();

        Aggregation { rows, summary }.reject_non_finite(TelecomFeatures::feature_vector, |row| row.customer_id.as_str())
    }

    pub fn aggregate_insurance(
        &self,
        records: &[InsuranceRecord],
    ) -> Aggregation<InsuranceFeatures> {
        let (groups, summary) = complete_groups(records);

        let rows = groups
            .into_iter()
            .map(|(customer_id, months)| {
                let last = months[months.len() - 1];

                let claimed: Vec<f64> = months
                    .iter()
                    .filter(|r| r.claim_filed == 1)
                    .map(|r| r.claim_processing_days)
                    .collect();
                let avg_claim_processing = if claimed.is_empty() {
                    0.0
                } else {
                    round_to(claimed.iter().sum::<f64>() / claimed.len() as f64, 2)
                };

                InsuranceFeatures {
                    policy_number: self.external_number(&customer_id, &months),
                    policy_start_date: last.policy_start_date,
                    customer_age: last.customer_age,
                    policy_age: policy_age_days(last.policy_start_date, self.as_of),
                    vehicle_value: last.vehicle_value,
                    total_claims: months.iter().map(|r| u32::from(r.claim_filed)).sum(),
                    avg_claim_processing,
                    vehicle_changes: months.iter().map(|r| u32::from(r.vehicle_changed)).sum(),
                    months_to_renewal: last.months_to_renewal,
                    churn_next_month: last.churn_next_month,
                    customer_id,
                }
            })
            .collect();

        Aggregation { rows, summary }.reject_non_finite(InsuranceFeatures::feature_vector, |row| row.customer_id.as_str())
    }

    /// First external number in month order, then the identity map, then the id itself
    fn external_number<R: MonthlyRecord>(&self, customer_id: &str, months: &[&R]) -> String {
        months
            .iter()
            .find_map(|r| r.external_number().filter(|n| !n.is_empty()))
            .map(str::to_string)
            .or_else(|| self.identities.get(customer_id).cloned())
            .unwrap_or_else(|| customer_id.to_string())
    }
}

/// Group records by customer, keeping only groups with exactly one record for
/// each of `AGGREGATION_WINDOW` distinct months. Accepted groups come back
/// sorted by month, and the groups themselves sorted by customer id.
fn complete_groups<R: MonthlyRecord>(records: &[R]) -> (Vec<(String, Vec<&R>)>, AggregationSummary) {
    let mut by_customer: HashMap<&str, Vec<&R>> = HashMap::new();
    for record in records {
        by_customer.entry(record.customer_id()).or_default().push(record);
    }

    let mut groups = Vec::with_capacity(by_customer.len());
    let mut rejected = Vec::new();

    for (customer_id, mut months) in by_customer {
        let record_count = months.len();
        let reason = match record_count.cmp(&AGGREGATION_WINDOW) {
            Ordering::Less => Some(RejectionReason::TooFewMonths),
            Ordering::Greater => Some(RejectionReason::TooManyMonths),
            Ordering::Equal => {
                months.sort_by_key(|r| r.month());
                months
                    .windows(2)
                    .any(|pair| pair[0].month() == pair[1].month())
                    .then_some(RejectionReason::DuplicateMonth)
            }
        };

        match reason {
            Some(reason) => {
                debug!(customer_id = %customer_id, record_count, ?reason, "Customer dropped from aggregation");
                rejected.push(RejectedCustomer {
                    customer_id: customer_id.to_string(),
                    record_count,
                    reason,
                });
            }
            None => groups.push((customer_id.to_string(), months)),
        }
    }

    groups.sort_by(|a, b| compare_customer_ids(&a.0, &b.0));
    rejected.sort_by(|a, b| compare_customer_ids(&a.customer_id, &b.customer_id));

    let summary = AggregationSummary {
        accepted: groups.len(),
        rejected,
    };
    (groups, summary)
}

/// Numeric ids in numeric order, anything else lexicographically after them
pub fn compare_customer_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Round half to even at `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
