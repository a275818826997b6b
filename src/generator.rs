//! Synthetic customer histories with an engineered churn signal.
//!
//! Each customer gets six monthly records. Only the final month carries a
//! sampled churn label; earlier months are labelled 0.

use crate::error::{ChurnError, Result};
use crate::types::record::csv_row_to_json;
use crate::types::{Industry, InsuranceRecord, TelecomRecord};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Months generated per customer
pub const MONTHS: u32 = 6;

/// Label probability when a strong churn signal is present
pub const HIGH_SIGNAL_PROBABILITY: f64 = 0.8;
/// Label probability for weaker, volatility-based signals
pub const MEDIUM_SIGNAL_PROBABILITY: f64 = 0.4;
pub const BASELINE_PROBABILITY: f64 = 0.1;

/// Area codes used as broadband number prefixes
pub const DISTRICT_CODES: [&str; 29] = [
    "011", "021", "023", "024", "025", "026", "027", "031", "032", "033", "034", "035", "036",
    "037", "038", "041", "045", "047", "051", "052", "054", "055", "057", "063", "065", "066",
    "067", "081", "091",
];

/// Generated raw records plus the customer_id -> external number mapping
#[derive(Debug, Clone)]
pub struct Dataset<R> {
    pub records: Vec<R>,
    pub identities: HashMap<String, String>,
}

fn normal(mean: f64, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| ChurnError::Generator(e.to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Trailing streaks and counts tracked while a telecom history is generated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelecomSignals {
    pub consecutive_high_latency: u32,
    pub consecutive_payment_delays: u32,
    pub usage_declines: u32,
}

/// Probability the customer churns after `months`
pub fn telecom_churn_probability(months: &[TelecomRecord], signals: TelecomSignals) -> f64 {
    let column = |f: fn(&TelecomRecord) -> f64| months.iter().map(f).collect::<Vec<f64>>();
    let usage = column(|r| r.data_usage_mb);
    let logins = column(|r| r.login_attempts as f64);
    let latency = column(|r| r.network_latency_ms);

    let high = signals.consecutive_high_latency >= 3
        || signals.consecutive_payment_delays >= 2
        || signals.usage_declines >= 2
        || mean(&column(|r| r.packet_loss_percent)) > 1.2
        || mean(&column(|r| r.download_speed_mbps)) < 70.0
        || mean(&logins) < 12.0
        || mean(&column(|r| r.payment_delay_days)) > 8.0
        || mean(&column(|r| r.bill_amount)) > 65.0;
    if high {
        return HIGH_SIGNAL_PROBABILITY;
    }

    let usage_mean = mean(&usage);
    let usage_cv = if usage_mean > 0.0 {
        sample_std(&usage) / usage_mean
    } else {
        0.0
    };
    let head = mean(&logins[..logins.len().min(2)]);
    let tail = mean(&logins[logins.len().saturating_sub(2)..]);

    let medium = sample_std(&latency) > 15.0 || usage_cv > 0.3 || tail < head * 0.8;
    if medium {
        MEDIUM_SIGNAL_PROBABILITY
    } else {
        BASELINE_PROBABILITY
    }
}

/// Telecom usage histories with district-coded broadband numbers
pub struct TelecomGenerator {
    rng: StdRng,
}

impl TelecomGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, customers: usize) -> Result<Dataset<TelecomRecord>> {
        let base_usage_dist = normal(500.0, 100.0)?;
        let base_bill_dist = normal(50.0, 10.0)?;
        let base_logins_dist =
            Poisson::new(20.0).map_err(|e| ChurnError::Generator(e.to_string()))?;
        let usage_noise = normal(0.0, 50.0)?;
        let bill_noise = normal(0.0, 5.0)?;
        let latency_dist = normal(50.0, 10.0)?;
        let speed_dist = normal(100.0, 20.0)?;

        let mut records = Vec::with_capacity(customers * MONTHS as usize);
        let mut identities = HashMap::with_capacity(customers);
        let mut used = HashSet::with_capacity(customers);

        for id in 1..=customers {
            let customer_id = id.to_string();
            let broadband_number = self.unique_broadband_number(&mut used);
            identities.insert(customer_id.clone(), broadband_number.clone());

            let base_usage = base_usage_dist.sample(&mut self.rng);
            let base_logins: f64 = base_logins_dist.sample(&mut self.rng);
            let base_bill = base_bill_dist.sample(&mut self.rng);

            let mut signals = TelecomSignals::default();
            let mut prev_usage: Option<f64> = None;
            let mut history = Vec::with_capacity(MONTHS as usize);

            for month in 1..=MONTHS {
                let usage = (base_usage + usage_noise.sample(&mut self.rng)).max(0.0);
                let logins = (base_logins + self.rng.gen_range(-5..5) as f64).max(0.0);
                let payment_delay = self.rng.gen_range(0..15) as f64;
                let latency = latency_dist.sample(&mut self.rng);
                let packet_loss = self.rng.gen_range(0.0..2.0);
                let speed = speed_dist.sample(&mut self.rng);
                let bill = (base_bill + bill_noise.sample(&mut self.rng)).max(0.0);

                signals.consecutive_high_latency = if latency > 65.0 {
                    signals.consecutive_high_latency + 1
                } else {
                    0
                };
                signals.consecutive_payment_delays = if payment_delay > 7.0 {
                    signals.consecutive_payment_delays + 1
                } else {
                    0
                };
                if matches!(prev_usage, Some(prev) if usage < prev * 0.8) {
                    signals.usage_declines += 1;
                }
                prev_usage = Some(usage);

                history.push(TelecomRecord {
                    customer_id: customer_id.clone(),
                    broadband_number: Some(broadband_number.clone()),
                    month,
                    data_usage_mb: round2(usage),
                    login_attempts: logins as u32,
                    bill_amount: round2(bill),
                    payment_delay_days: payment_delay,
                    network_latency_ms: round2(latency),
                    packet_loss_percent: round2(packet_loss),
                    download_speed_mbps: round2(speed),
                    churn_next_month: Some(0),
                });
            }

            let probability = telecom_churn_probability(&history, signals);
            let churned = self.rng.gen::<f64>() < probability;
            if let Some(last) = history.last_mut() {
                last.churn_next_month = Some(u8::from(churned));
            }
            records.extend(history);
        }

        Ok(Dataset {
            records,
            identities,
        })
    }

    fn unique_broadband_number(&mut self, used: &mut HashSet<String>) -> String {
        loop {
            let district = DISTRICT_CODES[self.rng.gen_range(0..DISTRICT_CODES.len())];
            let number = format!("{}{:07}", district, self.rng.gen_range(0..10_000_000u32));
            if used.insert(number.clone()) {
                return number;
            }
        }
    }
}

/// Point-in-time policy facts that drive the insurance churn label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsuranceSignals {
    pub customer_age: f64,
    pub policy_age_days: i64,
    pub total_claims: u32,
    pub avg_claim_processing: f64,
    pub vehicle_changes: u32,
    pub months_to_renewal: f64,
}

/// Probability the policy holder leaves at renewal
pub fn insurance_churn_probability(signals: InsuranceSignals) -> f64 {
    let high = (signals.total_claims >= 2 && signals.avg_claim_processing > 30.0)
        || (signals.months_to_renewal <= 1.0 && signals.policy_age_days < 365)
        || (signals.vehicle_changes >= 1 && signals.total_claims >= 1)
        || signals.avg_claim_processing > 45.0;
    if high {
        return HIGH_SIGNAL_PROBABILITY;
    }

    let medium = signals.avg_claim_processing > 20.0
        || signals.customer_age < 25.0
        || signals.policy_age_days < 730
        || signals.vehicle_changes >= 1;
    if medium {
        MEDIUM_SIGNAL_PROBABILITY
    } else {
        BASELINE_PROBABILITY
    }
}

/// Motor insurance policy histories measured against a fixed date
pub struct InsuranceGenerator {
    rng: StdRng,
    as_of: NaiveDate,
}

impl InsuranceGenerator {
    pub fn new(seed: u64, as_of: NaiveDate) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            as_of,
        }
    }

    pub fn generate(&mut self, customers: usize) -> Result<Dataset<InsuranceRecord>> {
        let vehicle_dist = normal(25_000.0, 8_000.0)?;
        let processing_dist = normal(20.0, 10.0)?;

        let mut records = Vec::with_capacity(customers * MONTHS as usize);
        let mut identities = HashMap::with_capacity(customers);

        for id in 1..=customers {
            let customer_id = id.to_string();
            let policy_number = format!("POL-{:08}", id);
            identities.insert(customer_id.clone(), policy_number.clone());

            let customer_age = self.rng.gen_range(18..76) as f64;
            let policy_start_date = self.as_of - Duration::days(self.rng.gen_range(30..3650));
            let mut vehicle_value = vehicle_dist.sample(&mut self.rng).max(2_000.0);
            let mut months_to_renewal = self.rng.gen_range(1..=12) as f64;

            let mut history = Vec::with_capacity(MONTHS as usize);
            let mut claim_days = Vec::new();
            let mut vehicle_changes = 0;

            for month in 1..=MONTHS {
                let claim_filed = self.rng.gen_bool(0.08);
                let claim_processing_days = if claim_filed {
                    let days = processing_dist.sample(&mut self.rng).max(1.0).round();
                    claim_days.push(days);
                    days
                } else {
                    0.0
                };
                let vehicle_changed = self.rng.gen_bool(0.03);
                if vehicle_changed {
                    vehicle_changes += 1;
                    vehicle_value = vehicle_dist.sample(&mut self.rng).max(2_000.0);
                } else {
                    vehicle_value *= 0.99;
                }

                history.push(InsuranceRecord {
                    customer_id: customer_id.clone(),
                    policy_number: Some(policy_number.clone()),
                    month,
                    customer_age,
                    policy_start_date,
                    vehicle_value: round2(vehicle_value),
                    claim_filed: u8::from(claim_filed),
                    claim_processing_days,
                    vehicle_changed: u8::from(vehicle_changed),
                    months_to_renewal,
                    churn_next_month: Some(0),
                });

                months_to_renewal = if months_to_renewal <= 1.0 {
                    12.0
                } else {
                    months_to_renewal - 1.0
                };
            }

            let last_renewal = history.last().map(|r| r.months_to_renewal).unwrap_or(12.0);
            let probability = insurance_churn_probability(InsuranceSignals {
                customer_age,
                policy_age_days: (self.as_of - policy_start_date).num_days(),
                total_claims: claim_days.len() as u32,
                avg_claim_processing: mean(&claim_days),
                vehicle_changes,
                months_to_renewal: last_renewal,
            });
            let churned = self.rng.gen::<f64>() < probability;
            if let Some(last) = history.last_mut() {
                last.churn_next_month = Some(u8::from(churned));
            }
            records.extend(history);
        }

        Ok(Dataset {
            records,
            identities,
        })
    }
}

/// `<dir>/<industry>_churn_data.csv`
pub fn raw_data_path(dir: &Path, industry: Industry) -> PathBuf {
    dir.join(format!("{}_churn_data.csv", industry))
}

pub fn write_records<R: Serialize>(path: &Path, records: &[R]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read raw records, keeping identifier columns as written
pub fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let headers = reader.headers()?.clone();

    reader
        .records()
        .enumerate()
        .map(|(idx, row)| {
            let row = row?;
            serde_json::from_value(csv_row_to_json(&headers, &row)).map_err(|e| {
                ChurnError::Validation(format!(
                    "{}: invalid record at row {}: {}",
                    path.display(),
                    idx + 1,
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::FeatureAggregator;
    use tempfile::tempdir;

    fn quiet_month(month: u32) -> TelecomRecord {
        TelecomRecord {
            customer_id: "1".into(),
            broadband_number: None,
            month,
            data_usage_mb: 500.0,
            login_attempts: 20,
            bill_amount: 50.0,
            payment_delay_days: 3.0,
            network_latency_ms: 50.0,
            packet_loss_percent: 0.5,
            download_speed_mbps: 100.0,
            churn_next_month: None,
        }
    }

    #[test]
    fn test_telecom_churn_rules() {
        let quiet: Vec<TelecomRecord> = (1..=6).map(quiet_month).collect();
        assert_eq!(
            telecom_churn_probability(&quiet, TelecomSignals::default()),
            BASELINE_PROBABILITY
        );

        let streak = TelecomSignals {
            consecutive_high_latency: 3,
            ..TelecomSignals::default()
        };
        assert_eq!(telecom_churn_probability(&quiet, streak), HIGH_SIGNAL_PROBABILITY);

        let mut lossy = quiet.clone();
        lossy.iter_mut().for_each(|r| r.packet_loss_percent = 1.5);
        assert_eq!(
            telecom_churn_probability(&lossy, TelecomSignals::default()),
            HIGH_SIGNAL_PROBABILITY
        );

        let mut fading = quiet;
        fading[4].login_attempts = 14;
        fading[5].login_attempts = 14;
        assert_eq!(
            telecom_churn_probability(&fading, TelecomSignals::default()),
            MEDIUM_SIGNAL_PROBABILITY
        );
    }

    #[test]
    fn test_telecom_dataset_shape() {
        let dataset = TelecomGenerator::new(7).generate(25).unwrap();
        assert_eq!(dataset.records.len(), 25 * MONTHS as usize);
        assert_eq!(dataset.identities.len(), 25);

        for record in &dataset.records {
            let number = record.broadband_number.as_deref().unwrap();
            assert_eq!(number.len(), 10);
            assert!(DISTRICT_CODES.contains(&&number[..3]));
            if record.month < MONTHS {
                assert_eq!(record.churn_next_month, Some(0));
            }
        }

        let aggregation = FeatureAggregator::new(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())
            .aggregate_telecom(&dataset.records);
        assert_eq!(aggregation.summary.accepted, 25);
        assert!(aggregation.summary.rejected.is_empty());
    }

    #[test]
    fn test_generation_is_deterministic_per_seed() {
        let a = TelecomGenerator::new(42).generate(5).unwrap();
        let b = TelecomGenerator::new(42).generate(5).unwrap();
        let c = TelecomGenerator::new(43).generate(5).unwrap();

        assert_eq!(a.records, b.records);
        assert_ne!(a.records, c.records);
    }

    #[test]
    fn test_insurance_dataset() {
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let dataset = InsuranceGenerator::new(3, as_of).generate(20).unwrap();
        assert_eq!(dataset.records.len(), 120);

        for record in &dataset.records {
            assert!(record.policy_start_date < as_of);
            assert!((1.0..=12.0).contains(&record.months_to_renewal));
            if record.claim_filed == 0 {
                assert_eq!(record.claim_processing_days, 0.0);
            }
        }
        assert_eq!(dataset.identities.get("3").map(String::as_str), Some("POL-00000003"));
    }

    #[test]
    fn test_insurance_churn_rules() {
        let settled = InsuranceSignals {
            customer_age: 45.0,
            policy_age_days: 2000,
            total_claims: 0,
            avg_claim_processing: 0.0,
            vehicle_changes: 0,
            months_to_renewal: 6.0,
        };
        assert_eq!(insurance_churn_probability(settled), BASELINE_PROBABILITY);

        let young = InsuranceSignals {
            customer_age: 22.0,
            ..settled
        };
        assert_eq!(insurance_churn_probability(young), MEDIUM_SIGNAL_PROBABILITY);

        let slow_claims = InsuranceSignals {
            total_claims: 2,
            avg_claim_processing: 35.0,
            ..settled
        };
        assert_eq!(insurance_churn_probability(slow_claims), HIGH_SIGNAL_PROBABILITY);
    }

    #[test]
    fn test_raw_csv_round_trip_keeps_rows() {
        let dir = tempdir().unwrap();
        let dataset = InsuranceGenerator::new(1, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .generate(3)
            .unwrap();
        let path = raw_data_path(dir.path(), Industry::Insurance);

        write_records(&path, &dataset.records).unwrap();
        let loaded: Vec<InsuranceRecord> = read_records(&path).unwrap();

        assert_eq!(loaded.len(), dataset.records.len());
        assert_eq!(loaded[0].policy_start_date, dataset.records[0].policy_start_date);
        assert_eq!(loaded[0].policy_number.as_deref(), Some("POL-00000001"));
    }

    #[test]
    fn test_raw_csv_keeps_leading_zero_numbers() {
        let dir = tempdir().unwrap();
        let path = raw_data_path(dir.path(), Industry::Telecom);
        let records: Vec<TelecomRecord> = (1..=6)
            .map(|month| TelecomRecord {
                broadband_number: Some("0111234567".to_string()),
                ..quiet_month(month)
            })
            .collect();

        write_records(&path, &records).unwrap();
        let loaded: Vec<TelecomRecord> = read_records(&path).unwrap();
        assert_eq!(loaded, records);

        let aggregation = FeatureAggregator::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .aggregate_telecom(&loaded);
        assert_eq!(aggregation.rows[0].broadband_number, "0111234567");
    }
}
