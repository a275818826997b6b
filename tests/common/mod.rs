//! Shared fixtures: hand-built artifacts and raw monthly records
#![allow(dead_code)]

use chrono::NaiveDate;
use churn_prediction_service::models::{
    ArtifactStore, LogisticModel, ModelArtifact, PredictionContext, ScalerArtifact, StandardScaler,
};
use churn_prediction_service::normalizer::OutlierNormalizer;
use churn_prediction_service::types::{Industry, RiskLevelThresholds};
use churn_prediction_service::{FeatureTableStore, PredictionService};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

pub fn fixed_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

pub fn year_later() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

/// Writes a telecom and an insurance artifact pair with fixed parameters
pub fn write_artifacts(dir: &Path) -> ArtifactStore {
    let store = ArtifactStore::new(dir);

    let telecom_scaler = ScalerArtifact::new(
        Industry::Telecom,
        OutlierNormalizer::identity(),
        StandardScaler {
            mean: vec![3000.0, 120.0, 300.0, 5.0, 50.0, 1.0, 90.0],
            scale: vec![1000.0, 30.0, 60.0, 3.0, 10.0, 0.5, 20.0],
        },
    );
    let telecom_model = ModelArtifact::new(
        Industry::Telecom,
        LogisticModel::new(vec![-0.5, -0.3, 0.2, 0.6, 0.3, 0.4, -0.4], -0.2),
    );
    store
        .save(Industry::Telecom, &telecom_scaler, &telecom_model)
        .unwrap();

    let insurance_scaler = ScalerArtifact::new(
        Industry::Insurance,
        OutlierNormalizer::identity(),
        StandardScaler {
            mean: vec![40.0, 1000.0, 20000.0, 1.0, 10.0, 0.0, 6.0],
            scale: vec![12.0, 800.0, 8000.0, 1.0, 10.0, 1.0, 3.0],
        },
    );
    let insurance_model = ModelArtifact::new(
        Industry::Insurance,
        LogisticModel::new(vec![-0.2, -0.5, 0.1, 0.6, 0.4, 0.3, -0.3], 0.1),
    );
    store
        .save(Industry::Insurance, &insurance_scaler, &insurance_model)
        .unwrap();

    store
}

pub fn service(artifacts_dir: &Path, data_dir: &Path, clock: fn() -> NaiveDate) -> PredictionService {
    let context = PredictionContext::load(&write_artifacts(artifacts_dir)).unwrap();
    PredictionService::new(
        Arc::new(context),
        FeatureTableStore::new(data_dir),
        RiskLevelThresholds::default(),
    )
    .unwrap()
    .with_clock(clock)
}

/// Six (or `months`) monthly telecom records for one customer
pub fn telecom_rows(customer_id: u64, broadband: Option<&str>, months: u32, usage: f64) -> Vec<Value> {
    (1..=months)
        .map(|month| {
            let mut row = json!({
                "customer_id": customer_id,
                "month": month,
                "data_usage_mb": usage + month as f64,
                "login_attempts": 18 + month,
                "bill_amount": 52.25,
                "payment_delay_days": month % 4,
                "network_latency_ms": 48.5,
                "packet_loss_percent": 0.9,
                "download_speed_mbps": 97.0
            });
            if let Some(number) = broadband {
                row["broadband_number"] = json!(number);
            }
            row
        })
        .collect()
}

pub fn insurance_rows(customer_id: u64, claims: bool) -> Vec<Value> {
    (1..=6)
        .map(|month| {
            let claim = claims && month % 3 == 0;
            json!({
                "customer_id": customer_id.to_string(),
                "policy_number": format!("POL-{:04}", customer_id),
                "month": month,
                "customer_age": 41,
                "policy_start_date": "2024-03-15",
                "vehicle_value": 18500.0,
                "claim_filed": u8::from(claim),
                "claim_processing_days": if claim { 14.0 } else { 0.0 },
                "vehicle_changed": 0,
                "months_to_renewal": 12 - month
            })
        })
        .collect()
}
