//! Industry selector and the fixed feature order of each industry

use crate::error::ChurnError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feature order the telecom scaler and model are fitted on.
pub const TELECOM_FEATURES: [&str; 7] = [
    "data_usage_mb",
    "login_attempts",
    "bill_amount",
    "payment_delay_days",
    "network_latency_ms",
    "packet_loss_percent",
    "download_speed_mbps",
];

/// Feature order the insurance scaler and model are fitted on.
pub const INSURANCE_FEATURES: [&str; 7] = [
    "customer_age",
    "policy_age",
    "vehicle_value",
    "total_claims",
    "avg_claim_processing",
    "vehicle_changes",
    "months_to_renewal",
];

/// Customer base a model is trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    Telecom,
    Insurance,
}

impl Industry {
    pub const ALL: [Industry; 2] = [Industry::Telecom, Industry::Insurance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::Telecom => "telecom",
            Industry::Insurance => "insurance",
        }
    }

    /// Canonical feature order. Never reorder: artifacts are bound to it.
    pub fn feature_order(&self) -> &'static [&'static str] {
        match self {
            Industry::Telecom => &TELECOM_FEATURES,
            Industry::Insurance => &INSURANCE_FEATURES,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.feature_order().len()
    }

    /// Name of the external display number for this industry's customers
    pub fn external_number_field(&self) -> &'static str {
        match self {
            Industry::Telecom => "broadband_number",
            Industry::Insurance => "policy_number",
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telecom" => Ok(Industry::Telecom),
            "insurance" => Ok(Industry::Insurance),
            other => Err(ChurnError::Validation(format!(
                "unknown industry '{}', expected 'telecom' or 'insurance'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_orders_are_fixed() {
        assert_eq!(Industry::Telecom.feature_order()[0], "data_usage_mb");
        assert_eq!(Industry::Telecom.feature_order()[6], "download_speed_mbps");
        assert_eq!(Industry::Insurance.feature_order()[1], "policy_age");
        assert_eq!(Industry::Insurance.feature_count(), 7);
    }

    #[test]
    fn test_parse_industry() {
        assert_eq!("Telecom".parse::<Industry>().unwrap(), Industry::Telecom);
        assert_eq!(" insurance ".parse::<Industry>().unwrap(), Industry::Insurance);
        assert!("banking".parse::<Industry>().is_err());
    }

    #[test]
    fn test_industry_serde_is_lowercase() {
        let json = serde_json::to_string(&Industry::Insurance).unwrap();
        assert_eq!(json, "\"insurance\"");
        let parsed: Industry = serde_json::from_str("\"telecom\"").unwrap();
        assert_eq!(parsed, Industry::Telecom);
    }
}
