//! Raw monthly customer records, as generated or uploaded

use crate::error::{ChurnError, Result};
use crate::types::Industry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Columns that stay text when read from CSV, so leading zeros survive
const IDENTITY_COLUMNS: [&str; 3] = ["customer_id", "broadband_number", "policy_number"];

/// Shared view of a monthly record used by the aggregator
pub trait MonthlyRecord {
    fn customer_id(&self) -> &str;
    fn month(&self) -> u32;
    fn external_number(&self) -> Option<&str>;
}

/// One month of telecom usage for one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelecomRecord {
    /// Internal customer key
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub customer_id: String,

    /// Externally displayed broadband number
    #[serde(default, deserialize_with = "flexible_id::deserialize_option")]
    pub broadband_number: Option<String>,

    /// Month index within the aggregation window (1-6)
    pub month: u32,

    pub data_usage_mb: f64,
    pub login_attempts: u32,
    pub bill_amount: f64,
    pub payment_delay_days: f64,
    pub network_latency_ms: f64,
    pub packet_loss_percent: f64,
    pub download_speed_mbps: f64,

    /// Churn label, only present in training data
    #[serde(default, deserialize_with = "flag::deserialize_option")]
    pub churn_next_month: Option<u8>,
}

impl MonthlyRecord for TelecomRecord {
    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn month(&self) -> u32 {
        self.month
    }

    fn external_number(&self) -> Option<&str> {
        self.broadband_number.as_deref()
    }
}

/// One month of motor insurance policy activity for one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceRecord {
    #[serde(deserialize_with = "flexible_id::deserialize")]
    pub customer_id: String,

    /// Externally displayed policy number
    #[serde(default, deserialize_with = "flexible_id::deserialize_option")]
    pub policy_number: Option<String>,

    pub month: u32,

    /// Age in years at the time of the record
    pub customer_age: f64,

    pub policy_start_date: NaiveDate,
    pub vehicle_value: f64,

    /// 1 if a claim was filed this month
    #[serde(deserialize_with = "flag::deserialize")]
    pub claim_filed: u8,

    /// Days taken to process this month's claim (ignored without a claim)
    #[serde(default)]
    pub claim_processing_days: f64,

    /// 1 if the insured vehicle changed this month
    #[serde(deserialize_with = "flag::deserialize")]
    pub vehicle_changed: u8,

    pub months_to_renewal: f64,

    #[serde(default, deserialize_with = "flag::deserialize_option")]
    pub churn_next_month: Option<u8>,
}

impl MonthlyRecord for InsuranceRecord {
    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn month(&self) -> u32 {
        self.month
    }

    fn external_number(&self) -> Option<&str> {
        self.policy_number.as_deref()
    }
}

/// Raw records of one industry, as received by a batch request
#[derive(Debug, Clone)]
pub enum RawBatch {
    Telecom(Vec<TelecomRecord>),
    Insurance(Vec<InsuranceRecord>),
}

impl RawBatch {
    /// Decode untyped JSON rows into the industry's record type.
    ///
    /// Fails on the first malformed row, naming its index.
    pub fn from_json_rows(industry: Industry, rows: Vec<serde_json::Value>) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>> {
            rows.into_iter()
                .enumerate()
                .map(|(idx, row)| {
                    serde_json::from_value(row).map_err(|e| {
                        ChurnError::Validation(format!("invalid record at index {}: {}", idx, e))
                    })
                })
                .collect()
        }

        Ok(match industry {
            Industry::Telecom => RawBatch::Telecom(decode(rows)?),
            Industry::Insurance => RawBatch::Insurance(decode(rows)?),
        })
    }

    pub fn industry(&self) -> Industry {
        match self {
            RawBatch::Telecom(_) => Industry::Telecom,
            RawBatch::Insurance(_) => Industry::Insurance,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawBatch::Telecom(records) => records.len(),
            RawBatch::Insurance(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convert one CSV row into a JSON object for the record deserializers.
///
/// Identity columns are kept as strings. Empty cells are left out so
/// optional and defaulted fields apply; other cells become numbers when they
/// parse as one.
pub fn csv_row_to_json(headers: &csv::StringRecord, row: &csv::StringRecord) -> Value {
    let mut object = Map::with_capacity(headers.len());
    for (column, cell) in headers.iter().zip(row.iter()) {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let value = if IDENTITY_COLUMNS.contains(&column) {
            Value::String(cell.to_string())
        } else if let Ok(n) = cell.parse::<u64>() {
            Value::from(n)
        } else if let Ok(n) = cell.parse::<i64>() {
            Value::from(n)
        } else if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            Value::Number(n)
        } else {
            Value::String(cell.to_string())
        };
        object.insert(column.to_string(), value);
    }
    Value::Object(object)
}

/// Identifiers arrive as strings from CSV and as numbers from spreadsheet-typed JSON.
pub(crate) mod flexible_id {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or integer identifier")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.trim().to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v.trim().to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            if v.is_finite() && v.fract() == 0.0 {
                Ok(format!("{}", v as i64))
            } else {
                Err(E::custom(format!("identifier {} is not an integer", v)))
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(IdVisitor)
    }

    struct OptionalIdVisitor;

    impl<'de> Visitor<'de> for OptionalIdVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional string or integer identifier")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            let id = deserialize(d)?;
            Ok(if id.is_empty() { None } else { Some(id) })
        }
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        deserializer.deserialize_option(OptionalIdVisitor)
    }
}

/// 0/1 flags, also accepting booleans.
pub(crate) mod flag {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = u8;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("0, 1, true or false")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<u8, E> {
            Ok(u8::from(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u8, E> {
            match v {
                0 | 1 => Ok(v as u8),
                _ => Err(E::custom(format!("flag must be 0 or 1, got {}", v))),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u8, E> {
            match v {
                0 | 1 => Ok(v as u8),
                _ => Err(E::custom(format!("flag must be 0 or 1, got {}", v))),
            }
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u8, E> {
            if v == 0.0 || v == 1.0 {
                Ok(v as u8)
            } else {
                Err(E::custom(format!("flag must be 0 or 1, got {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u8, E> {
            match v.trim().to_ascii_lowercase().as_str() {
                "0" | "false" => Ok(0),
                "1" | "true" => Ok(1),
                other => Err(E::custom(format!("flag must be 0 or 1, got '{}'", other))),
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct OptionalFlagVisitor;

    impl<'de> Visitor<'de> for OptionalFlagVisitor {
        type Value = Option<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional 0/1 flag")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            deserialize(d).map(Some)
        }
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u8>, D::Error> {
        deserializer.deserialize_option(OptionalFlagVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_telecom_record_accepts_numeric_identity() {
        let record: TelecomRecord = serde_json::from_value(json!({
            "customer_id": 17,
            "broadband_number": 111234567,
            "month": 3,
            "data_usage_mb": 512.5,
            "login_attempts": 20,
            "bill_amount": 49.99,
            "payment_delay_days": 4,
            "network_latency_ms": 48.2,
            "packet_loss_percent": 0.7,
            "download_speed_mbps": 101.3
        }))
        .unwrap();

        assert_eq!(record.customer_id, "17");
        assert_eq!(record.broadband_number.as_deref(), Some("111234567"));
        assert_eq!(record.churn_next_month, None);
    }

    #[test]
    fn test_missing_external_number_is_none() {
        let record: TelecomRecord = serde_json::from_value(json!({
            "customer_id": "C-9",
            "broadband_number": null,
            "month": 1,
            "data_usage_mb": 1.0,
            "login_attempts": 1,
            "bill_amount": 1.0,
            "payment_delay_days": 0,
            "network_latency_ms": 1.0,
            "packet_loss_percent": 0.0,
            "download_speed_mbps": 1.0,
            "churn_next_month": 1
        }))
        .unwrap();

        assert_eq!(record.broadband_number, None);
        assert_eq!(record.churn_next_month, Some(1));
    }

    #[test]
    fn test_insurance_flags_accept_booleans() {
        let record: InsuranceRecord = serde_json::from_value(json!({
            "customer_id": 4,
            "policy_number": "POL-0004",
            "month": 6,
            "customer_age": 41,
            "policy_start_date": "2021-03-15",
            "vehicle_value": 18500.0,
            "claim_filed": true,
            "claim_processing_days": 21,
            "vehicle_changed": 0,
            "months_to_renewal": 2
        }))
        .unwrap();

        assert_eq!(record.claim_filed, 1);
        assert_eq!(record.vehicle_changed, 0);
        assert_eq!(
            record.policy_start_date,
            NaiveDate::from_ymd_opt(2021, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_raw_batch_reports_bad_row_index() {
        let rows = vec![json!({"customer_id": 1}), json!({})];
        let err = RawBatch::from_json_rows(Industry::Telecom, rows).unwrap_err();
        match err {
            ChurnError::Validation(msg) => assert!(msg.contains("index 0")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_csv_record_keeps_leading_zero_and_empty_label() {
        let data = "customer_id,broadband_number,month,data_usage_mb,login_attempts,bill_amount,\
payment_delay_days,network_latency_ms,packet_loss_percent,download_speed_mbps,churn_next_month\n\
007,0111234567,1,500.0,20,50.0,3,50.0,1.0,100.0,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();

        let record: TelecomRecord = serde_json::from_value(csv_row_to_json(&headers, &row)).unwrap();
        assert_eq!(record.customer_id, "007");
        assert_eq!(record.broadband_number.as_deref(), Some("0111234567"));
        assert_eq!(record.login_attempts, 20);
        assert_eq!(record.churn_next_month, None);
    }

    #[test]
    fn test_csv_cells_typed_outside_identity_columns() {
        let headers = csv::StringRecord::from(vec!["policy_number", "customer_age", "policy_start_date", "claim_filed"]);
        let row = csv::StringRecord::from(vec!["00042", "41.5", "2021-03-15", "true"]);

        assert_eq!(
            csv_row_to_json(&headers, &row),
            json!({
                "policy_number": "00042",
                "customer_age": 41.5,
                "policy_start_date": "2021-03-15",
                "claim_filed": "true"
            })
        );
    }
}
