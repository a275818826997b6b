//! Persisted per-industry feature tables and identity mappings.
//!
//! Batch predictions replace an industry's table; single lookups read it.
//! Writes go through a temp file in the same directory and a rename, so a
//! reader sees either the previous complete table or the new one.

use crate::error::Result;
use crate::types::Industry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// CSV tables under one data directory, one lock per industry
pub struct FeatureTableStore {
    data_dir: PathBuf,
    telecom_lock: RwLock<()>,
    insurance_lock: RwLock<()>,
}

impl FeatureTableStore {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            telecom_lock: RwLock::new(()),
            insurance_lock: RwLock::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table_path(&self, industry: Industry) -> PathBuf {
        self.data_dir.join(format!("{}_features.csv", industry))
    }

    pub fn mapping_path(&self, industry: Industry) -> PathBuf {
        let name = match industry {
            Industry::Telecom => "customer_broadband_mapping.csv",
            Industry::Insurance => "customer_policy_mapping.csv",
        };
        self.data_dir.join(name)
    }

    fn lock(&self, industry: Industry) -> &RwLock<()> {
        match industry {
            Industry::Telecom => &self.telecom_lock,
            Industry::Insurance => &self.insurance_lock,
        }
    }

    /// Replace the aggregated table and merge `identities` into the mapping.
    ///
    /// Both files are written under the industry's write lock.
    pub fn replace_table<T: Serialize>(
        &self,
        industry: Industry,
        rows: &[T],
        identities: &[(String, String)],
    ) -> Result<()> {
        let _guard = self
            .lock(industry)
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        fs::create_dir_all(&self.data_dir)?;
        self.write_atomic(&self.table_path(industry), |file| {
            let mut writer = csv::Writer::from_writer(file);
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        })?;

        let mut mapping = read_mapping(&self.mapping_path(industry))?.unwrap_or_default();
        for (customer_id, external) in identities {
            mapping.insert(customer_id.clone(), external.clone());
        }
        self.write_mapping(industry, &mapping)?;

        info!(
            industry = %industry,
            rows = rows.len(),
            mapped_customers = mapping.len(),
            path = %self.table_path(industry).display(),
            "Feature table replaced"
        );
        Ok(())
    }

    /// All rows of the industry's table, `None` if no batch was ever stored
    pub fn load_table<T: DeserializeOwned>(&self, industry: Industry) -> Result<Option<Vec<T>>> {
        let _guard = self
            .lock(industry)
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let path = self.table_path(industry);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let rows = csv::Reader::from_reader(file)
            .deserialize()
            .collect::<std::result::Result<Vec<T>, csv::Error>>()?;
        debug!(industry = %industry, rows = rows.len(), "Feature table loaded");
        Ok(Some(rows))
    }

    /// customer_id -> external number; empty when no mapping exists yet
    pub fn load_identities(&self, industry: Industry) -> Result<HashMap<String, String>> {
        let _guard = self
            .lock(industry)
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(read_mapping(&self.mapping_path(industry))?.unwrap_or_default())
    }

    /// Overwrite the identity mapping, used by the data generator
    pub fn save_identities(&self, industry: Industry, mapping: &HashMap<String, String>) -> Result<()> {
        let _guard = self
            .lock(industry)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(&self.data_dir)?;
        self.write_mapping(industry, mapping)
    }

    fn write_mapping(&self, industry: Industry, mapping: &HashMap<String, String>) -> Result<()> {
        let mut entries: Vec<(&String, &String)> = mapping.iter().collect();
        entries.sort_by(|a, b| crate::aggregator::compare_customer_ids(a.0, b.0));

        self.write_atomic(&self.mapping_path(industry), |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(["customer_id", industry.external_number_field()])?;
            for (customer_id, external) in entries {
                writer.write_record([customer_id.as_str(), external.as_str()])?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    fn write_atomic<F>(&self, path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        write(tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Mapping files are read as plain strings so identifiers keep leading zeros
fn read_mapping(path: &Path) -> Result<Option<HashMap<String, String>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut mapping = HashMap::new();
    for record in csv::Reader::from_reader(file).records() {
        let record = record?;
        if let (Some(customer_id), Some(external)) = (record.get(0), record.get(1)) {
            if !external.is_empty() {
                mapping.insert(customer_id.to_string(), external.to_string());
            }
        }
    }
    Ok(Some(mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TelecomFeatures;
    use tempfile::tempdir;

    fn row(customer_id: &str, broadband: &str) -> TelecomFeatures {
        TelecomFeatures {
            customer_id: customer_id.to_string(),
            broadband_number: broadband.to_string(),
            data_usage_mb: 3000.5,
            login_attempts: 120,
            bill_amount: 300.0,
            payment_delay_days: 4,
            network_latency_ms: 50.25,
            packet_loss_percent: 1.1,
            download_speed_mbps: 98.0,
            churn_next_month: None,
        }
    }

    #[test]
    fn test_load_before_any_batch_is_none() {
        let dir = tempdir().unwrap();
        let store = FeatureTableStore::new(dir.path());

        let table: Option<Vec<TelecomFeatures>> = store.load_table(Industry::Telecom).unwrap();
        assert!(table.is_none());
        assert!(store.load_identities(Industry::Telecom).unwrap().is_empty());
    }

    #[test]
    fn test_replace_then_load() {
        let dir = tempdir().unwrap();
        let store = FeatureTableStore::new(dir.path());
        let rows = vec![row("1", "0111234567"), row("2", "0217654321")];
        let identities = vec![
            ("1".to_string(), "0111234567".to_string()),
            ("2".to_string(), "0217654321".to_string()),
        ];

        store.replace_table(Industry::Telecom, &rows, &identities).unwrap();

        let loaded: Vec<TelecomFeatures> = store.load_table(Industry::Telecom).unwrap().unwrap();
        assert_eq!(loaded, rows);
        assert!(dir.path().join("telecom_features.csv").exists());

        let mapping = store.load_identities(Industry::Telecom).unwrap();
        assert_eq!(mapping.get("1").map(String::as_str), Some("0111234567"));
    }

    #[test]
    fn test_second_batch_replaces_table_and_merges_mapping() {
        let dir = tempdir().unwrap();
        let store = FeatureTableStore::new(dir.path());

        store
            .replace_table(Industry::Telecom, &[row("1", "A")], &[("1".into(), "A".into())])
            .unwrap();
        store
            .replace_table(Industry::Telecom, &[row("2", "B")], &[("2".into(), "B".into())])
            .unwrap();

        let loaded: Vec<TelecomFeatures> = store.load_table(Industry::Telecom).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].customer_id, "2");
        assert_eq!(store.load_identities(Industry::Telecom).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_writers_never_expose_partial_table() {
        let dir = tempdir().unwrap();
        let store = FeatureTableStore::new(dir.path());
        let first: Vec<TelecomFeatures> = (0..40).map(|i| row(&i.to_string(), "A")).collect();
        let second: Vec<TelecomFeatures> = (100..130).map(|i| row(&i.to_string(), "B")).collect();

        std::thread::scope(|scope| {
            for rows in [&first, &second] {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.replace_table(Industry::Telecom, rows, &[]).unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..60 {
                    if let Some(loaded) = store.load_table::<TelecomFeatures>(Industry::Telecom).unwrap() {
                        assert!(loaded == first || loaded == second, "mixed table of {} rows", loaded.len());
                    }
                }
            });
        });

        let last: Vec<TelecomFeatures> = store.load_table(Industry::Telecom).unwrap().unwrap();
        assert!(last == first || last == second);
    }

    #[test]
    fn test_mapping_header_per_industry() {
        let dir = tempdir().unwrap();
        let store = FeatureTableStore::new(dir.path());
        let mut mapping = HashMap::new();
        mapping.insert("7".to_string(), "POL-0007".to_string());

        store.save_identities(Industry::Insurance, &mapping).unwrap();

        let contents = fs::read_to_string(dir.path().join("customer_policy_mapping.csv")).unwrap();
        assert!(contents.starts_with("customer_id,policy_number"));
        assert_eq!(store.load_identities(Industry::Insurance).unwrap(), mapping);
    }
}
