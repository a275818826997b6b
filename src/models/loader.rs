//! Artifact store: fitted scalers and classifiers on disk, one pair per industry

use crate::error::{ChurnError, Result};
use crate::models::classifier::{ChurnClassifier, ModelArtifact};
use crate::models::scaler::ScalerArtifact;
use crate::types::Industry;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads and writes `<industry>_model.json` / `<industry>_scaler.json`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, industry: Industry) -> PathBuf {
        self.dir.join(format!("{}_model.json", industry))
    }

    pub fn scaler_path(&self, industry: Industry) -> PathBuf {
        self.dir.join(format!("{}_scaler.json", industry))
    }

    #[cfg(feature = "onnx")]
    pub fn onnx_model_path(&self, industry: Industry) -> PathBuf {
        self.dir.join(format!("{}_model.onnx", industry))
    }

    /// Load the scaler and classifier for one industry.
    ///
    /// Missing files yield `ArtifactNotFound`; artifacts fitted on another
    /// feature order yield `ArtifactMismatch`.
    pub fn load(&self, industry: Industry) -> Result<(ScalerArtifact, Box<dyn ChurnClassifier>)> {
        let scaler: ScalerArtifact = read_json(industry, &self.scaler_path(industry))?;
        scaler.check_compatible(industry)?;

        let model = self.load_classifier(industry)?;
        if model.n_features() != industry.feature_count() {
            return Err(ChurnError::ArtifactMismatch {
                industry,
                reason: format!(
                    "model expects {} features, expected {}",
                    model.n_features(),
                    industry.feature_count()
                ),
            });
        }

        info!(
            industry = %industry,
            model = %model.name(),
            fitted_at = %scaler.fitted_at,
            outlier_columns = scaler.outliers.transforms.len(),
            "Loaded artifacts"
        );

        Ok((scaler, model))
    }

    #[cfg(feature = "onnx")]
    fn load_classifier(&self, industry: Industry) -> Result<Box<dyn ChurnClassifier>> {
        let onnx_path = self.onnx_model_path(industry);
        if onnx_path.exists() {
            let model = crate::models::onnx::OnnxClassifier::load(
                &onnx_path,
                &format!("{}_onnx", industry),
                industry.feature_count(),
            )?;
            return Ok(Box::new(model));
        }
        self.load_native(industry)
    }

    #[cfg(not(feature = "onnx"))]
    fn load_classifier(&self, industry: Industry) -> Result<Box<dyn ChurnClassifier>> {
        self.load_native(industry)
    }

    fn load_native(&self, industry: Industry) -> Result<Box<dyn ChurnClassifier>> {
        let model: ModelArtifact = read_json(industry, &self.model_path(industry))?;
        model.check_compatible(industry)?;
        Ok(Box::new(model))
    }

    /// Persist a freshly trained pair. Only the offline trainer calls this.
    pub fn save(&self, industry: Industry, scaler: &ScalerArtifact, model: &ModelArtifact) -> Result<()> {
        scaler.check_compatible(industry)?;
        model.check_compatible(industry)?;

        fs::create_dir_all(&self.dir)?;
        write_json(&self.scaler_path(industry), scaler)?;
        write_json(&self.model_path(industry), model)?;

        info!(
            industry = %industry,
            dir = %self.dir.display(),
            "Saved scaler and model artifacts"
        );
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(industry: Industry, path: &Path) -> Result<T> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ChurnError::ArtifactNotFound {
                industry,
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}
