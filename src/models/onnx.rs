//! ONNX classifiers exported by an external training stack.
//!
//! Enabled with the `onnx` feature. The scaler artifact stays JSON; only the
//! classifier is replaced.

use crate::error::{ChurnError, Result};
use crate::models::classifier::ChurnClassifier;
use ndarray::ArrayView1;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

fn model_err<E: Display>(e: E) -> ChurnError {
    ChurnError::Model(e.to_string())
}

/// Loaded ONNX session with its input/output names
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    n_features: usize,
}

impl OnnxClassifier {
    /// Load a single ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, name: &str, n_features: usize) -> Result<Self> {
        let path = path.as_ref();
        ort::init().commit().map_err(model_err)?;

        info!(model = %name, path = %path.display(), "Loading ONNX model");

        let session = Session::builder()
            .map_err(model_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_err)?
            .with_intra_threads(1)
            .map_err(model_err)?
            .commit_from_file(path)
            .map_err(|e| ChurnError::Model(format!("Failed to load model from {:?}: {}", path, e)))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        // skl2onnx exports "output_label" and "output_probability"
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(model = %name, input = %input_name, output = %output_name, "Model loaded successfully");

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            n_features,
        })
    }
}

impl ChurnClassifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        if features.len() != self.n_features {
            return Err(ChurnError::Model(format!(
                "{} expects {} features, got {}",
                self.name,
                self.n_features,
                features.len()
            )));
        }

        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let shape = vec![1_i64, input.len() as i64];
        let input_tensor = Tensor::from_array((shape, input)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ChurnError::Model(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(model_err)?;

        extract_probability(&outputs, &self.output_name, &self.name)
    }
}

/// Churn probability from either a [1, n_classes] tensor or a seq(map) output
fn extract_probability(outputs: &SessionOutputs, output_name: &str, model_name: &str) -> Result<f64> {
    if let Some(output) = outputs.get(output_name) {
        if let Some(prob) = extract_from_value(&output, model_name) {
            return Ok(prob);
        }
    }

    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(prob) = extract_from_value(&output, model_name) {
            debug!(model = %model_name, output = %name, prob, "Extracted probability from fallback output");
            return Ok(prob);
        }
    }

    warn!(model = %model_name, "Could not extract churn probability");
    Err(ChurnError::Model(format!(
        "{} produced no probability output",
        model_name
    )))
}

fn extract_from_value(output: &DynValue, model_name: &str) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let classes = dims.last().copied().unwrap_or(1);
        let prob = if classes >= 2 { data.get(1) } else { data.first() };
        return prob.map(|&p| p as f64);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        match extract_from_sequence_map(output) {
            Ok(prob) => return Some(prob),
            Err(e) => warn!(model = %model_name, error = %e, "Failed to read seq(map) output"),
        }
    }
    None
}

/// seq(map(int64, float)) as produced by tree ensembles with zipmap
fn extract_from_sequence_map(output: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(model_err)?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(model_err)?;
    let first = maps
        .first()
        .ok_or_else(|| ChurnError::Model("Empty sequence".to_string()))?;
    let kv_pairs = first.try_extract_key_values::<i64, f32>().map_err(model_err)?;

    if let Some((_, prob)) = kv_pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = kv_pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *prob as f64);
    }
    Err(ChurnError::Model("No class probability found in map".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_class_tensor_yields_churn_column() {
        let output = Tensor::from_array((vec![1_i64, 2], vec![0.25_f32, 0.75]))
            .unwrap()
            .into_dyn();
        assert_eq!(extract_from_value(&output, "telecom_onnx"), Some(0.75));
    }

    #[test]
    fn test_single_column_tensor_is_the_probability() {
        let output = Tensor::from_array((vec![1_i64, 1], vec![0.4_f32]))
            .unwrap()
            .into_dyn();
        assert_eq!(extract_from_value(&output, "telecom_onnx"), Some(f64::from(0.4_f32)));
    }

    #[test]
    fn test_label_tensor_has_no_probability() {
        let output = Tensor::from_array((vec![1_i64], vec![1_i64]))
            .unwrap()
            .into_dyn();
        assert_eq!(extract_from_value(&output, "telecom_onnx"), None);
    }
}
