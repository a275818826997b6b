//! Fitted artifacts and model inference

pub mod classifier;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scaler;

pub use classifier::{ChurnClassifier, LogisticModel, ModelArtifact, ModelEvaluation};
pub use inference::{IndustryModel, PredictionContext};
pub use loader::ArtifactStore;
pub use scaler::{ScalerArtifact, StandardScaler};
