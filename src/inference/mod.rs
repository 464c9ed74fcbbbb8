//! Image classification backends.
//!
//! A [`Classifier`] turns raw image bytes into one probability per class.
//! Ranking and truncation happen in the analysis service, so backends return
//! every class they know about.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{InferenceBackend, InferenceConfig};
use crate::models::analysis::{AnalysisSource, Prediction};

pub mod remote;
pub mod simulated;

pub use remote::RemoteClassifier;
pub use simulated::SimulatedClassifier;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model not loaded")]
    NotReady,

    #[error("Model server timed out after {0}s")]
    Timeout(u64),

    #[error("Model server request failed: {0}")]
    Backend(String),

    #[error("Model server returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Image payload handed to a classifier.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub filename: &'a str,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recorded on every analysis this backend produces.
    fn source(&self) -> AnalysisSource;

    fn class_names(&self) -> &[String];

    async fn is_ready(&self) -> bool;

    async fn classify(&self, image: ImageInput<'_>) -> Result<Vec<Prediction>, ClassifierError>;
}

/// Builds the backend selected in `[inference]`.
pub fn build_classifier(config: &InferenceConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    match config.backend {
        InferenceBackend::Simulated => Ok(Arc::new(SimulatedClassifier::new(
            config.class_names.clone(),
        ))),
        InferenceBackend::Remote => {
            let url = config
                .remote_url
                .as_deref()
                .filter(|u| !u.is_empty())
                .ok_or_else(|| anyhow::anyhow!("inference.remote_url is not set"))?;

            Ok(Arc::new(RemoteClassifier::new(
                url,
                config.class_names.clone(),
                config.request_timeout_seconds,
            )?))
        }
    }
}
