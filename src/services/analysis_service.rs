//! Domain service for image analysis and analysis history.

use serde::Serialize;
use thiserror::Error;

use crate::inference::ClassifierError;
use crate::models::analysis::AnalysisRecord;
use crate::services::storage::StorageError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Analysis not found: {0}")]
    NotFound(i32),

    #[error("You do not have access to this analysis")]
    Forbidden,

    #[error("Model not loaded")]
    ClassifierNotReady,

    #[error("Analysis failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for AnalysisError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// An image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Classifier readiness as reported by the diagnostics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub backend: &'static str,
    pub ready: bool,
    pub classes: Vec<String>,
}

#[async_trait::async_trait]
pub trait AnalysisService: Send + Sync {
    /// Validates, stores and classifies an image with the configured backend,
    /// then records the result for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Validation`] if the upload is not an acceptable image
    /// - [`AnalysisError::ClassifierNotReady`] if the backend is unavailable
    /// - [`AnalysisError::Classifier`] if the backend fails mid-request
    async fn analyze(&self, user_id: i32, upload: ImageUpload)
    -> Result<AnalysisRecord, AnalysisError>;

    /// Same as [`AnalysisService::analyze`] but always uses the simulated backend.
    async fn emergency_analyze(
        &self,
        user_id: i32,
        upload: ImageUpload,
    ) -> Result<AnalysisRecord, AnalysisError>;

    /// Newest first, at most `limit` entries.
    async fn history(&self, user_id: i32, limit: u64) -> Result<Vec<AnalysisRecord>, AnalysisError>;

    /// # Errors
    ///
    /// - [`AnalysisError::NotFound`] if no such analysis exists
    /// - [`AnalysisError::Forbidden`] if it belongs to another user
    async fn get(&self, user_id: i32, analysis_id: i32) -> Result<AnalysisRecord, AnalysisError>;

    /// Plain-text report for one analysis. Same access rules as [`AnalysisService::get`].
    async fn report(&self, user_id: i32, analysis_id: i32) -> Result<String, AnalysisError>;

    async fn model_status(&self) -> ModelStatus;
}
