//! `SeaORM` implementation of the `AnalysisService` trait.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::{AnalysisRow, Store};
use crate::inference::{Classifier, ImageInput, SimulatedClassifier};
use crate::models::analysis::{AnalysisRecord, AnalysisSource, Prediction, rank_predictions};
use crate::services::analysis_service::{AnalysisError, AnalysisService, ImageUpload, ModelStatus};
use crate::services::storage::{StoredUpload, UploadStorage};
use crate::validation::validate_image_upload;

pub struct SeaOrmAnalysisService {
    store: Store,
    storage: UploadStorage,
    classifier: Arc<dyn Classifier>,
    fallback: Arc<dyn Classifier>,
    max_upload_bytes: usize,
    top_k: usize,
    placeholder_image_url: String,
}

impl SeaOrmAnalysisService {
    #[must_use]
    pub fn new(
        store: Store,
        storage: UploadStorage,
        classifier: Arc<dyn Classifier>,
        max_upload_bytes: usize,
        top_k: usize,
        placeholder_image_url: impl Into<String>,
    ) -> Self {
        let fallback: Arc<dyn Classifier> =
            Arc::new(SimulatedClassifier::new(classifier.class_names().to_vec()));

        Self {
            store,
            storage,
            classifier,
            fallback,
            max_upload_bytes,
            top_k,
            placeholder_image_url: placeholder_image_url.into(),
        }
    }

    async fn run(
        &self,
        classifier: &dyn Classifier,
        user_id: i32,
        upload: ImageUpload,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let format = validate_image_upload(
            &upload.filename,
            upload.content_type.as_deref(),
            &upload.bytes,
            self.max_upload_bytes,
        )?;

        if !classifier.is_ready().await {
            return Err(AnalysisError::ClassifierNotReady);
        }

        let stored = self
            .storage
            .save(&upload.filename, format, &upload.bytes)
            .await?;

        let (row, predictions, source) =
            match self.classify_and_record(classifier, user_id, &upload, &stored).await {
                Ok(done) => done,
                Err(e) => {
                    if let Err(remove_err) = self.storage.remove(&stored.stored_name).await {
                        warn!(user_id, error = %remove_err, "Failed to discard upload");
                    }
                    return Err(e);
                }
            };

        metrics::counter!("analyses_total", "source" => source.as_str()).increment(1);
        info!(
            user_id,
            analysis_id = row.id,
            source = %source,
            top = predictions.first().map_or("", |p| p.label.as_str()),
            "Image analysed"
        );

        Ok(self.to_record(row, true))
    }

    async fn classify_and_record(
        &self,
        classifier: &dyn Classifier,
        user_id: i32,
        upload: &ImageUpload,
        stored: &StoredUpload,
    ) -> Result<(AnalysisRow, Vec<Prediction>, AnalysisSource), AnalysisError> {
        let mime_type = upload
            .content_type
            .as_deref()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or("application/octet-stream");

        let raw = classifier
            .classify(ImageInput {
                filename: &stored.filename,
                mime_type,
                bytes: &upload.bytes,
            })
            .await
            .map_err(|e| {
                warn!(user_id, backend = classifier.name(), error = %e, "Classification failed");
                e
            })?;

        let predictions = rank_predictions(raw, self.top_k);
        let source = classifier.source();

        let row = self
            .store
            .record_analysis(
                user_id,
                &stored.filename,
                &stored.stored_name,
                &predictions,
                source,
            )
            .await?;

        Ok((row, predictions, source))
    }

    fn to_record(&self, row: AnalysisRow, image_exists: bool) -> AnalysisRecord {
        let image_url = if image_exists {
            UploadStorage::image_url(&row.stored_name)
        } else {
            self.placeholder_image_url.clone()
        };

        AnalysisRecord {
            id: row.id,
            user_id: row.user_id,
            timestamp: row.created_at,
            filename: row.filename,
            stored_name: row.stored_name,
            image_url,
            predictions: row.predictions,
            source: row.source,
        }
    }

    async fn owned_row(&self, user_id: i32, analysis_id: i32) -> Result<AnalysisRow, AnalysisError> {
        let row = self
            .store
            .get_analysis(analysis_id)
            .await?
            .ok_or(AnalysisError::NotFound(analysis_id))?;

        if row.user_id != user_id {
            warn!(user_id, analysis_id, "Access to another user's analysis denied");
            return Err(AnalysisError::Forbidden);
        }

        Ok(row)
    }
}

#[async_trait]
impl AnalysisService for SeaOrmAnalysisService {
    async fn analyze(
        &self,
        user_id: i32,
        upload: ImageUpload,
    ) -> Result<AnalysisRecord, AnalysisError> {
        self.run(self.classifier.as_ref(), user_id, upload).await
    }

    async fn emergency_analyze(
        &self,
        user_id: i32,
        upload: ImageUpload,
    ) -> Result<AnalysisRecord, AnalysisError> {
        self.run(self.fallback.as_ref(), user_id, upload).await
    }

    async fn history(&self, user_id: i32, limit: u64) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        let rows = self.store.list_analyses_for_user(user_id, limit).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let exists = self.storage.exists(&row.stored_name).await;
            records.push(self.to_record(row, exists));
        }
        Ok(records)
    }

    async fn get(&self, user_id: i32, analysis_id: i32) -> Result<AnalysisRecord, AnalysisError> {
        let row = self.owned_row(user_id, analysis_id).await?;
        let exists = self.storage.exists(&row.stored_name).await;
        Ok(self.to_record(row, exists))
    }

    async fn report(&self, user_id: i32, analysis_id: i32) -> Result<String, AnalysisError> {
        let record = self.get(user_id, analysis_id).await?;
        Ok(render_report(&record))
    }

    async fn model_status(&self) -> ModelStatus {
        ModelStatus {
            backend: self.classifier.name(),
            ready: self.classifier.is_ready().await,
            classes: self.classifier.class_names().to_vec(),
        }
    }
}

/// Renders the downloadable text report for one analysis.
#[must_use]
pub fn render_report(record: &AnalysisRecord) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "MediScan Analysis Report");
    let _ = writeln!(out, "========================");
    let _ = writeln!(out, "Analysis ID: {}", record.id);
    let _ = writeln!(out, "Date:        {}", record.timestamp);
    let _ = writeln!(out, "File:        {}", record.filename);
    let _ = writeln!(out, "Source:      {}", record.source);
    let _ = writeln!(out);

    if record.predictions.is_empty() {
        let _ = writeln!(out, "No findings were returned.");
    } else {
        let _ = writeln!(out, "Findings:");
        for (rank, prediction) in record.predictions.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {:<20} {:>6.2}%",
                rank + 1,
                prediction.label,
                prediction.probability * 100.0
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "This report is generated automatically and is not a medical diagnosis."
    );

    out
}
