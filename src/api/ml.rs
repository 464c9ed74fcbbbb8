use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::types::{AnalysisBody, AnalyzeBody, HistoryBody, HistoryQuery, MlTestBody};
use super::{ApiError, ApiResponse, AppState};
use crate::services::ImageUpload;
use crate::validation::{ValidationError, validate_history_limit};

/// Form field the upload form puts the image in.
pub const IMAGE_FIELD: &str = "image";

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File exceeds the upload size limit".to_string())
    } else {
        ApiError::validation(format!("Failed to parse multipart: {}", err.body_text()))
    }
}

/// Pulls the `image` part out of a multipart body. Other fields are ignored.
async fn read_image(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ImageUpload, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::validation(format!("No file part: {}", e.body_text())))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.trim().is_empty() {
            return Err(ValidationError::EmptyFilename.into());
        }

        let content_type = field.content_type().map(ToString::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        return Ok(ImageUpload {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::validation("No file part"))
}

/// POST /ml/analyze
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<AnalyzeBody>>, ApiError> {
    let upload = read_image(multipart).await?;
    let record = state.analysis_service().analyze(user.id(), upload).await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// POST /ml/emergency-analyze
pub async fn emergency_analyze(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<AnalyzeBody>>, ApiError> {
    let upload = read_image(multipart).await?;
    let record = state
        .analysis_service()
        .emergency_analyze(user.id(), upload)
        .await?;
    Ok(Json(ApiResponse::success(record.into())))
}

/// GET /ml/history and /ml/emergency-history
pub async fn history(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<HistoryBody>>, ApiError> {
    let limit = validate_history_limit(query.limit)?;
    let analyses = state.analysis_service().history(user.id(), limit).await?;
    Ok(Json(ApiResponse::success(HistoryBody { analyses })))
}

/// GET /ml/analysis/{id}
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<AnalysisBody>>, ApiError> {
    let analysis = state.analysis_service().get(user.id(), id).await?;
    Ok(Json(ApiResponse::success(AnalysisBody { analysis })))
}

/// GET /ml/analysis-report/{id}
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.analysis_service().report(user.id(), id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"mediscan-report-{id}.txt\""),
            ),
        ],
        report,
    ))
}

/// GET /ml/test
pub async fn test(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let status = state.analysis_service().model_status().await;

    if !status.ready {
        return Err(ApiError::ServiceUnavailable("Model not loaded".to_string()));
    }

    Ok(Json(ApiResponse::with_message(
        "ML model is loaded",
        MlTestBody {
            backend: status.backend,
            classes: status.classes,
        },
    )))
}
