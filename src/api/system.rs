//! Diagnostics endpoints: welcome, liveness, health and database checks.

use axum::{Json, extract::State};
use std::sync::Arc;

use super::types::{DbTestBody, Empty, HealthBody};
use super::{ApiError, ApiResponse, AppState};

/// GET /
pub async fn index() -> Json<ApiResponse<Empty>> {
    Json(ApiResponse::message("Welcome to MediScan API"))
}

/// GET /test
pub async fn test() -> Json<ApiResponse<Empty>> {
    Json(ApiResponse::message("API is working!"))
}

/// GET /api/health
///
/// Polled by clients to drive the online indicator. Fails with 503 only
/// when the database is unreachable; a missing model server is reported
/// but does not make the API unhealthy.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthBody>>, ApiError> {
    if let Err(e) = state.store().ping().await {
        tracing::warn!(error = %e, "Health check: database unreachable");
        return Err(ApiError::ServiceUnavailable(
            "Database unavailable".to_string(),
        ));
    }

    let classifier = if state.shared.classifier.is_ready().await {
        "ready"
    } else {
        "unavailable"
    };

    Ok(Json(ApiResponse::success(HealthBody {
        service: "mediscan",
        version: env!("CARGO_PKG_VERSION"),
        database: "connected",
        classifier,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })))
}

/// GET /api/db/test
pub async fn db_test(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<DbTestBody>>, ApiError> {
    let tables = state
        .store()
        .table_names()
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Database connection failed: {e}")))?;
    let user_count = state
        .store()
        .count_users()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::with_message(
        "Database connection successful",
        DbTestBody { tables, user_count },
    )))
}
