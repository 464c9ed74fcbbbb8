use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::constants::routes;
use crate::db::Store;
use crate::services::{AnalysisService, AuthService};
use crate::state::SharedState;

pub mod auth;
mod error;
pub mod ml;
mod observability;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

/// Multipart framing on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        self.shared.config()
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn analysis_service(&self) -> &Arc<dyn AnalysisService> {
        &self.shared.analysis_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config();
    let uploads_path = config.storage.uploads_path.clone();
    let cors_origins = config.server.cors_allowed_origins.clone();
    let body_limit = config.storage.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let emergency_enabled = config.auth.emergency_enabled;

    let mut api_router = Router::new()
        .route("/health", get(system::health))
        .route("/db/test", get(system::db_test))
        .route("/ml/test", get(ml::test))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .merge(create_protected_router(state.clone()))
        .merge(create_emergency_router(state.clone(), emergency_enabled));

    if emergency_enabled {
        api_router = api_router
            .route("/auth/direct-login", post(auth::direct_login))
            .route("/auth/direct-register", post(auth::direct_register));
    }

    let api_router = api_router
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/", get(system::index))
        .route("/test", get(system::test))
        .nest("/api", api_router)
        .nest_service(routes::UPLOADS_PREFIX, ServeDir::new(uploads_path))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/ml/analyze", post(ml::analyze))
        .route("/ml/history", get(ml::history))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

/// Routes that also accept an emergency key. Single-analysis reads stay
/// mounted when emergency access is off; the key is then refused.
fn create_emergency_router(state: Arc<AppState>, enabled: bool) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route("/ml/analysis/{id}", get(ml::get_analysis))
        .route("/ml/analysis-report/{id}", get(ml::get_report));

    if enabled {
        router = router
            .route("/ml/emergency-analyze", post(ml::emergency_analyze))
            .route("/ml/emergency-history", get(ml::history));
    }

    router.route_layer(middleware::from_fn_with_state(
        state,
        auth::emergency_auth_middleware,
    ))
}
