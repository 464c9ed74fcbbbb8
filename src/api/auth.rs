use axum::{
    Json,
    extract::{FromRequestParts, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::types::{
    EmergencyLoginBody, ForgotPasswordBody, ForgotPasswordRequest, LoginBody, LoginRequest,
    RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, UserBody,
};
use super::{ApiError, ApiResponse, AppState, Empty};
use crate::db::User;
use crate::services::{AuthError, Registration};
use crate::validation::ValidationError;

/// Header carrying the opaque key issued by the emergency login routes.
pub const EMERGENCY_KEY_HEADER: &str = "x-emergency-key";

// ============================================================================
// Middleware
// ============================================================================

/// User resolved by one of the auth middlewares. Usable as an extractor.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.0.id
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Token is missing!"))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ")?.trim())
}

fn emergency_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(EMERGENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

async fn resolve_bearer(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Token is missing!"))?;

    state
        .auth_service()
        .authenticate_token(token)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            ApiError::from(e)
        })
}

fn admit(mut request: Request, user: User) -> Request {
    tracing::Span::current().record("user_id", user.id);
    request.extensions_mut().insert(CurrentUser(user));
    request
}

/// Requires `Authorization: Bearer <jwt>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_bearer(&state, request.headers()).await?;
    Ok(next.run(admit(request, user)).await)
}

/// Accepts an emergency key in `X-Emergency-Key`, otherwise falls back to
/// the bearer token.
pub async fn emergency_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = if let Some(key) = emergency_key(request.headers()) {
        state
            .auth_service()
            .authenticate_emergency_key(key)
            .await?
    } else {
        resolve_bearer(&state, request.headers()).await?
    };

    Ok(next.run(admit(request, user)).await)
}

// ============================================================================
// Handlers
// ============================================================================

fn require_fields(fields: &[&str]) -> Result<(), ApiError> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ValidationError::MissingFields.into());
    }
    Ok(())
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<UserBody>>), ApiError> {
    let Json(req) = payload?;
    require_fields(&[&req.name, &req.email, &req.password])?;

    let user = state
        .auth_service()
        .register(Registration {
            name: &req.name,
            email: &req.email,
            password: &req.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "User registered successfully",
            UserBody { user },
        )),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginBody>>, ApiError> {
    let Json(req) = payload?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let result = state
        .auth_service()
        .login(&req.email, &req.password)
        .await?;

    Ok(Json(ApiResponse::success(LoginBody {
        token: result.token,
        user: result.user,
    })))
}

/// POST /auth/forgot-password
///
/// Answers the same way whether or not the email is registered.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ForgotPasswordBody>>, ApiError> {
    let Json(req) = payload?;

    let request = state
        .auth_service()
        .forgot_password(&req.email)
        .await
        .map_err(|e| match e {
            AuthError::Validation(_) => ApiError::validation("Valid email is required"),
            other => other.into(),
        })?;

    let token = if state.config().auth.expose_reset_token {
        request.token
    } else {
        None
    };

    Ok(Json(ApiResponse::with_message(
        "If your email is registered, you will receive a password reset link",
        ForgotPasswordBody { token },
    )))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let Json(req) = payload?;
    if req.token.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Token and new password are required"));
    }

    state
        .auth_service()
        .reset_password(&req.token, &req.password)
        .await?;

    Ok(Json(ApiResponse::message(
        "Password has been reset successfully",
    )))
}

/// POST /auth/direct-login
pub async fn direct_login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<EmergencyLoginBody>>, ApiError> {
    let Json(req) = payload?;
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let result = state
        .auth_service()
        .direct_login(&req.email, &req.password)
        .await?;

    Ok(Json(ApiResponse::success(EmergencyLoginBody {
        emergency_key: result.emergency_key,
        user: result.user,
    })))
}

/// POST /auth/direct-register
pub async fn direct_register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<EmergencyLoginBody>>), ApiError> {
    let Json(req) = payload?;
    require_fields(&[&req.name, &req.email, &req.password])?;

    let result = state
        .auth_service()
        .direct_register(Registration {
            name: &req.name,
            email: &req.email,
            password: &req.password,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "User registered successfully",
            EmergencyLoginBody {
                emergency_key: result.emergency_key,
                user: result.user,
            },
        )),
    ))
}

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<UserBody>>, ApiError> {
    let user = state.auth_service().current_user(user.id()).await?;
    Ok(Json(ApiResponse::success(UserBody { user })))
}

/// PUT /auth/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<UserBody>>, ApiError> {
    let Json(req) = payload?;

    let user = state
        .auth_service()
        .update_profile(user.id(), &req.name)
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Profile updated successfully",
        UserBody { user },
    )))
}
