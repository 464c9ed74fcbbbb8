//! Domain service for authentication and account management.
//!
//! Handles registration, login, password reset, the emergency login path and
//! resolving credentials presented on incoming requests.

use serde::Serialize;
use thiserror::Error;

use crate::db::User;
use crate::models::user::UserProfile;
use crate::validation::ValidationError;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    EmailTaken,

    #[error("Invalid or expired token")]
    InvalidResetToken,

    #[error("Token is invalid!")]
    InvalidToken,

    #[error("User not found!")]
    UserNotFound,

    #[error("Emergency access is disabled")]
    EmergencyDisabled,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Input for both registration paths.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Bearer token plus the user it was issued for.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserProfile,
}

/// Opaque emergency key plus the user it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyLogin {
    pub emergency_key: String,
    pub user: UserProfile,
}

/// Result of a password reset request. `token` is `None` when the email is
/// unknown; callers answer identically in both cases.
#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub token: Option<String>,
    pub reset_link: Option<String>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates an account.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] for a malformed email, short password or blank name
    /// - [`AuthError::EmailTaken`] if the email is already registered
    async fn register(&self, registration: Registration<'_>) -> Result<UserProfile, AuthError>;

    /// Verifies credentials and issues a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or a wrong password.
    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Issues a single-use reset token for the account, if there is one.
    async fn forgot_password(&self, email: &str) -> Result<ResetRequest, AuthError>;

    /// Consumes a reset token and sets the new password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidResetToken`] if the token is unknown, used or expired.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Emergency login: verifies credentials and hands out the user's emergency key.
    async fn direct_login(&self, email: &str, password: &str)
    -> Result<EmergencyLogin, AuthError>;

    /// Emergency registration: creates the account and returns its emergency key.
    async fn direct_register(
        &self,
        registration: Registration<'_>,
    ) -> Result<EmergencyLogin, AuthError>;

    /// Resolves a bearer token to its user.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidToken`] for a bad signature, garbage or an expired token
    /// - [`AuthError::UserNotFound`] if the token outlived its user
    async fn authenticate_token(&self, token: &str) -> Result<User, AuthError>;

    /// Resolves an emergency key to its user.
    async fn authenticate_emergency_key(&self, key: &str) -> Result<User, AuthError>;

    async fn current_user(&self, user_id: i32) -> Result<UserProfile, AuthError>;

    /// Changes the display name.
    async fn update_profile(&self, user_id: i32, name: &str) -> Result<UserProfile, AuthError>;
}
