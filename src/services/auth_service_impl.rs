//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::{AuthConfig, SecurityConfig};
use crate::db::repositories::user::generate_token;
use crate::db::{NewUser, Store, User, format_timestamp};
use crate::models::user::{Role, UserProfile};
use crate::services::auth_service::{
    AuthError, AuthService, EmergencyLogin, LoginResult, Registration, ResetRequest,
};
use crate::services::token::TokenService;
use crate::validation::{ValidationError, validate_email, validate_name, validate_password};

/// One year.
const MAX_RESET_TTL_MINUTES: u64 = 525_600;

pub struct SeaOrmAuthService {
    store: Store,
    tokens: TokenService,
    auth: AuthConfig,
    security: SecurityConfig,
    frontend_url: String,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        auth: AuthConfig,
        security: SecurityConfig,
        frontend_url: impl Into<String>,
    ) -> Self {
        let tokens = TokenService::new(&auth.jwt_secret, auth.token_ttl_hours);
        Self {
            store,
            tokens,
            auth,
            security,
            frontend_url: frontend_url.into(),
        }
    }

    async fn create_account(&self, registration: Registration<'_>) -> Result<User, AuthError> {
        let name = validate_name(registration.name)?;
        let email = validate_email(registration.email)?;
        validate_password(registration.password)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let created = self
            .store
            .create_user(
                NewUser {
                    name: &name,
                    email: &email,
                    password: registration.password,
                    role: Role::User,
                },
                &self.security,
            )
            .await;

        let user = match created {
            Ok(user) => user,
            Err(e) => {
                // Lost a race against a concurrent registration for the same email
                if self.store.get_user_by_email(&email).await?.is_some() {
                    warn!(error = %e, "Duplicate registration rejected by the database");
                    return Err(AuthError::EmailTaken);
                }
                return Err(e.into());
            }
        };

        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    async fn check_credentials(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingFields.into());
        }

        let user = self.store.verify_user_password(&email, password).await?;
        let outcome = if user.is_some() { "success" } else { "failure" };
        metrics::counter!("auth_logins_total", "outcome" => outcome).increment(1);

        user.ok_or(AuthError::InvalidCredentials)
    }

    fn ensure_emergency_enabled(&self) -> Result<(), AuthError> {
        if self.auth.emergency_enabled {
            Ok(())
        } else {
            Err(AuthError::EmergencyDisabled)
        }
    }

    async fn emergency_login_for(&self, user: User) -> Result<EmergencyLogin, AuthError> {
        let emergency_key = match &user.emergency_key {
            Some(key) => key.clone(),
            None => self.store.ensure_emergency_key(user.id).await?,
        };

        Ok(EmergencyLogin {
            emergency_key,
            user: user.into(),
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, registration: Registration<'_>) -> Result<UserProfile, AuthError> {
        let user = self.create_account(registration).await?;
        Ok(user.into())
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        let user = self.check_credentials(email, password).await?;

        let token = self
            .tokens
            .issue(user.id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        info!(user_id = user.id, "User logged in");

        Ok(LoginResult {
            token,
            user: user.into(),
        })
    }

    async fn forgot_password(&self, email: &str) -> Result<ResetRequest, AuthError> {
        let email = validate_email(email)?;

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            info!("Password reset requested for an unknown email");
            return Ok(ResetRequest {
                token: None,
                reset_link: None,
            });
        };

        let token = generate_token();
        let ttl_minutes = i64::try_from(self.auth.reset_token_ttl_minutes.min(MAX_RESET_TTL_MINUTES))
            .unwrap_or(60);
        let expires_at = format_timestamp(Utc::now() + Duration::minutes(ttl_minutes));
        self.store
            .set_reset_token(user.id, &token, &expires_at)
            .await?;

        let reset_link = format!(
            "{}/reset-password?token={token}",
            self.frontend_url.trim_end_matches('/')
        );

        // No mail transport: the link goes to the log
        info!(user_id = user.id, %reset_link, %expires_at, "Password reset link issued");

        Ok(ResetRequest {
            token: Some(token),
            reset_link: Some(reset_link),
        })
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidResetToken);
        }
        validate_password(new_password)?;

        // The token is cleared before the new hash is written, so a replay
        // racing this call finds nothing to consume.
        let user_id = self
            .store
            .consume_reset_token(token.trim())
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        self.store
            .update_user_password(user_id, new_password, &self.security)
            .await?;

        info!(user_id, "Password reset completed");
        Ok(())
    }

    async fn direct_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<EmergencyLogin, AuthError> {
        self.ensure_emergency_enabled()?;
        let user = self.check_credentials(email, password).await?;
        warn!(user_id = user.id, "Emergency login used");
        self.emergency_login_for(user).await
    }

    async fn direct_register(
        &self,
        registration: Registration<'_>,
    ) -> Result<EmergencyLogin, AuthError> {
        self.ensure_emergency_enabled()?;
        let user = self.create_account(registration).await?;
        warn!(user_id = user.id, "Emergency registration used");
        self.emergency_login_for(user).await
    }

    async fn authenticate_token(&self, token: &str) -> Result<User, AuthError> {
        let user_id = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::InvalidToken)?;

        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn authenticate_emergency_key(&self, key: &str) -> Result<User, AuthError> {
        self.ensure_emergency_enabled()?;

        if key.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        self.store
            .find_user_by_emergency_key(key.trim())
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    async fn current_user(&self, user_id: i32) -> Result<UserProfile, AuthError> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::UserNotFound)
    }

    async fn update_profile(&self, user_id: i32, name: &str) -> Result<UserProfile, AuthError> {
        let name = validate_name(name)?;

        self.store
            .update_user_name(user_id, &name)
            .await?
            .map(UserProfile::from)
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        }
    }

    async fn service_with(auth: AuthConfig) -> SeaOrmAuthService {
        let store = Store::new("sqlite::memory:").await.unwrap();
        SeaOrmAuthService::new(store, auth, fast_security(), "http://localhost:3000/")
    }

    async fn service() -> SeaOrmAuthService {
        service_with(AuthConfig::default()).await
    }

    fn registration<'a>(email: &'a str, password: &'a str) -> Registration<'a> {
        Registration {
            name: "Test",
            email,
            password,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service().await;

        let profile = auth
            .register(registration("Test@Gmail.com", "test123"))
            .await
            .unwrap();
        assert_eq!(profile.email, "test@gmail.com");

        let login = auth.login("test@gmail.com", "test123").await.unwrap();
        assert_eq!(login.user.id, profile.id);

        let user = auth.authenticate_token(&login.token).await.unwrap();
        assert_eq!(user.id, profile.id);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let auth = service().await;

        let err = auth
            .register(registration("not-an-email", "test123"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(ValidationError::InvalidEmail)
        ));

        let err = auth
            .register(registration("a@b.com", "12345"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Validation(ValidationError::PasswordTooShort { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let auth = service().await;
        auth.register(registration("dup@example.com", "secret1"))
            .await
            .unwrap();

        let err = auth
            .register(registration("DUP@example.com", "secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let auth = service().await;
        auth.register(registration("a@example.com", "secret1"))
            .await
            .unwrap();

        let wrong_password = auth.login("a@example.com", "nope-nope").await.unwrap_err();
        let unknown_email = auth.login("b@example.com", "secret1").await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let auth = service().await;
        auth.register(registration("reset@example.com", "oldpass"))
            .await
            .unwrap();

        let request = auth.forgot_password("reset@example.com").await.unwrap();
        let token = request.token.unwrap();
        assert_eq!(
            request.reset_link.unwrap(),
            format!("http://localhost:3000/reset-password?token={token}")
        );

        auth.reset_password(&token, "newpass").await.unwrap();
        assert!(auth.login("reset@example.com", "newpass").await.is_ok());

        let err = auth.reset_password(&token, "another").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResetToken));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_resets_with_one_token_only_one_wins() {
        let db_path = std::env::temp_dir().join(format!(
            "mediscan-reset-race-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = Store::new(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        let auth = SeaOrmAuthService::new(
            store,
            AuthConfig::default(),
            fast_security(),
            "http://localhost:3000",
        );
        auth.register(registration("race@example.com", "oldpass"))
            .await
            .unwrap();
        let token = auth
            .forgot_password("race@example.com")
            .await
            .unwrap()
            .token
            .unwrap();

        let (first, second) = tokio::join!(
            auth.reset_password(&token, "first-pass"),
            auth.reset_password(&token, "second-pass"),
        );

        let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(loser, Err(AuthError::InvalidResetToken)));

        let logged_in = [
            auth.login("race@example.com", "first-pass").await.is_ok(),
            auth.login("race@example.com", "second-pass").await.is_ok(),
        ];
        assert_eq!(logged_in.iter().filter(|ok| **ok).count(), 1);

        let _ = std::fs::remove_file(&db_path);
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_issues_nothing() {
        let auth = service().await;
        let request = auth.forgot_password("ghost@example.com").await.unwrap();
        assert!(request.token.is_none());
    }

    #[tokio::test]
    async fn test_emergency_key_flow() {
        let auth = service().await;

        let registered = auth
            .direct_register(registration("er@example.com", "secret1"))
            .await
            .unwrap();
        let logged_in = auth.direct_login("er@example.com", "secret1").await.unwrap();
        assert_eq!(registered.emergency_key, logged_in.emergency_key);

        let user = auth
            .authenticate_emergency_key(&logged_in.emergency_key)
            .await
            .unwrap();
        assert_eq!(user.email, "er@example.com");

        assert!(auth.authenticate_emergency_key("bogus").await.is_err());
    }

    #[tokio::test]
    async fn test_emergency_paths_can_be_disabled() {
        let auth = service_with(AuthConfig {
            emergency_enabled: false,
            ..AuthConfig::default()
        })
        .await;

        let err = auth
            .direct_register(registration("x@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmergencyDisabled));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let auth = service().await;
        let profile = auth
            .register(registration("p@example.com", "secret1"))
            .await
            .unwrap();

        let updated = auth.update_profile(profile.id, "  Dr. Who  ").await.unwrap();
        assert_eq!(updated.name, "Dr. Who");
        assert!(auth.update_profile(profile.id, "   ").await.is_err());
        assert!(matches!(
            auth.current_user(9999).await.unwrap_err(),
            AuthError::UserNotFound
        ));
    }
}
