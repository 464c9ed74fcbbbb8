//! HTTP client for the MediScan API.
//!
//! Injects the stored bearer token, bounds every call with a timeout, and
//! turns transport and server failures into a [`ClientError`] that carries a
//! message suitable for showing to the user.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::api::auth::EMERGENCY_KEY_HEADER;
use crate::api::ml::IMAGE_FIELD;
use crate::config::Config;
use crate::models::analysis::{AnalysisSource, Prediction};
use crate::models::user::UserProfile;
use crate::validation::{
    ValidationError, validate_email, validate_image_upload, validate_name, validate_password,
};

pub mod session;
pub mod status;

pub use session::{Session, SessionStore};
pub use status::{ApiStatus, StatusMonitor};

/// Upload chunk size; one progress callback per chunk.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Called with `(bytes_sent, total_bytes)` while an image is uploading.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session storage error: {0}")]
    Session(String),
}

impl ClientError {
    /// Short message for end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(_) => "The server took too long to respond. Please try again.".to_string(),
            Self::Network(_) => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            Self::Api { message, .. } => message.clone(),
            Self::Decode(_) => "Received an unexpected response from the server.".to_string(),
            Self::Validation(e) => e.to_string(),
            Self::NotAuthenticated => "Please log in to continue.".to_string(),
            Self::Session(_) => "Could not access the saved session.".to_string(),
        }
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    token: String,
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct EmergencyReply {
    emergency_key: String,
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct UserReply {
    user: UserProfile,
}

#[derive(Debug, Deserialize)]
struct ForgotReply {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryReply {
    analyses: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct AnalysisReply {
    analysis: HistoryEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthInfo {
    pub service: String,
    pub version: String,
    pub database: String,
    pub classifier: String,
    pub uptime_seconds: u64,
}

/// Reply to an analyze request.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: i32,
    pub predictions: Vec<Prediction>,
    pub image_url: String,
    pub filename: String,
    pub timestamp: String,
    pub source: AnalysisSource,
}

/// One entry of the analysis history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub timestamp: String,
    pub filename: String,
    pub image_url: String,
    pub predictions: Vec<Prediction>,
    pub source: AnalysisSource,
}

pub struct ApiClient {
    http: Client,
    base_url: Url,
    timeout: Duration,
    max_upload_bytes: usize,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_upload_bytes: usize,
        session: SessionStore,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Network(format!("Invalid API URL {base_url}: {e}")))?;

        let http = Client::builder()
            .user_agent(concat!("MediScan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            timeout,
            max_upload_bytes,
            session,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(
            &config.client.api_url,
            Duration::from_secs(config.client.request_timeout_seconds.max(1)),
            config.storage.max_upload_bytes,
            SessionStore::for_key(&config.client.session_key),
        )
    }

    #[must_use]
    pub const fn session_store(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session.load()
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Network(format!("Invalid request path {path}: {e}")))
    }

    fn with_token(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self
            .session
            .load()
            .and_then(|s| s.token)
            .ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    /// Prefers the emergency key, falls back to the bearer token.
    fn with_emergency_credentials(
        &self,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, ClientError> {
        let session = self.session.load().ok_or(ClientError::NotAuthenticated)?;
        match (session.emergency_key, session.token) {
            (Some(key), _) => Ok(request.header(EMERGENCY_KEY_HEADER, key)),
            (None, Some(token)) => Ok(request.bearer_auth(token)),
            (None, None) => Err(ClientError::NotAuthenticated),
        }
    }

    /// Races a whole call, body read included, against the configured
    /// timeout. Dropping the future on expiry aborts the in-flight request.
    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }

    /// Sends without a deadline of its own; callers wrap it in [`Self::timed`].
    async fn dispatch(&self, request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        if status == StatusCode::UNAUTHORIZED && self.session.load().is_some() {
            // Stored credentials are no longer accepted
            warn!("Server rejected stored credentials, clearing session");
            self.session.clear()?;
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        self.timed(async {
            self.dispatch(request)
                .await?
                .json::<T>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))
        })
        .await
    }

    pub async fn health(&self) -> Result<HealthInfo, ClientError> {
        self.send(self.http.get(self.url("/api/health")?)).await
    }

    /// Registers and then logs in, so a session exists afterwards.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, ClientError> {
        let name = validate_name(name)?;
        let email = validate_email(email)?;
        validate_password(password)?;

        let _: UserReply = self
            .send(
                self.http
                    .post(self.url("/api/auth/register")?)
                    .json(&json!({ "name": name, "email": email, "password": password })),
            )
            .await?;

        self.login(&email, password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let email = validate_email(email)?;
        if password.is_empty() {
            return Err(ValidationError::MissingFields.into());
        }

        let reply: LoginReply = self
            .send(
                self.http
                    .post(self.url("/api/auth/login")?)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        let session = Session {
            token: Some(reply.token),
            emergency_key: None,
            user: reply.user,
        };
        self.session.save(&session)?;
        debug!(user_id = session.user.id, "Session stored");
        Ok(session)
    }

    /// Emergency login. Keeps an existing bearer token alongside the key.
    pub async fn direct_login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let email = validate_email(email)?;

        let reply: EmergencyReply = self
            .send(
                self.http
                    .post(self.url("/api/auth/direct-login")?)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;

        let token = self
            .session
            .load()
            .filter(|s| s.user.id == reply.user.id)
            .and_then(|s| s.token);

        let session = Session {
            token,
            emergency_key: Some(reply.emergency_key),
            user: reply.user,
        };
        self.session.save(&session)?;
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.session.clear()
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let request = self.with_token(self.http.get(self.url("/api/auth/me")?))?;
        let reply: UserReply = self.send(request).await?;
        Ok(reply.user)
    }

    /// Updates the display name and the cached user.
    pub async fn update_profile(&self, name: &str) -> Result<UserProfile, ClientError> {
        let name = validate_name(name)?;
        let request = self.with_token(
            self.http
                .put(self.url("/api/auth/profile")?)
                .json(&json!({ "name": name })),
        )?;
        let reply: UserReply = self.send(request).await?;

        if let Some(mut session) = self.session.load() {
            session.user = reply.user.clone();
            self.session.save(&session)?;
        }

        Ok(reply.user)
    }

    /// Returns the reset token only when the server exposes it.
    pub async fn forgot_password(&self, email: &str) -> Result<Option<String>, ClientError> {
        let email = validate_email(email)?;
        let reply: ForgotReply = self
            .send(
                self.http
                    .post(self.url("/api/auth/forgot-password")?)
                    .json(&json!({ "email": email })),
            )
            .await?;
        Ok(reply.token)
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ClientError> {
        validate_password(password)?;
        let request = self
            .http
            .post(self.url("/api/auth/reset-password")?)
            .json(&json!({ "token": token, "password": password }));
        self.timed(async { self.dispatch(request).await.map(drop) })
            .await
    }

    /// Validates the file locally, then uploads it. `emergency` selects the
    /// simulated-only emergency route.
    pub async fn analyze_file(
        &self,
        path: &Path,
        emergency: bool,
        progress: Option<ProgressFn>,
    ) -> Result<AnalysisResult, ClientError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Network(format!("Failed to read {}: {e}", path.display())))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        self.analyze(&filename, bytes, emergency, progress).await
    }

    pub async fn analyze(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        emergency: bool,
        progress: Option<ProgressFn>,
    ) -> Result<AnalysisResult, ClientError> {
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        validate_image_upload(filename, Some(mime.as_ref()), &bytes, self.max_upload_bytes)?;

        let part = upload_part(bytes, progress)
            .file_name(filename.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let request = if emergency {
            self.with_emergency_credentials(
                self.http
                    .post(self.url("/api/ml/emergency-analyze")?)
                    .multipart(form),
            )?
        } else {
            self.with_token(self.http.post(self.url("/api/ml/analyze")?).multipart(form))?
        };

        self.send(request).await
    }

    pub async fn history(
        &self,
        limit: Option<u64>,
        emergency: bool,
    ) -> Result<Vec<HistoryEntry>, ClientError> {
        let mut url = self.url(if emergency {
            "/api/ml/emergency-history"
        } else {
            "/api/ml/history"
        })?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }

        let request = if emergency {
            self.with_emergency_credentials(self.http.get(url))?
        } else {
            self.with_token(self.http.get(url))?
        };

        let reply: HistoryReply = self.send(request).await?;
        Ok(reply.analyses)
    }

    pub async fn analysis(&self, id: i32) -> Result<HistoryEntry, ClientError> {
        let request =
            self.with_emergency_credentials(self.http.get(self.url(&format!("/api/ml/analysis/{id}"))?))?;
        let reply: AnalysisReply = self.send(request).await?;
        Ok(reply.analysis)
    }

    pub async fn report(&self, id: i32) -> Result<String, ClientError> {
        let request = self.with_emergency_credentials(
            self.http
                .get(self.url(&format!("/api/ml/analysis-report/{id}"))?),
        )?;
        self.timed(async {
            self.dispatch(request)
                .await?
                .text()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))
        })
        .await
    }
}

/// Streams `bytes` in chunks so upload progress can be reported.
fn upload_part(bytes: Vec<u8>, progress: Option<ProgressFn>) -> Part {
    let Some(progress) = progress else {
        return Part::bytes(bytes);
    };

    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes
        .chunks(UPLOAD_CHUNK_BYTES)
        .map(<[u8]>::to_vec)
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok::<_, std::io::Error>(chunk)
    }));

    Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
}
