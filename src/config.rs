use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{defaults, limits};
use crate::services::token::MAX_TOKEN_TTL_HOURS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub security: SecurityConfig,

    pub storage: StorageConfig,

    pub inference: InferenceConfig,

    pub client: ClientConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// `pretty` or `json`
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/mediscan.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// `*` allows any origin.
    pub cors_allowed_origins: Vec<String>,

    /// Base URL of the web frontend, used to build password reset links.
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Override with `SECRET_KEY`.
    pub jwt_secret: String,

    pub token_ttl_hours: u64,

    pub reset_token_ttl_minutes: u64,

    /// Echo the reset token in the forgot-password response.
    /// Only meant for local development where no mail server exists.
    pub expose_reset_token: bool,

    /// Mount the direct-login/direct-register and emergency ML routes.
    pub emergency_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default_secret_key_change_in_production".to_string(),
            token_ttl_hours: 24,
            reset_token_ttl_minutes: 60,
            expose_reset_token: false,
            emergency_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub uploads_path: String,

    pub max_upload_bytes: usize,

    /// Returned in place of `image_url` when a stored image is gone.
    pub placeholder_image_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_path: "uploads".to_string(),
            max_upload_bytes: limits::MAX_UPLOAD_BYTES,
            placeholder_image_url: defaults::PLACEHOLDER_IMAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    Simulated,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,

    /// Model server endpoint receiving a multipart `image` field.
    pub remote_url: Option<String>,

    pub request_timeout_seconds: u64,

    pub top_k: usize,

    pub class_names: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::Simulated,
            remote_url: None,
            request_timeout_seconds: 30,
            top_k: defaults::TOP_K,
            class_names: defaults::CLASS_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,

    /// File stem of the persisted session under the config directory.
    pub session_key: String,

    pub request_timeout_seconds: u64,

    pub status_poll_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            session_key: "mediscan_session".to_string(),
            request_timeout_seconds: 30,
            status_poll_seconds: defaults::STATUS_POLL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            storage: StorageConfig::default(),
            inference: InferenceConfig::default(),
            client: ClientConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads the first config file found, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies the environment knobs the deployment scripts set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.general.database_path = url;
        }
        if let Some(secret) = lookup("SECRET_KEY") {
            self.auth.jwt_secret = secret;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {port}"))?;
        }
        if let Some(path) = lookup("UPLOAD_FOLDER") {
            self.storage.uploads_path = path;
        }
        if let Some(max) = lookup("MAX_CONTENT_LENGTH") {
            self.storage.max_upload_bytes = max
                .parse()
                .with_context(|| format!("Invalid MAX_CONTENT_LENGTH: {max}"))?;
        }
        if let Some(url) = lookup("FRONTEND_URL") {
            self.server.frontend_url = url;
        }
        if let Some(origins) = lookup("CORS_ALLOW_ORIGIN") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(url) = lookup("MEDISCAN_API_URL") {
            self.client.api_url = url;
        }
        if let Some(key) = lookup("MEDISCAN_SESSION_KEY") {
            self.client.session_key = key;
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        if let Ok(explicit) = std::env::var("MEDISCAN_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mediscan").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".mediscan").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret cannot be empty");
        }

        if self.auth.token_ttl_hours == 0 || self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            anyhow::bail!("auth.token_ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}");
        }

        if self.inference.top_k == 0 {
            anyhow::bail!("inference.top_k must be > 0");
        }

        if self.inference.class_names.is_empty() {
            anyhow::bail!("inference.class_names cannot be empty");
        }

        if self.storage.max_upload_bytes == 0 {
            anyhow::bail!("storage.max_upload_bytes must be > 0");
        }

        if self.inference.backend == InferenceBackend::Remote
            && self
                .inference
                .remote_url
                .as_deref()
                .is_none_or(str::is_empty)
        {
            anyhow::bail!("inference.remote_url must be set for the remote backend");
        }

        Ok(())
    }
}
