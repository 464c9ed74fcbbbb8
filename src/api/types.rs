use serde::{Deserialize, Serialize};

use crate::models::analysis::{AnalysisRecord, AnalysisSource, Prediction};
use crate::models::user::UserProfile;

/// Response envelope: `{"status": "success" | "error", "message"?, ...fields}`.
/// The payload's fields sit next to `status` rather than under a `data` key.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            data: None,
        }
    }
}

impl ApiResponse<Empty> {
    pub fn message(message: impl Into<String>) -> Self {
        Self::with_message(message, Empty {})
    }
}

/// Payload for responses that carry only a message.
#[derive(Debug, Serialize, Deserialize)]
pub struct Empty {}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserBody {
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginBody {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmergencyLoginBody {
    pub emergency_key: String,
    pub user: UserProfile,
}

/// `token` is only filled in when reset tokens are exposed for development.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordBody {
    pub token: Option<String>,
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AnalyzeBody {
    pub analysis_id: i32,
    pub predictions: Vec<Prediction>,
    pub image_url: String,
    pub filename: String,
    pub timestamp: String,
    pub source: AnalysisSource,
}

impl From<AnalysisRecord> for AnalyzeBody {
    fn from(record: AnalysisRecord) -> Self {
        Self {
            analysis_id: record.id,
            predictions: record.predictions,
            image_url: record.image_url,
            filename: record.filename,
            timestamp: record.timestamp,
            source: record.source,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryBody {
    pub analyses: Vec<AnalysisRecord>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisBody {
    pub analysis: AnalysisRecord,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
}

// ============================================================================
// System
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub service: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub classifier: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct DbTestBody {
    pub tables: Vec<String>,
    pub user_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MlTestBody {
    pub backend: &'static str,
    pub classes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_fields_are_flattened() {
        let body = ApiResponse::success(DbTestBody {
            tables: vec!["users".to_string()],
            user_count: 3,
        });

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({"status": "success", "tables": ["users"], "user_count": 3})
        );
    }

    #[test]
    fn test_error_shape() {
        let value = serde_json::to_value(ApiResponse::<Empty>::error("Token is missing!")).unwrap();
        assert_eq!(
            value,
            json!({"status": "error", "message": "Token is missing!"})
        );
    }

    #[test]
    fn test_message_only() {
        let value = serde_json::to_value(ApiResponse::message("API is working!")).unwrap();
        assert_eq!(value, json!({"status": "success", "message": "API is working!"}));
    }

    #[test]
    fn test_register_request_tolerates_missing_fields() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.com"}"#).unwrap();
        assert_eq!(req.email, "a@b.com");
        assert!(req.password.is_empty());
    }
}
