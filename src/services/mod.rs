pub mod token;
pub use token::{TokenError, TokenService};

pub mod storage;
pub use storage::{StorageError, StoredUpload, UploadStorage, secure_filename};

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, EmergencyLogin, LoginResult, Registration, ResetRequest,
};
pub use auth_service_impl::SeaOrmAuthService;

pub mod analysis_service;
pub mod analysis_service_impl;
pub use analysis_service::{AnalysisError, AnalysisService, ImageUpload, ModelStatus};
pub use analysis_service_impl::{SeaOrmAnalysisService, render_report};

pub mod maintenance;
pub use maintenance::Maintenance;
