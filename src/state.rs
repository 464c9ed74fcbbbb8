use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::inference::{Classifier, build_classifier};
use crate::services::{
    AnalysisService, AuthService, SeaOrmAnalysisService, SeaOrmAuthService, UploadStorage,
};

/// Long-lived services shared by the HTTP server, the scheduler and the CLI.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub storage: UploadStorage,

    pub classifier: Arc<dyn Classifier>,

    pub auth_service: Arc<dyn AuthService>,

    pub analysis_service: Arc<dyn AnalysisService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::with_store(config, store).await
    }

    /// Builds the services on top of an already opened store.
    pub async fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let storage = UploadStorage::new(&config.storage.uploads_path);
        storage.ensure_root().await?;

        let classifier = build_classifier(&config.inference)?;

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.auth.clone(),
            config.security.clone(),
            config.server.frontend_url.clone(),
        )) as Arc<dyn AuthService>;

        let analysis_service = Arc::new(SeaOrmAnalysisService::new(
            store.clone(),
            storage.clone(),
            classifier.clone(),
            config.storage.max_upload_bytes,
            config.inference.top_k,
            config.storage.placeholder_image_url.clone(),
        )) as Arc<dyn AnalysisService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            storage,
            classifier,
            auth_service,
            analysis_service,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
