use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::models::analysis::{AnalysisSource, Prediction};

pub mod migrator;
pub mod repositories;

pub use repositories::analysis::{AnalysisRow, NewAnalysis};
pub use repositories::user::{NewUser, User};

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
/// lexicographic order matches chronological order.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[must_use]
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Every pooled connection to `:memory:` would see its own database
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    /// Application tables, excluding `SQLite` internals and the migration ledger.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let backend = self.conn.get_database_backend();
        let rows = self
            .conn
            .query_all(Statement::from_string(
                backend,
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' AND name != 'seaql_migrations' ORDER BY name"
                    .to_string(),
            ))
            .await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String>("", "name")?);
        }
        Ok(names)
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn analysis_repo(&self) -> repositories::analysis::AnalysisRepository {
        repositories::analysis::AnalysisRepository::new(self.conn.clone())
    }

    // ========== User Repository Methods ==========

    pub async fn create_user(&self, new_user: NewUser<'_>, security: &SecurityConfig) -> Result<User> {
        self.user_repo().create(new_user, security).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn verify_user_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(email, password).await
    }

    pub async fn update_user_password(
        &self,
        id: i32,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<()> {
        self.user_repo()
            .update_password(id, new_password, security)
            .await
    }

    pub async fn update_user_name(&self, id: i32, name: &str) -> Result<Option<User>> {
        self.user_repo().update_name(id, name).await
    }

    pub async fn set_reset_token(&self, user_id: i32, token: &str, expires_at: &str) -> Result<()> {
        self.user_repo()
            .set_reset_token(user_id, token, expires_at)
            .await
    }

    /// Clears the token if it is still live, returning the owner's id.
    pub async fn consume_reset_token(&self, token: &str) -> Result<Option<i32>> {
        self.user_repo()
            .consume_reset_token(token, &now_timestamp())
            .await
    }

    pub async fn purge_expired_reset_tokens(&self) -> Result<u64> {
        self.user_repo()
            .purge_expired_reset_tokens(&now_timestamp())
            .await
    }

    pub async fn ensure_emergency_key(&self, user_id: i32) -> Result<String> {
        self.user_repo().ensure_emergency_key(user_id).await
    }

    pub async fn find_user_by_emergency_key(&self, key: &str) -> Result<Option<User>> {
        self.user_repo().find_by_emergency_key(key).await
    }

    // ========== Analysis Repository Methods ==========

    pub async fn record_analysis(
        &self,
        user_id: i32,
        filename: &str,
        stored_name: &str,
        predictions: &[Prediction],
        source: AnalysisSource,
    ) -> Result<AnalysisRow> {
        self.analysis_repo()
            .insert(NewAnalysis {
                user_id,
                filename,
                stored_name,
                predictions,
                source,
            })
            .await
    }

    pub async fn get_analysis(&self, id: i32) -> Result<Option<AnalysisRow>> {
        self.analysis_repo().get(id).await
    }

    pub async fn list_analyses_for_user(&self, user_id: i32, limit: u64) -> Result<Vec<AnalysisRow>> {
        self.analysis_repo().list_for_user(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    fn fast_security() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        }
    }

    async fn memory_store() -> Store {
        Store::new("sqlite::memory:").await.unwrap()
    }

    async fn create_user(store: &Store, email: &str) -> User {
        store
            .create_user(
                NewUser {
                    name: "Test",
                    email,
                    password: "test123",
                    role: Role::User,
                },
                &fast_security(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let early = format_timestamp(DateTime::from_timestamp(1_000, 0).unwrap());
        let late = format_timestamp(DateTime::from_timestamp(1_000_000_000, 5_000).unwrap());
        assert!(early < late);
        assert_eq!(early.len(), late.len());
    }

    #[tokio::test]
    async fn test_user_lifecycle() {
        let store = memory_store().await;
        let user = create_user(&store, "test@gmail.com").await;

        assert_eq!(store.count_users().await.unwrap(), 1);
        assert!(store.get_user_by_email("TEST@gmail.com").await.unwrap().is_some());
        assert!(
            store
                .verify_user_password("test@gmail.com", "test123")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .verify_user_password("test@gmail.com", "nope")
                .await
                .unwrap()
                .is_none()
        );

        let renamed = store.update_user_name(user.id, "Renamed").await.unwrap().unwrap();
        assert_eq!(renamed.name, "Renamed");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = memory_store().await;
        create_user(&store, "dup@example.com").await;

        let result = store
            .create_user(
                NewUser {
                    name: "Other",
                    email: "dup@example.com",
                    password: "secret1",
                    role: Role::User,
                },
                &fast_security(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reset_token_expiry() {
        let store = memory_store().await;
        let user = create_user(&store, "reset@example.com").await;

        let past = format_timestamp(Utc::now() - chrono::Duration::minutes(5));
        store.set_reset_token(user.id, "expired", &past).await.unwrap();
        assert_eq!(store.consume_reset_token("expired").await.unwrap(), None);
        assert_eq!(store.purge_expired_reset_tokens().await.unwrap(), 1);

        let future = format_timestamp(Utc::now() + chrono::Duration::minutes(5));
        store.set_reset_token(user.id, "fresh", &future).await.unwrap();
        assert_eq!(store.purge_expired_reset_tokens().await.unwrap(), 0);
        assert_eq!(store.consume_reset_token("fresh").await.unwrap(), Some(user.id));
    }

    #[tokio::test]
    async fn test_consume_reset_token_is_single_use() {
        let store = memory_store().await;
        let user = create_user(&store, "consume@example.com").await;

        let future = format_timestamp(Utc::now() + chrono::Duration::minutes(5));
        store.set_reset_token(user.id, "once", &future).await.unwrap();

        assert_eq!(store.consume_reset_token("once").await.unwrap(), Some(user.id));
        assert_eq!(store.consume_reset_token("once").await.unwrap(), None);

        let past = format_timestamp(Utc::now() - chrono::Duration::minutes(5));
        store.set_reset_token(user.id, "stale", &past).await.unwrap();
        assert_eq!(store.consume_reset_token("stale").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_email_does_not_verify() {
        let store = memory_store().await;
        create_user(&store, "known@example.com").await;

        assert!(
            store
                .verify_user_password("ghost@example.com", "test123")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_emergency_key_is_stable() {
        let store = memory_store().await;
        let user = create_user(&store, "emergency@example.com").await;

        let first = store.ensure_emergency_key(user.id).await.unwrap();
        let second = store.ensure_emergency_key(user.id).await.unwrap();
        assert_eq!(first, second);

        let found = store.find_user_by_emergency_key(&first).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_analyses_listed_newest_first_per_user() {
        let store = memory_store().await;
        let alice = create_user(&store, "alice@example.com").await;
        let bob = create_user(&store, "bob@example.com").await;

        let predictions = vec![Prediction::new("Mass", 0.8)];
        let first = store
            .record_analysis(alice.id, "a.png", "1.png", &predictions, AnalysisSource::Simulated)
            .await
            .unwrap();
        let second = store
            .record_analysis(alice.id, "b.png", "2.png", &predictions, AnalysisSource::Model)
            .await
            .unwrap();
        store
            .record_analysis(bob.id, "c.png", "3.png", &predictions, AnalysisSource::Simulated)
            .await
            .unwrap();

        let history = store.list_analyses_for_user(alice.id, 10).await.unwrap();
        let ids: Vec<i32> = history.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(history[0].predictions, predictions);
        assert_eq!(history[0].source, AnalysisSource::Model);

        let limited = store.list_analyses_for_user(alice.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_table_names() {
        let store = memory_store().await;
        let tables = store.table_names().await.unwrap();
        assert_eq!(tables, vec!["analyses".to_string(), "users".to_string()]);
    }
}
