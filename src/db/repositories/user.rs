use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use std::sync::LazyLock;
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::now_timestamp;
use crate::entities::users;
use crate::models::user::{Role, UserProfile};

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub emergency_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role.parse().unwrap_or_default(),
            emergency_key: model.emergency_key,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Inserts a user. The email must already be normalised.
    pub async fn create(&self, new_user: NewUser<'_>, security: &SecurityConfig) -> Result<User> {
        let password = new_user.password.to_string();
        let security = security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .context("Password hashing task panicked")??;

        let now = now_timestamp();

        let active = users::ActiveModel {
            name: Set(new_user.name.to_string()),
            email: Set(new_user.email.to_string()),
            password_hash: Set(password_hash),
            role: Set(new_user.role.as_str().to_string()),
            emergency_key: Set(None),
            reset_token: Set(None),
            reset_token_expires_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(users.into_iter().map(User::from).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Returns the user when the password matches.
    /// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
    /// and would block the async runtime if run directly.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.to_lowercase()))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let Some(user) = user else {
            // Same argon2 work as a real check so unknown emails don't answer faster
            let password = password.to_string();
            task::spawn_blocking(move || {
                let _ = verify_password_hash(&password, &DUMMY_HASH);
            })
            .await
            .context("Password verification task panicked")?;
            return Ok(None);
        };

        let password_hash = user.password_hash.clone();
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || verify_password_hash(&password, &password_hash))
            .await
            .context("Password verification task panicked")??;

        Ok(is_valid.then(|| User::from(user)))
    }

    pub async fn update_password(
        &self,
        id: i32,
        new_password: &str,
        config: &SecurityConfig,
    ) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let password = new_password.to_string();
        let config = config.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, Some(&config)))
            .await
            .context("Password hashing task panicked")??;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.reset_token = Set(None);
        active.reset_token_expires_at = Set(None);
        active.updated_at = Set(now_timestamp());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn update_name(&self, id: i32, name: &str) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for profile update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.name = Set(name.to_string());
        active.updated_at = Set(now_timestamp());
        let model = active.update(&self.conn).await?;

        Ok(Some(User::from(model)))
    }

    pub async fn set_reset_token(&self, id: i32, token: &str, expires_at: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::ResetToken, Expr::value(token))
            .col_expr(users::Column::ResetTokenExpiresAt, Expr::value(expires_at))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to store reset token")?;

        Ok(())
    }

    /// Finds the owner of a reset token that expires after `now`.
    pub async fn find_by_reset_token(&self, token: &str, now: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::ResetToken.eq(token))
            .filter(users::Column::ResetTokenExpiresAt.gt(now))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset token")?;

        Ok(user.map(User::from))
    }

    /// Clears a live reset token in one conditional UPDATE and returns its
    /// owner. Of two concurrent callers with the same token, only one wins.
    pub async fn consume_reset_token(&self, token: &str, now: &str) -> Result<Option<i32>> {
        let Some(user) = self.find_by_reset_token(token, now).await? else {
            return Ok(None);
        };

        let result = users::Entity::update_many()
            .col_expr(users::Column::ResetToken, Expr::value(Option::<String>::None))
            .col_expr(
                users::Column::ResetTokenExpiresAt,
                Expr::value(Option::<String>::None),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now_timestamp()))
            .filter(users::Column::Id.eq(user.id))
            .filter(users::Column::ResetToken.eq(token))
            .filter(users::Column::ResetTokenExpiresAt.gt(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume reset token")?;

        Ok((result.rows_affected == 1).then_some(user.id))
    }

    /// Clears reset tokens that expired at or before `now`.
    pub async fn purge_expired_reset_tokens(&self, now: &str) -> Result<u64> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::ResetToken, Expr::value(Option::<String>::None))
            .col_expr(
                users::Column::ResetTokenExpiresAt,
                Expr::value(Option::<String>::None),
            )
            .filter(users::Column::ResetToken.is_not_null())
            .filter(users::Column::ResetTokenExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired reset tokens")?;

        Ok(result.rows_affected)
    }

    /// Returns the user's emergency key, issuing one on first use.
    pub async fn ensure_emergency_key(&self, id: i32) -> Result<String> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for emergency key")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        if let Some(key) = &user.emergency_key {
            return Ok(key.clone());
        }

        let key = generate_token();
        let mut active: users::ActiveModel = user.into();
        active.emergency_key = Set(Some(key.clone()));
        active.updated_at = Set(now_timestamp());
        active.update(&self.conn).await?;

        Ok(key)
    }

    pub async fn find_by_emergency_key(&self, key: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::EmergencyKey.eq(key))
            .one(&self.conn)
            .await
            .context("Failed to query user by emergency key")?;

        Ok(user.map(User::from))
    }
}

/// Verified against when the email is unknown, hashed with the deployed defaults.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hash_password("mediscan-unknown-user", Some(&SecurityConfig::default())).unwrap_or_default()
});

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default (high memory) params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Params are read from the PHC string, so hashes made with any config verify.
pub fn verify_password_hash(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a random token (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
