use chrono::Utc;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::auth;
use crate::db::DbPool;
use crate::models::{User, UserSummary};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("username already taken")]
    NameTaken,
    #[error(transparent)]
    Internal(#[from] sqlx::Error),
    #[error(transparent)]
    Hashing(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("bad credentials")]
    BadCredentials,
    #[error(transparent)]
    Internal(#[from] sqlx::Error),
    #[error(transparent)]
    Hashing(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("unknown user")]
    Unknown,
    #[error(transparent)]
    Internal(#[from] sqlx::Error),
}

/// Persists users and sessions, hashes/verifies passwords, and mints
/// bearer tokens. First successful registration atomically becomes the
/// owner — see `register`.
pub struct CredentialStore {
    pool: DbPool,
}

impl CredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a new user. The very first user ever registered
    /// atomically becomes the owner with patchbay access; every
    /// subsequent one starts as an ordinary member. The "any users yet?"
    /// check and the insert happen inside one exclusive transaction so
    /// two concurrent first-registrations cannot both elect an owner.
    pub async fn register(&self, name: &str, password: &str) -> Result<(Uuid, String), RegisterError> {
        let digest = auth::hash_password(password).map_err(anyhow::Error::from)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(RegisterError::NameTaken);
        }

        let is_owner: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await?;
        let becomes_owner = is_owner.0 == 0;

        let user_id = Uuid::now_v7();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, name, digest, created_at, is_owner, has_patchbay_access) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(name)
        .bind(&digest)
        .bind(&now)
        .bind(becomes_owner)
        .bind(becomes_owner)
        .execute(&mut *tx)
        .await?;

        let token = auth::generate_token();
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id.to_string())
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((user_id, token))
    }

    pub async fn login(&self, name: &str, password: &str) -> Result<(String, User), LoginError> {
        let user = self
            .find_by_name(name)
            .await?
            .ok_or(LoginError::BadCredentials)?;

        let ok = auth::verify_password(password, &user.digest).map_err(anyhow::Error::from)?;
        if !ok {
            return Err(LoginError::BadCredentials);
        }

        let token = auth::generate_token();
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user.id.to_string())
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok((token, user))
    }

    /// Resolve a bearer token to its owning user. The lookup is a plain
    /// indexed equality match: token entropy (256 bits) makes timing
    /// differences between hit/miss on the primary-key scan
    /// unexploitable, unlike a byte-by-byte passphrase compare.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT u.id, u.name, u.digest, u.created_at, u.is_owner, u.has_patchbay_access \
             FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, name, digest, created_at, is_owner, has_patchbay_access FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, name, digest, created_at, is_owner, has_patchbay_access FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, name, digest, created_at, is_owner, has_patchbay_access FROM users ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| UserSummary::from(&row_to_user(r))).collect())
    }

    /// Grant or revoke patchbay access. Restricted to owner callers by
    /// the Permission Kernel before this is ever invoked; the owner bit
    /// itself is immutable here regardless of caller — targeting the
    /// owner is a no-op, never an error.
    pub async fn grant_patchbay_access(&self, target: Uuid, value: bool) -> Result<(), GrantError> {
        let user = self.find_by_id(target).await?.ok_or(GrantError::Unknown)?;
        if user.is_owner {
            return Ok(());
        }

        sqlx::query("UPDATE users SET has_patchbay_access = ? WHERE id = ?")
            .bind(value)
            .bind(target.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: Uuid::parse_str(row.get::<String, _>("id").as_str()).unwrap_or_else(|_| Uuid::nil()),
        name: row.get("name"),
        digest: row.get("digest"),
        created_at: row
            .get::<String, _>("created_at")
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
        is_owner: row.get("is_owner"),
        has_patchbay_access: row.get("has_patchbay_access"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> CredentialStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        CredentialStore::new(pool)
    }

    #[tokio::test]
    async fn first_registration_becomes_owner() {
        let store = memory_store().await;
        let (alice_id, _) = store.register("alice", "s3cret").await.unwrap();
        let (bob_id, _) = store.register("bob", "hunter2").await.unwrap();

        let alice = store.find_by_id(alice_id).await.unwrap().unwrap();
        let bob = store.find_by_id(bob_id).await.unwrap().unwrap();

        assert!(alice.is_owner);
        assert!(alice.has_patchbay_access);
        assert!(!bob.is_owner);
        assert!(!bob.has_patchbay_access);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let store = memory_store().await;
        store.register("alice", "s3cret").await.unwrap();
        let err = store.register("alice", "other").await.unwrap_err();
        assert!(matches!(err, RegisterError::NameTaken));
    }

    #[tokio::test]
    async fn login_round_trip() {
        let store = memory_store().await;
        store.register("alice", "s3cret").await.unwrap();
        assert!(store.login("alice", "s3cret").await.is_ok());
        assert!(matches!(
            store.login("alice", "wrong").await,
            Err(LoginError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn resolve_unknown_token_is_none() {
        let store = memory_store().await;
        assert!(store.resolve("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn grant_is_noop_on_owner() {
        let store = memory_store().await;
        let (alice_id, _) = store.register("alice", "s3cret").await.unwrap();
        store.grant_patchbay_access(alice_id, false).await.unwrap();
        let alice = store.find_by_id(alice_id).await.unwrap().unwrap();
        assert!(alice.has_patchbay_access);
    }
}
