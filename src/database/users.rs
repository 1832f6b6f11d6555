//! User records

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{keys, CacheLayer, WritePolicy};
use crate::database::PostgresPool;
use crate::error::{Error, Result};

const USER_TTL: Duration = Duration::from_secs(300);

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[sqlx(default)]
    pub display_name: Option<String>,
    pub preferences: sqlx::types::Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            display_name: None,
            preferences: sqlx::types::Json(serde_json::json!({})),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_preferences(mut self, preferences: serde_json::Value) -> Self {
        self.preferences = sqlx::types::Json(preferences);
        self
    }

    /// Every cache key this user may be stored under
    pub fn cache_keys(&self) -> [String; 3] {
        [
            keys::user(&self.id.to_string()),
            keys::user(&self.username),
            keys::user(&self.email),
        ]
    }
}

/// How to find a user
#[derive(Debug, Clone, PartialEq)]
pub enum UserLookup {
    Id(Uuid),
    Username(String),
    Email(String),
}

impl UserLookup {
    fn cache_key(&self) -> String {
        match self {
            UserLookup::Id(id) => keys::user(&id.to_string()),
            UserLookup::Username(name) => keys::user(name),
            UserLookup::Email(email) => keys::user(email),
        }
    }
}

/// User store backed by PostgreSQL, fronted by the cache
#[derive(Clone)]
pub struct UserStore {
    pg_pool: PostgresPool,
    cache: Arc<CacheLayer>,
}

impl UserStore {
    pub fn new(pg_pool: PostgresPool, cache: Arc<CacheLayer>) -> Self {
        UserStore { pg_pool, cache }
    }

    /// Insert or update a user, returning its id
    pub async fn save(&self, user: &User) -> Result<Uuid> {
        if user.username.trim().is_empty() || user.email.trim().is_empty() {
            return Err(Error::Validation("Users need a username and an email".into()));
        }

        // a rename leaves the old username/email keys behind
        let previous = self.fetch(&UserLookup::Id(user.id)).await?;

        sqlx::query(r#"
            INSERT INTO users (id, username, email, display_name, preferences, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                preferences = EXCLUDED.preferences,
                updated_at = NOW()
        "#)
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.preferences)
        .bind(user.created_at)
        .execute(&self.pg_pool)
        .await?;

        let mut stale = user.cache_keys().to_vec();
        if let Some(previous) = previous {
            stale.extend(previous.cache_keys());
        }
        for key in &stale {
            self.cache.delete(key).await;
        }

        info!("Saved user {}", user.id);
        Ok(user.id)
    }

    async fn fetch(&self, lookup: &UserLookup) -> Result<Option<User>> {
        let (clause, value) = match lookup {
            UserLookup::Id(id) => ("id = $1::uuid", id.to_string()),
            UserLookup::Username(name) => ("username = $1", name.clone()),
            UserLookup::Email(email) => ("email = $1", email.clone()),
        };

        let user: Option<User> = sqlx::query_as(&format!(
            "SELECT id, username, email, display_name, preferences, created_at, updated_at FROM users WHERE {}",
            clause
        ))
        .bind(value)
        .fetch_optional(&self.pg_pool)
        .await?;

        Ok(user)
    }

    /// Look a user up, cache first
    pub async fn get(&self, lookup: &UserLookup) -> Result<Option<User>> {
        let key = lookup.cache_key();
        if let Some(user) = self.cache.get::<User>(&key).await {
            debug!("User cache hit for {}", key);
            return Ok(Some(user));
        }

        let user = self.fetch(lookup).await?;
        if let Some(user) = &user {
            self.cache
                .set(&key, user, Some(USER_TTL), WritePolicy::Persistent)
                .await;
        }
        Ok(user)
    }

    /// Delete a user. `false` if it did not exist.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let existing = self.fetch(&UserLookup::Id(id)).await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pg_pool)
            .await?;

        self.cache.delete(&keys::user(&id.to_string())).await;
        if let Some(user) = existing {
            for key in user.cache_keys() {
                self.cache.delete(&key).await;
            }
        }

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_cache_keys() {
        let user = User::new("abdullah", "abdullah@example.com");
        let keys = user.cache_keys();
        assert_eq!(keys[0], format!("user:{}", user.id));
        assert_eq!(keys[1], "user:abdullah");
        assert_eq!(keys[2], "user:abdullah@example.com");
    }

    #[test]
    fn test_lookup_keys() {
        assert_eq!(UserLookup::Username("123".into()).cache_key(), "user:123");
        assert_eq!(UserLookup::Email("a@b.c".into()).cache_key(), "user:a@b.c");
    }

    #[test]
    fn test_user_serde_roundtrip_for_cache() {
        let user = User::new("u", "u@example.com").with_preferences(serde_json::json!({"lang": "ar"}));
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["preferences"]["lang"], "ar");
        let back: User = serde_json::from_value(json).unwrap();
        assert_eq!(back, user);
    }
}
