use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{is_unique_violation, ServiceError};
use crate::auth::{
    hash_password, validate_email_format, validate_password_strength, validate_username_format, verify_password,
    AuthError,
};
use crate::database::manager::DatabaseManager;
use crate::database::models::User;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Partial profile update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct UserService {
    main_pool: PgPool,
}

impl UserService {
    pub async fn new() -> Result<Self, ServiceError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let username = username.trim();
        validate_email_format(&email).map_err(ServiceError::Invalid)?;
        validate_username_format(username).map_err(ServiceError::Invalid)?;
        validate_password_strength(password).map_err(ServiceError::Invalid)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already used".to_string()));
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, username, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.main_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Email already used".to_string())
            } else {
                e.into()
            }
        })
    }

    /// Unknown email and wrong password are indistinguishable to the caller
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let Some(user) = self.find_by_email(&normalize_email(email)).await? else {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;

        if !matches {
            return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        Ok(user)
    }

    pub async fn find(&self, id: Uuid) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.main_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.main_pool)
            .await?)
    }

    pub async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User, ServiceError> {
        let email = changes.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            validate_email_format(email).map_err(ServiceError::Invalid)?;
        }
        let username = changes.username.as_deref().map(str::trim).map(String::from);
        if let Some(username) = &username {
            validate_username_format(username).map_err(ServiceError::Invalid)?;
        }
        let password_hash = match changes.password {
            Some(password) => {
                validate_password_strength(&password).map_err(ServiceError::Invalid)?;
                Some(hash_blocking(password).await?)
            }
            None => None,
        };

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                username = COALESCE($3, username),
                password_hash = COALESCE($4, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .fetch_optional(&self.main_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Email already used".to_string())
            } else {
                e.into()
            }
        })?
        .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    /// Projects, schemas, permissions and activities cascade
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.main_pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Subscription plan, `None` for an unknown user
    pub async fn plan_for(&self, id: Uuid) -> Result<Option<String>, ServiceError> {
        let plan: Option<(String,)> = sqlx::query_as("SELECT plan FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.main_pool)
            .await?;
        Ok(plan.map(|(p,)| p))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[tokio::test]
    async fn blocking_hash_verifies() {
        let hash = hash_blocking("correct horse".to_string()).await.unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
    }
}
