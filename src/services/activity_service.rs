use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::ServiceError;
use crate::database::manager::DatabaseManager;
use crate::database::models::Activity;

pub const MAX_ACTIVITY_PAGE: i64 = 100;

/// Account audit trail
pub struct ActivityService {
    main_pool: PgPool,
}

impl ActivityService {
    pub async fn new() -> Result<Self, ServiceError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    /// Append an entry. Failures are logged, never returned.
    pub async fn record(&self, user_id: Uuid, description: &str) {
        let result = sqlx::query("INSERT INTO activities (user_id, description) VALUES ($1, $2)")
            .bind(user_id)
            .bind(description)
            .execute(&self.main_pool)
            .await;
        if let Err(e) = result {
            warn!("Failed to record activity '{}' for {}: {}", description, user_id, e);
        }
    }

    /// Newest first
    pub async fn list(&self, user_id: Uuid, limit: i64) -> Result<Vec<Activity>, ServiceError> {
        Ok(sqlx::query_as::<_, Activity>(
            "SELECT * FROM activities WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit.clamp(1, MAX_ACTIVITY_PAGE))
        .fetch_all(&self.main_pool)
        .await?)
    }
}

/// Record an activity without holding up the request
pub fn spawn_record(user_id: Uuid, description: &'static str) {
    tokio::spawn(async move {
        match ActivityService::new().await {
            Ok(service) => service.record(user_id, description).await,
            Err(e) => warn!("Activity log unavailable: {}", e),
        }
    });
}
