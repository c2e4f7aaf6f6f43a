use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RequestLog {
    pub id: i64,
    pub owner_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status: i32,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub owner_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status: u16,
    pub ip: Option<String>,
}
