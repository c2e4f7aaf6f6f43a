use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::dynamic::FieldDefinition;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SchemaRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub definition: Json<Vec<FieldDefinition>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
