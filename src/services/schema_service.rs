use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{is_unique_violation, ServiceError};
use crate::config;
use crate::crypto::{issue_access_token, Sealer};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Project, SchemaRecord};
use crate::dynamic::definition::seal_secret_keys;
use crate::dynamic::{validate_collection_name, validate_definitions, FieldDefinition, ModelCache};

const REDACTED: &str = "***";

/// Schema as returned to its owner, secret keys masked
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SchemaRecord> for SchemaSummary {
    fn from(record: &SchemaRecord) -> Self {
        Self {
            id: record.id,
            project_id: record.project_id,
            name: record.name.clone(),
            fields: record.definition.0.iter().map(FieldDefinition::redacted).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

pub struct SchemaService {
    main_pool: PgPool,
    sealer: Sealer,
}

impl SchemaService {
    pub async fn new() -> Result<Self, ServiceError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self {
            main_pool,
            sealer: Sealer::server()?,
        })
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        project: &Project,
        name: &str,
        mut fields: Vec<FieldDefinition>,
    ) -> Result<SchemaRecord, ServiceError> {
        let name = name.trim();
        validate_collection_name(name)?;
        validate_definitions(&fields)?;
        seal_secret_keys(&mut fields, &self.sealer)?;

        sqlx::query_as::<_, SchemaRecord>(
            "INSERT INTO schemas (id, owner_id, project_id, name, definition) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(project.id)
        .bind(name)
        .bind(Json(&fields))
        .fetch_one(&self.main_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("Schema '{}' already exists in project '{}'", name, project.name))
            } else {
                e.into()
            }
        })
    }

    /// All schemas of the owner, optionally limited to one project
    pub async fn list(&self, owner_id: Uuid, project_id: Option<Uuid>) -> Result<Vec<SchemaRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, SchemaRecord>(
            r#"
            SELECT * FROM schemas
            WHERE owner_id = $1 AND ($2::uuid IS NULL OR project_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .bind(project_id)
        .fetch_all(&self.main_pool)
        .await?)
    }

    pub async fn find(&self, owner_id: Uuid, id: Uuid) -> Result<SchemaRecord, ServiceError> {
        sqlx::query_as::<_, SchemaRecord>("SELECT * FROM schemas WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(id)
            .fetch_optional(&self.main_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Schema not found".to_string()))
    }

    pub async fn find_by_name(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        name: &str,
    ) -> Result<Option<SchemaRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, SchemaRecord>(
            "SELECT * FROM schemas WHERE owner_id = $1 AND project_id = $2 AND name = $3",
        )
        .bind(owner_id)
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.main_pool)
        .await?)
    }

    /// Rename and/or redefine. A field sent back with the masked secret key
    /// keeps the key already stored for it.
    pub async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        name: Option<&str>,
        fields: Option<Vec<FieldDefinition>>,
    ) -> Result<SchemaRecord, ServiceError> {
        let current = self.find(owner_id, id).await?;

        let name = name.map(str::trim).unwrap_or(&current.name).to_string();
        validate_collection_name(&name)?;

        let fields = match fields {
            Some(mut fields) => {
                validate_definitions(&fields)?;
                let kept = keep_masked_keys(&mut fields, &current.definition.0);
                seal_secret_keys_except(&mut fields, &kept, &self.sealer)?;
                fields
            }
            None => current.definition.0.clone(),
        };

        let updated = sqlx::query_as::<_, SchemaRecord>(
            r#"
            UPDATE schemas SET name = $3, definition = $4, updated_at = now()
            WHERE owner_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(id)
        .bind(&name)
        .bind(Json(&fields))
        .fetch_optional(&self.main_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("Schema '{}' already exists in this project", name))
            } else {
                e.into()
            }
        })?
        .ok_or_else(|| ServiceError::NotFound("Schema not found".to_string()))?;

        ModelCache::global().invalidate(id).await;
        Ok(updated)
    }

    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<SchemaRecord, ServiceError> {
        let deleted = sqlx::query_as::<_, SchemaRecord>("DELETE FROM schemas WHERE owner_id = $1 AND id = $2 RETURNING *")
            .bind(owner_id)
            .bind(id)
            .fetch_optional(&self.main_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Schema not found".to_string()))?;

        ModelCache::global().invalidate(id).await;
        Ok(deleted)
    }

    /// Public URL serving the schema's collection
    pub fn endpoint_url(&self, owner_id: Uuid, project: &str, schema: &str) -> Result<String, ServiceError> {
        let token = issue_access_token(owner_id)?;
        Ok(endpoint_url(&config::config().security.public_base_url, schema, project, &token))
    }
}

pub fn endpoint_url(base: &str, schema: &str, project: &str, token: &str) -> String {
    format!("{}/api/v1/dynamic/{}/{}/{}", base.trim_end_matches('/'), schema, project, token)
}

/// Restore stored (sealed) keys for fields that came back masked; returns
/// the names of those fields
fn keep_masked_keys(fields: &mut [FieldDefinition], stored: &[FieldDefinition]) -> Vec<String> {
    let mut kept = Vec::new();
    for field in fields.iter_mut() {
        if field.secret_key.as_deref() != Some(REDACTED) {
            continue;
        }
        field.secret_key = stored
            .iter()
            .find(|s| s.name == field.name)
            .and_then(|s| s.secret_key.clone());
        if field.secret_key.is_some() {
            kept.push(field.name.clone());
        }
    }
    kept
}

fn seal_secret_keys_except(
    fields: &mut [FieldDefinition],
    already_sealed: &[String],
    sealer: &Sealer,
) -> Result<(), crate::crypto::CryptoError> {
    for field in fields.iter_mut().filter(|f| !already_sealed.contains(&f.name)) {
        seal_secret_keys(std::slice::from_mut(field), sealer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defs(value: serde_json::Value) -> Vec<FieldDefinition> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn endpoint_url_shape() {
        assert_eq!(
            endpoint_url("https://api.example.com/", "orders", "shop", "ab:cd"),
            "https://api.example.com/api/v1/dynamic/orders/shop/ab:cd"
        );
    }

    #[test]
    fn summary_masks_secret_keys() {
        let record = SchemaRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "cards".to_string(),
            definition: Json(defs(json!([{"name": "pan", "type": "string", "secure": true, "secretKey": "sealed"}]))),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let summary = SchemaSummary::from(&record);
        assert_eq!(summary.fields[0].secret_key.as_deref(), Some("***"));
    }

    #[test]
    fn masked_keys_keep_stored_value() {
        let sealer = Sealer::new("server").unwrap();
        let mut stored = defs(json!([{"name": "pan", "type": "string", "secure": true, "secretKey": "old"}]));
        seal_secret_keys(&mut stored, &sealer).unwrap();
        let stored_key = stored[0].secret_key.clone();

        let mut incoming = defs(json!([
            {"name": "pan", "type": "string", "secure": true, "secretKey": "***"},
            {"name": "cvv", "type": "string", "secure": true, "secretKey": "new"}
        ]));
        let kept = keep_masked_keys(&mut incoming, &stored);
        seal_secret_keys_except(&mut incoming, &kept, &sealer).unwrap();

        assert_eq!(incoming[0].secret_key, stored_key);
        let cvv_key = incoming[1].secret_key.as_deref().unwrap();
        assert_eq!(sealer.open(cvv_key).unwrap(), "new");
    }
}
