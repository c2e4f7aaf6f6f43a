use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::database::manager::DatabaseManager;
use crate::database::models::{FieldPermissions, PermissionRecord};
use crate::dynamic::{validate_collection_name, AccessPolicy};

fn default_role() -> String {
    "viewer".to_string()
}

fn default_true() -> bool {
    true
}

/// Body of a permission upsert
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionInput {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_true")]
    pub view: bool,
    #[serde(default)]
    pub add: bool,
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub fields: FieldPermissions,
}

pub struct PermissionService {
    main_pool: PgPool,
}

impl PermissionService {
    pub async fn new() -> Result<Self, ServiceError> {
        let main_pool = DatabaseManager::main_pool().await?;
        Ok(Self { main_pool })
    }

    /// Effective policy; a collection without a stored permission is fully open
    pub async fn resolve(&self, owner_id: Uuid, project_id: Uuid, collection: &str) -> Result<AccessPolicy, ServiceError> {
        Ok(self
            .find(owner_id, project_id, collection)
            .await?
            .map(|record| AccessPolicy::from(&record))
            .unwrap_or_else(AccessPolicy::admin))
    }

    pub async fn find(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        collection: &str,
    ) -> Result<Option<PermissionRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, PermissionRecord>(
            "SELECT * FROM permissions WHERE owner_id = $1 AND project_id = $2 AND collection_name = $3",
        )
        .bind(owner_id)
        .bind(project_id)
        .bind(collection)
        .fetch_optional(&self.main_pool)
        .await?)
    }

    pub async fn list(&self, owner_id: Uuid, project_id: Uuid) -> Result<Vec<PermissionRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, PermissionRecord>(
            "SELECT * FROM permissions WHERE owner_id = $1 AND project_id = $2 ORDER BY collection_name",
        )
        .bind(owner_id)
        .bind(project_id)
        .fetch_all(&self.main_pool)
        .await?)
    }

    pub async fn upsert(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        collection: &str,
        input: PermissionInput,
    ) -> Result<PermissionRecord, ServiceError> {
        validate_collection_name(collection)?;
        let role = input.role.trim();
        if role.is_empty() {
            return Err(ServiceError::Invalid("Role cannot be empty".to_string()));
        }

        Ok(sqlx::query_as::<_, PermissionRecord>(
            r#"
            INSERT INTO permissions
                (id, owner_id, project_id, collection_name, role, can_view, can_add, can_edit, can_delete, fields)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (project_id, collection_name) DO UPDATE SET
                role = EXCLUDED.role,
                can_view = EXCLUDED.can_view,
                can_add = EXCLUDED.can_add,
                can_edit = EXCLUDED.can_edit,
                can_delete = EXCLUDED.can_delete,
                fields = EXCLUDED.fields,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(project_id)
        .bind(collection)
        .bind(role)
        .bind(input.view)
        .bind(input.add)
        .bind(input.edit)
        .bind(input.delete)
        .bind(Json(&input.fields))
        .fetch_one(&self.main_pool)
        .await?)
    }

    /// Returns whether a stored permission was removed
    pub async fn delete(&self, owner_id: Uuid, project_id: Uuid, collection: &str) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "DELETE FROM permissions WHERE owner_id = $1 AND project_id = $2 AND collection_name = $3",
        )
        .bind(owner_id)
        .bind(project_id)
        .bind(collection)
        .execute(&self.main_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_defaults() {
        let input: PermissionInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.role, "viewer");
        assert!(input.view);
        assert!(!input.add && !input.edit && !input.delete);
        assert!(input.fields.view.is_empty());
    }

    #[test]
    fn input_with_field_lists() {
        let input: PermissionInput = serde_json::from_value(json!({
            "role": "editor", "edit": true, "fields": {"edit": ["name"]}
        }))
        .unwrap();
        assert_eq!(input.role, "editor");
        assert!(input.edit);
        assert_eq!(input.fields.edit, vec!["name"]);
    }
}
