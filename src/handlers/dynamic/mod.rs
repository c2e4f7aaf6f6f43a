//! Generated CRUD endpoints.
//!
//! `/api/v1/dynamic/:schema/:project/:token[/:document_id]`. The owner has
//! already been decoded from `:token` and rate limited by the time a
//! handler runs; each handler resolves the project, schema, model and
//! permission through [`DynamicContext::resolve`].

pub mod collection;
pub mod document;

use bson::Document;
use serde_json::Value;
use uuid::Uuid;

pub use collection::{collection_get, collection_post, document_id_required};
pub use document::{document_delete, document_get, document_patch, document_put};

use crate::crypto::Sealer;
use crate::dynamic::convert::{document_to_json, strip_restricted};
use crate::dynamic::validate::check_known_fields;
use crate::dynamic::{
    validate_payload, AccessPolicy, ConnectionCache, DynamicModel, DynamicSchema, ModelCache, ValidatedPayload,
};
use crate::error::ApiError;
use crate::services::{PermissionService, ProjectService, SchemaService};
use crate::types::Operation;

/// Everything a dynamic request needs once the URL has been resolved
pub struct DynamicContext {
    pub model: DynamicModel,
    pub policy: AccessPolicy,
    pub sealer: Sealer,
}

impl DynamicContext {
    pub async fn resolve(owner_id: Uuid, schema_name: &str, project_name: &str) -> Result<Self, ApiError> {
        let projects = ProjectService::new().await?;
        let project = projects
            .find_by_name(owner_id, project_name)
            .await?
            .ok_or_else(|| ApiError::not_found("Project not found for this access token."))?;

        let record = SchemaService::new()
            .await?
            .find_by_name(owner_id, project.id, schema_name)
            .await?
            .ok_or_else(|| ApiError::not_found("Schema not found. Please define the schema first."))?;

        let uri = projects.connection_uri(&project)?;
        let tenant = ConnectionCache::global().get(&uri, &project.name).await?;

        let sealer = Sealer::server()?;
        let model = ModelCache::global().get_or_build(&record, &tenant, &sealer).await?;

        let policy = PermissionService::new()
            .await?
            .resolve(owner_id, project.id, schema_name)
            .await?;

        Ok(Self { model, policy, sealer })
    }

    /// 403 unless the policy grants the operation's verb
    pub fn authorize(&self, operation: Operation) -> Result<(), ApiError> {
        authorize(&self.policy, operation)
    }

    /// Check the body's keys, then the role's field allowlist, then validate
    pub fn prepare_write(&self, operation: Operation, body: &Value) -> Result<ValidatedPayload, ApiError> {
        prepare_write(&self.policy, self.model.schema(), &self.sealer, operation, body)
    }
}

fn authorize(policy: &AccessPolicy, operation: Operation) -> Result<(), ApiError> {
    if policy.allows(operation) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "You do not have permission to {} this resource.",
            operation.verb()
        )))
    }
}

/// Undeclared keys are a 400 before any field-level 403
fn prepare_write(
    policy: &AccessPolicy,
    schema: &DynamicSchema,
    sealer: &Sealer,
    operation: Operation,
    body: &Value,
) -> Result<ValidatedPayload, ApiError> {
    let map = check_known_fields(schema, body)?;
    let denied = policy.denied_fields(operation, map.keys());
    if !denied.is_empty() {
        return Err(ApiError::forbidden(format!(
            "You do not have permission to {} fields: {}",
            operation.verb(),
            denied.join(", ")
        )));
    }
    Ok(validate_payload(schema, body, operation, sealer)?)
}

/// Client JSON for a stored document, restricted fields removed
pub(crate) fn render(mut doc: Document) -> Value {
    strip_restricted(&mut doc);
    document_to_json(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::FieldPermissions;
    use crate::dynamic::FieldDefinition;
    use bson::{doc, oid::ObjectId, Bson};
    use serde_json::json;

    fn members() -> DynamicSchema {
        let defs: Vec<FieldDefinition> = serde_json::from_value(json!([
            {"name": "name", "type": "string", "required": true},
            {"name": "salary", "type": "number"}
        ]))
        .unwrap();
        DynamicSchema::from_definitions("members", &defs).unwrap()
    }

    fn editor() -> AccessPolicy {
        AccessPolicy {
            role: "editor".to_string(),
            view: true,
            add: false,
            edit: true,
            delete: false,
            fields: FieldPermissions {
                view: vec![],
                add: vec![],
                edit: vec!["name".to_string()],
            },
        }
    }

    fn sealer() -> Sealer {
        Sealer::new("server-key").unwrap()
    }

    #[test]
    fn missing_verb_is_forbidden() {
        let policy = editor();
        let err = authorize(&policy, Operation::Create).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "You do not have permission to add this resource.");

        let err = authorize(&policy, Operation::Delete).unwrap_err();
        assert_eq!(err.message(), "You do not have permission to delete this resource.");

        assert!(authorize(&policy, Operation::Patch).is_ok());
        assert!(authorize(&AccessPolicy::admin(), Operation::Delete).is_ok());
    }

    #[test]
    fn fields_outside_the_edit_list_are_forbidden() {
        let err = prepare_write(&editor(), &members(), &sealer(), Operation::Patch, &json!({"name": "Ada", "salary": 10}))
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "You do not have permission to edit fields: salary");

        let ok = prepare_write(&editor(), &members(), &sealer(), Operation::Patch, &json!({"name": "Ada"})).unwrap();
        assert_eq!(ok.set.get("name"), Some(&Bson::String("Ada".to_string())));
    }

    #[test]
    fn undeclared_fields_are_rejected_before_field_permissions() {
        let err = prepare_write(&editor(), &members(), &sealer(), Operation::Patch, &json!({"nickname": "x", "salary": 1}))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().starts_with("Invalid fields: nickname"));
    }

    #[test]
    fn permitted_writes_are_still_validated() {
        let err = prepare_write(&AccessPolicy::admin(), &members(), &sealer(), Operation::Create, &json!({"salary": 1}))
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn render_hides_restricted_fields() {
        let oid = ObjectId::new();
        let rendered = render(doc! { "_id": oid, "name": "Ada", "password": "x", "ssn": "1" });
        assert_eq!(rendered["_id"], oid.to_hex());
        assert_eq!(rendered["name"], "Ada");
        assert!(rendered.get("password").is_none());
        assert!(rendered.get("ssn").is_none());
    }
}
