use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Collection, IndexModel};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::TenantDatabase;
use super::definition::{open_secret_keys, DynamicSchema};
use super::validate::ValidatedPayload;
use super::{DefinitionError, ModelError, CREATED_AT, UPDATED_AT};
use crate::crypto::Sealer;
use crate::database::models::SchemaRecord;

const DUPLICATE_KEY: i32 = 11000;

/// Translated list request
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Document,
    pub skip: u64,
    pub limit: i64,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            filter: Document::new(),
            projection: None,
            sort: doc! { CREATED_AT: -1 },
            skip: 0,
            limit: 10,
        }
    }
}

/// A compiled schema bound to its collection in the owner's database
#[derive(Clone)]
pub struct DynamicModel {
    collection: Collection<Document>,
    schema: Arc<DynamicSchema>,
    tenant: TenantDatabase,
}

impl DynamicModel {
    /// The collection is named after the schema
    pub fn new(tenant: &TenantDatabase, schema: Arc<DynamicSchema>) -> Self {
        Self {
            collection: tenant.database.collection(&schema.name),
            schema,
            tenant: tenant.clone(),
        }
    }

    pub fn schema(&self) -> &DynamicSchema {
        &self.schema
    }

    pub fn database(&self) -> &mongodb::Database {
        &self.tenant.database
    }

    /// Create a unique index for every unique field. Failures are logged
    /// and leave the model usable.
    pub async fn ensure_indexes(&self) {
        for field in self.schema.unique_fields() {
            let index = IndexModel::builder()
                .keys(doc! { field.name.as_str(): 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            match self.collection.create_index(index).await {
                Ok(_) => debug!("Ensured unique index on {}.{}", self.schema.name, field.name),
                Err(e) => warn!(
                    "Failed to create unique index on {}.{}: {}",
                    self.schema.name, field.name, e
                ),
            }
        }
    }

    pub async fn insert(&self, mut values: Document) -> Result<Document, ModelError> {
        let now = bson::DateTime::now();
        values.insert(CREATED_AT, now);
        values.insert(UPDATED_AT, now);

        let result = self
            .collection
            .insert_one(values.clone())
            .await
            .map_err(classify)?;

        let mut stored = doc! { "_id": result.inserted_id };
        for (key, value) in values {
            stored.insert(key, value);
        }
        Ok(stored)
    }

    /// Matching page plus the total count for the filter
    pub async fn find(&self, query: &FindQuery) -> Result<(Vec<Document>, u64), ModelError> {
        let total = self.collection.count_documents(query.filter.clone()).await?;

        let options = FindOptions::builder()
            .sort(query.sort.clone())
            .skip(query.skip)
            .limit(query.limit)
            .projection(query.projection.clone())
            .build();

        let cursor = self
            .collection
            .find(query.filter.clone())
            .with_options(options)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok((docs, total))
    }

    pub async fn find_by_id(&self, id: ObjectId, projection: Option<Document>) -> Result<Option<Document>, ModelError> {
        let options = FindOneOptions::builder().projection(projection).build();
        Ok(self
            .collection
            .find_one(doc! { "_id": id })
            .with_options(options)
            .await?)
    }

    /// Set the given fields and return the updated document
    pub async fn patch(&self, id: ObjectId, mut set: Document) -> Result<Option<Document>, ModelError> {
        set.insert(UPDATED_AT, bson::DateTime::now());
        self.update(id, doc! { "$set": set }).await
    }

    /// Overwrite every schema field, clearing the ones in `unset`.
    /// `createdAt` is untouched.
    pub async fn replace(&self, id: ObjectId, payload: ValidatedPayload) -> Result<Option<Document>, ModelError> {
        self.update(id, replacement(payload, bson::DateTime::now())).await
    }

    async fn update(&self, id: ObjectId, update: Document) -> Result<Option<Document>, ModelError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.collection
            .find_one_and_update(doc! { "_id": id }, update)
            .with_options(options)
            .await
            .map_err(classify)
    }

    /// Returns whether a document was removed
    pub async fn delete(&self, id: ObjectId) -> Result<bool, ModelError> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

/// Update document for a full replacement stamped at `now`
fn replacement(payload: ValidatedPayload, now: bson::DateTime) -> Document {
    let ValidatedPayload { mut set, unset } = payload;
    set.insert(UPDATED_AT, now);

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        let cleared: Document = unset.into_iter().map(|f| (f, Bson::String(String::new()))).collect();
        update.insert("$unset", cleared);
    }
    update
}

/// Turn a duplicate-key failure into `ModelError::Duplicate`
fn classify(err: mongodb::error::Error) -> ModelError {
    let failure = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some((e.code, e.message.clone())),
        ErrorKind::Command(e) => Some((e.code, e.message.clone())),
        _ => None,
    };
    match failure {
        Some((DUPLICATE_KEY, message)) => ModelError::Duplicate(duplicate_field(&message)),
        _ => ModelError::Mongo(err),
    }
}

/// Field name from a server message such as
/// `E11000 duplicate key error collection: app.users index: email_1 dup key: { email: "a@b.c" }`
pub fn duplicate_field(message: &str) -> String {
    if let Some(rest) = message.split("dup key: {").nth(1) {
        if let Some((field, _)) = rest.split_once(':') {
            let field = field.trim().trim_matches('"');
            if !field.is_empty() {
                return field.to_string();
            }
        }
    }
    if let Some(rest) = message.split("index: ").nth(1) {
        if let Some(index) = rest.split_whitespace().next() {
            return index.trim_end_matches("_1").trim_end_matches("_-1").to_string();
        }
    }
    "field".to_string()
}

struct CachedSchema {
    project_id: Uuid,
    version: DateTime<Utc>,
    schema: Arc<DynamicSchema>,
}

/// Compiled schemas keyed by schema id. An entry whose `updated_at` no
/// longer matches the stored record is rebuilt.
pub struct ModelCache {
    entries: RwLock<HashMap<Uuid, CachedSchema>>,
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static ModelCache {
        static INSTANCE: OnceLock<ModelCache> = OnceLock::new();
        INSTANCE.get_or_init(ModelCache::new)
    }

    /// Model for `record` bound to `tenant`, compiling the schema and
    /// ensuring its indexes the first time this version is seen
    pub async fn get_or_build(
        &self,
        record: &SchemaRecord,
        tenant: &TenantDatabase,
        sealer: &Sealer,
    ) -> Result<DynamicModel, DefinitionError> {
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&record.id).filter(|c| c.version == record.updated_at) {
                return Ok(DynamicModel::new(tenant, cached.schema.clone()));
            }
        }

        let definitions = open_secret_keys(&record.definition.0, sealer)?;
        let schema = Arc::new(DynamicSchema::from_definitions(&record.name, &definitions)?);
        let model = DynamicModel::new(tenant, schema.clone());
        model.ensure_indexes().await;

        let mut entries = self.entries.write().await;
        entries.insert(
            record.id,
            CachedSchema {
                project_id: record.project_id,
                version: record.updated_at,
                schema,
            },
        );
        info!("Compiled model '{}' ({} fields)", record.name, model.schema().fields().len());
        Ok(model)
    }

    pub async fn invalidate(&self, schema_id: Uuid) {
        self.entries.write().await.remove(&schema_id);
    }

    pub async fn invalidate_project(&self, project_id: Uuid) {
        self.entries
            .write()
            .await
            .retain(|_, cached| cached.project_id != project_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
