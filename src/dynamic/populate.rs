use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use mongodb::Database;
use std::collections::HashMap;
use tracing::warn;

use super::convert::strip_restricted;
use super::definition::DynamicSchema;

/// Replace ObjectId values of `ref` fields with the referenced documents.
/// One `$in` query per reference field; ids that match nothing are kept.
pub async fn populate(database: &Database, schema: &DynamicSchema, docs: &mut [Document]) {
    for field in schema.reference_fields() {
        let Some(target) = field.reference.as_deref() else { continue };

        let ids = collect_ids(docs, &field.name);
        if ids.is_empty() {
            continue;
        }

        let found = match fetch_by_ids(database, target, ids).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to populate '{}' from '{}': {}", field.name, target, e);
                continue;
            }
        };
        substitute(docs, &field.name, &found);
    }
}

fn collect_ids(docs: &[Document], field: &str) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = docs
        .iter()
        .filter_map(|d| match d.get(field) {
            Some(Bson::ObjectId(id)) => Some(*id),
            _ => None,
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

async fn fetch_by_ids(
    database: &Database,
    collection: &str,
    ids: Vec<ObjectId>,
) -> Result<HashMap<ObjectId, Document>, mongodb::error::Error> {
    let cursor = database
        .collection::<Document>(collection)
        .find(doc! { "_id": { "$in": ids } })
        .await?;
    let docs: Vec<Document> = cursor.try_collect().await?;
    Ok(index_by_id(docs))
}

/// Referenced documents keyed by id, restricted fields removed
fn index_by_id(docs: Vec<Document>) -> HashMap<ObjectId, Document> {
    docs.into_iter()
        .filter_map(|mut d| {
            let id = d.get_object_id("_id").ok()?;
            strip_restricted(&mut d);
            Some((id, d))
        })
        .collect()
}

fn substitute(docs: &mut [Document], field: &str, found: &HashMap<ObjectId, Document>) {
    for doc in docs.iter_mut() {
        let replacement = match doc.get(field) {
            Some(Bson::ObjectId(id)) => found.get(id).cloned(),
            _ => None,
        };
        if let Some(referenced) = replacement {
            doc.insert(field, Bson::Document(referenced));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deduplicated() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let docs = vec![
            doc! { "author": a },
            doc! { "author": b },
            doc! { "author": a },
            doc! { "author": "not-an-id" },
            doc! { "title": "no author" },
        ];
        let ids = collect_ids(&docs, "author");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[test]
    fn referenced_documents_lose_restricted_fields() {
        let id = ObjectId::new();
        let found = index_by_id(vec![
            doc! { "_id": id, "name": "Ada", "password": "hunter2", "ssn": "000", "creditCardNumber": "4111" },
            doc! { "name": "no id" },
        ]);
        assert_eq!(found.len(), 1);

        let mut docs = vec![doc! { "author": id }];
        substitute(&mut docs, "author", &found);
        let author = docs[0].get_document("author").unwrap();
        assert_eq!(author.get_str("name").unwrap(), "Ada");
        assert!(!author.contains_key("password"));
        assert!(!author.contains_key("ssn"));
        assert!(!author.contains_key("creditCardNumber"));
    }

    #[test]
    fn missing_references_keep_their_id() {
        let known = ObjectId::new();
        let unknown = ObjectId::new();
        let mut docs = vec![doc! { "author": known }, doc! { "author": unknown }];
        let found = HashMap::from([(known, doc! { "_id": known, "name": "Ada" })]);

        substitute(&mut docs, "author", &found);

        assert_eq!(docs[0].get_document("author").unwrap().get_str("name").unwrap(), "Ada");
        assert_eq!(docs[1].get_object_id("author").unwrap(), unknown);
    }
}
