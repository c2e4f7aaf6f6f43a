//! End-to-end flow against a running server. Needs DATABASE_URL and
//! DYNAVO_TEST_MONGO_URI; skipped otherwise.

mod common;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn register_define_and_crud() -> Result<()> {
    let Some(mongo_uri) = common::full_stack_env() else {
        eprintln!("skipping: DATABASE_URL and DYNAVO_TEST_MONGO_URI are not both set");
        return Ok(());
    };
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let api = |path: &str| format!("{}{}", server.base_url, path);

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let email = format!("flow-{}@example.com", &suffix[..8]);

    // Register and log in
    let res = client
        .post(api("/api/v1/users/register"))
        .json(&json!({ "email": email, "username": format!("flow{}", &suffix[..8]), "password": "Sup3r-secret" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(api("/api/v1/users/register"))
        .json(&json!({ "email": email, "username": "another", "password": "Sup3r-secret" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(api("/api/v1/users/login"))
        .json(&json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let login: Value = client
        .post(api("/api/v1/users/login"))
        .json(&json!({ "email": email, "password": "Sup3r-secret" }))
        .send()
        .await?
        .json()
        .await?;
    let jwt = login["data"]["token"].as_str().context("token")?.to_string();

    // Project and schema
    let project = format!("flow_{}", &suffix[..8]);
    let res = client
        .post(api("/api/v1/projects"))
        .bearer_auth(&jwt)
        .json(&json!({ "name": project, "connection_uri": mongo_uri }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let created: Value = client
        .post(api("/api/v1/schemas"))
        .bearer_auth(&jwt)
        .json(&json!({
            "project": project,
            "name": "contacts",
            "fields": [
                { "name": "name", "type": "string", "required": true },
                { "name": "email", "type": "string", "unique": true },
                { "name": "age", "type": "number" },
                { "name": "password", "type": "string" }
            ]
        }))
        .send()
        .await?
        .json()
        .await?;
    let schema_id = created["data"]["schema"]["id"].as_str().context("schema id")?.to_string();
    let endpoint = created["data"]["url"].as_str().context("endpoint url")?;
    // The public base URL may differ from the test server address
    let path = &endpoint[endpoint.find("/api/v1/dynamic/").context("dynamic path")?..];
    let endpoint = api(path);

    // Create, validate, read, patch, delete
    let res = client.post(&endpoint).json(&json!({ "age": 3 })).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["field_errors"]["name"], "name is required");

    let res = client
        .post(&endpoint)
        .json(&json!({ "name": "Ada", "email": "ada@example.com", "age": "36", "password": "hunter2" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let doc: Value = res.json().await?;
    let id = doc["data"]["_id"].as_str().context("document id")?.to_string();
    let created_at = doc["data"]["createdAt"].clone();
    assert_eq!(doc["data"]["age"], 36);
    assert!(doc["data"].get("password").is_none());

    let res = client
        .post(&endpoint)
        .json(&json!({ "name": "Eve", "email": "ada@example.com" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let list: Value = client
        .get(&endpoint)
        .query(&[("filter", r#"{"age":{"$gte":30}}"#), ("select", "name")])
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(list["pagination"]["total_records"], 1);
    assert_eq!(list["data"][0]["name"], "Ada");
    assert!(list["data"][0].get("email").is_none());

    let res = client
        .get(&endpoint)
        .query(&[("filter", r#"{"password":"x"}"#)])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .patch(format!("{}/{}", endpoint, id))
        .json(&json!({ "age": 37 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // References are populated without restricted fields
    let notes: Value = client
        .post(api("/api/v1/schemas"))
        .bearer_auth(&jwt)
        .json(&json!({
            "project": project,
            "name": "notes",
            "fields": [
                { "name": "title", "type": "string" },
                { "name": "author", "type": "objectid", "ref": "contacts" }
            ]
        }))
        .send()
        .await?
        .json()
        .await?;
    let notes_id = notes["data"]["schema"]["id"].as_str().context("notes schema id")?.to_string();
    let notes_url = notes["data"]["url"].as_str().context("notes url")?;
    let notes_endpoint = api(&notes_url[notes_url.find("/api/v1/dynamic/").context("dynamic path")?..]);

    let res = client
        .post(&notes_endpoint)
        .json(&json!({ "title": "Engines", "author": id }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let listed: Value = client.get(&notes_endpoint).send().await?.json().await?;
    let author = &listed["data"][0]["author"];
    assert_eq!(author["name"], "Ada");
    assert!(author.get("password").is_none());

    // Replace clears omitted fields and keeps the creation time
    let res = client
        .put(format!("{}/{}", endpoint, id))
        .json(&json!({ "name": "Ada Lovelace" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let replaced: Value = res.json().await?;
    assert_eq!(replaced["data"]["name"], "Ada Lovelace");
    assert!(replaced["data"].get("email").is_none());
    assert!(replaced["data"].get("age").is_none());
    assert_eq!(replaced["data"]["createdAt"], created_at);
    assert!(replaced["data"]["updatedAt"].is_string());

    // Scoped permissions: verbs first, then undeclared keys, then field lists
    let permission_url = api(&format!("/api/v1/permissions/{}/contacts", project));
    let res = client
        .put(&permission_url)
        .bearer_auth(&jwt)
        .json(&json!({ "role": "editor", "view": true, "edit": true, "fields": { "edit": ["name"] } }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.post(&endpoint).json(&json!({ "name": "Bob" })).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "You do not have permission to add this resource.");

    let res = client
        .patch(format!("{}/{}", endpoint, id))
        .json(&json!({ "age": 40 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "You do not have permission to edit fields: age");

    let res = client
        .patch(format!("{}/{}", endpoint, id))
        .json(&json!({ "nickname": "Countess" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.delete(format!("{}/{}", endpoint, id)).send().await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client.delete(&permission_url).bearer_auth(&jwt).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(format!("{}/not-an-id", endpoint)).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.delete(format!("{}/{}", endpoint, id)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.delete(format!("{}/{}", endpoint, id)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Clean up the platform side
    for schema in [&schema_id, &notes_id] {
        let res = client
            .delete(api(&format!("/api/v1/schemas/{}", schema)))
            .bearer_auth(&jwt)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = client.delete(api("/api/v1/users/me")).bearer_auth(&jwt).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}
