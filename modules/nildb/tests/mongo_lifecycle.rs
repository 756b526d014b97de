#![cfg(feature = "mongo-integration")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Store-backed lifecycle tests. Need a reachable MongoDB; run with
//! `cargo test -p nildb --features mongo-integration` and set
//! `MONGODB_URL` when the server is not on localhost.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use nildb::domain::model::{AclEntry, CollectionType, RunStatus, VariableSpec};
use nildb::domain::service::{CreateOwnedRequest, RunRequest, Service, ServiceConfig};
use nildb_db::{DbGateway, DbOptions};
use nildb_nuc::Keypair;

async fn service() -> std::sync::Arc<Service> {
    let url = std::env::var("MONGODB_URL")
        .unwrap_or_else(|_| "mongodb://127.0.0.1:27017".into());
    let gateway = DbGateway::connect(&DbOptions {
        url,
        base_name: format!("nildb_it_{}", Uuid::new_v4().simple()),
    })
    .await
    .unwrap();
    let (service, runner) = Service::new(gateway, ServiceConfig::default());
    tokio::spawn(runner.run(tokio_util::sync::CancellationToken::new()));
    service
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("fixture must be an object"),
    }
}

fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "_id": { "type": "string" },
            "name": { "type": "string" },
        },
        "required": ["_id", "name"],
    })
}

#[tokio::test]
async fn create_collection_then_ingest_and_count() {
    let service = service().await;
    let builder = service
        .register_builder(Keypair::generate().did(), "acme".into())
        .await
        .unwrap();

    let collection = service
        .create_collection(
            &builder,
            None,
            "people".into(),
            CollectionType::Standard,
            person_schema(),
        )
        .await
        .unwrap();

    let id = Uuid::new_v4();
    let created = service
        .create_standard_data(
            &builder,
            collection.id,
            vec![object(json!({"_id": id.to_string(), "name": "a"}))],
        )
        .await
        .unwrap();
    assert_eq!(created, 1);

    let meta = service
        .collection_metadata(&builder, collection.id)
        .await
        .unwrap();
    assert_eq!(meta.count, 1);
    assert!(meta.first_write.is_some());
}

#[tokio::test]
async fn owned_read_respects_and_follows_grants() {
    let service = service().await;
    let owner = service
        .register_builder(Keypair::generate().did(), "owner".into())
        .await
        .unwrap();
    let other = service
        .register_builder(Keypair::generate().did(), "other".into())
        .await
        .unwrap();
    let user = Keypair::generate().did();

    let collection = service
        .create_collection(
            &owner,
            None,
            "docs".into(),
            CollectionType::Owned,
            person_schema(),
        )
        .await
        .unwrap();

    let doc_id = Uuid::new_v4();
    service
        .create_owned_data(
            &owner,
            CreateOwnedRequest {
                collection: collection.id,
                owner: user,
                data: vec![object(json!({"_id": doc_id.to_string(), "name": "d"}))],
                acl: AclEntry::full(owner.did),
            },
        )
        .await
        .unwrap();

    // A second builder sees nothing until granted.
    let page = service
        .find_data(other.did, collection.id, Map::new(), None, None)
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    let user_record = service.load_user(user).await.unwrap().unwrap();
    service
        .grant_access(
            &user_record,
            collection.id,
            doc_id,
            AclEntry {
                grantee: other.did,
                read: true,
                write: false,
                execute: false,
            },
        )
        .await
        .unwrap();

    let page = service
        .find_data(other.did, collection.id, Map::new(), None, None)
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    // Deleting the document removes the user's last reference and the user.
    service
        .delete_user_document(&user_record, collection.id, doc_id)
        .await
        .unwrap();
    assert!(service.load_user(user).await.unwrap().is_none());
}

#[tokio::test]
async fn query_run_reaches_a_terminal_state() {
    let service = service().await;
    let builder = service
        .register_builder(Keypair::generate().did(), "acme".into())
        .await
        .unwrap();
    let collection = service
        .create_collection(
            &builder,
            None,
            "people".into(),
            CollectionType::Standard,
            person_schema(),
        )
        .await
        .unwrap();
    service
        .create_standard_data(
            &builder,
            collection.id,
            vec![
                object(json!({"_id": Uuid::new_v4().to_string(), "name": "a"})),
                object(json!({"_id": Uuid::new_v4().to_string(), "name": "b"})),
            ],
        )
        .await
        .unwrap();

    let mut variables = BTreeMap::new();
    variables.insert(
        "name".to_owned(),
        VariableSpec {
            path: "$.pipeline[0].$match.name".into(),
            optional: false,
        },
    );
    let query = service
        .create_query(
            &builder,
            None,
            "by-name".into(),
            collection.id,
            variables,
            vec![json!({"$match": {"name": ""}})],
        )
        .await
        .unwrap();

    let run = service
        .run_query(
            builder.did,
            RunRequest {
                query: query.id,
                variables: object(json!({"name": "a"})),
                background: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(run.result.map(|r| r.len()), Some(1));
}
