#![cfg(feature = "mongo-integration")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Gateway checks that need a reachable MongoDB; run with
//! `cargo test -p nildb-db --features mongo-integration`.

use bson::doc;

use nildb_db::{ops, DbError, DbGateway, DbOptions};

async fn gateway() -> DbGateway {
    let url = std::env::var("MONGODB_URL")
        .unwrap_or_else(|_| "mongodb://127.0.0.1:27017".into());
    DbGateway::connect(&DbOptions {
        url,
        base_name: format!("nildb_db_it_{}", uuid::Uuid::new_v4().simple()),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn coerced_uuid_filter_matches_native_binary_id() {
    let gateway = gateway().await;
    let collection_id = uuid::Uuid::new_v4();
    let coll = gateway.data_collection(&collection_id);

    let id = bson::Uuid::new();
    ops::insert_many(&coll, vec![doc! { "_id": id, "name": "a" }])
        .await
        .unwrap();

    // A string id only matches through the coercion pipeline.
    let found = ops::find_one(
        &coll,
        doc! { "_id": id.to_string(), "$coerce": { "_id": "uuid" } },
    )
    .await
    .unwrap();
    assert!(found.is_some());

    let found = ops::find_one(&coll, doc! { "_id": id.to_string() })
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn index_lifecycle_maps_store_errors() {
    let gateway = gateway().await;
    let collection_id = uuid::Uuid::new_v4();
    gateway.create_data_collection(&collection_id).await.unwrap();
    let coll = gateway.data_collection(&collection_id);

    ops::create_index(&coll, doc! { "name": 1 }, "name_asc", false, None)
        .await
        .unwrap();
    let names = ops::list_index_names(&coll).await.unwrap();
    assert!(names.iter().any(|n| n == "name_asc"));

    // Same name, different keys: the store rejects the redefinition.
    let err = ops::create_index(&coll, doc! { "other": 1 }, "name_asc", false, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::DuplicateIndex(_) | DbError::InvalidIndexOptions(_)
    ));

    ops::drop_index(&coll, "name_asc").await.unwrap();
    let err = ops::drop_index(&coll, "name_asc").await.unwrap_err();
    assert!(matches!(err, DbError::IndexNotFound(_)));
}
