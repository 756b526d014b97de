use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};

use crate::coerce::apply_coercions;
use crate::error::DbError;

/// Result of a bulk update.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
}

/// Insert a batch of documents. Returns the number inserted.
///
/// # Errors
/// `DbError::Database` on any driver failure.
pub async fn insert_many(
    coll: &Collection<Document>,
    documents: Vec<Document>,
) -> Result<usize, DbError> {
    let inserted = coll
        .insert_many(documents)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    Ok(inserted.inserted_ids.len())
}

/// Run a filtered, paginated find. The filter's `$coerce` directive is
/// applied before the query reaches the store.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn find_page(
    coll: &Collection<Document>,
    mut filter: Document,
    sort: Option<Document>,
    skip: u64,
    limit: i64,
) -> Result<Vec<Document>, DbError> {
    apply_coercions(&mut filter)?;
    let mut find = coll.find(filter).skip(skip).limit(limit);
    if let Some(sort) = sort {
        find = find.sort(sort);
    }
    let cursor = find
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    cursor
        .try_collect()
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))
}

/// Find a single document, if any.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn find_one(
    coll: &Collection<Document>,
    mut filter: Document,
) -> Result<Option<Document>, DbError> {
    apply_coercions(&mut filter)?;
    coll.find_one(filter)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))
}

/// Find a single document; absence is an error.
///
/// # Errors
/// [`DbError::DocumentNotFound`] when nothing matches.
pub async fn find_one_required(
    coll: &Collection<Document>,
    filter: Document,
) -> Result<Document, DbError> {
    find_one(coll, filter).await?.ok_or(DbError::DocumentNotFound)
}

/// Count documents matching a filter.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn count(coll: &Collection<Document>, mut filter: Document) -> Result<u64, DbError> {
    apply_coercions(&mut filter)?;
    coll.count_documents(filter)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))
}

/// Apply an update to every matching document.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn update_many(
    coll: &Collection<Document>,
    mut filter: Document,
    update: Document,
) -> Result<UpdateSummary, DbError> {
    apply_coercions(&mut filter)?;
    let result = coll
        .update_many(filter, update)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    Ok(UpdateSummary {
        matched: result.matched_count,
        modified: result.modified_count,
    })
}

/// Update a single document; absence is an error.
///
/// # Errors
/// [`DbError::DocumentNotFound`] when nothing matches.
pub async fn update_one_required(
    coll: &Collection<Document>,
    mut filter: Document,
    update: Document,
) -> Result<(), DbError> {
    apply_coercions(&mut filter)?;
    let result = coll
        .update_one(filter, update)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    if result.matched_count == 0 {
        return Err(DbError::DocumentNotFound);
    }
    Ok(())
}

/// Upsert a single document.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn upsert_one(
    coll: &Collection<Document>,
    mut filter: Document,
    update: Document,
) -> Result<(), DbError> {
    apply_coercions(&mut filter)?;
    coll.update_one(filter, update)
        .upsert(true)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    Ok(())
}

/// Delete every matching document. Returns the count removed.
///
/// # Errors
/// Coercion failures and driver failures.
pub async fn delete_many(
    coll: &Collection<Document>,
    mut filter: Document,
) -> Result<u64, DbError> {
    apply_coercions(&mut filter)?;
    let result = coll
        .delete_many(filter)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    Ok(result.deleted_count)
}

/// Delete a single document; absence is an error.
///
/// # Errors
/// [`DbError::DocumentNotFound`] when nothing matches.
pub async fn delete_one_required(
    coll: &Collection<Document>,
    mut filter: Document,
) -> Result<(), DbError> {
    apply_coercions(&mut filter)?;
    let result = coll
        .delete_one(filter)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    if result.deleted_count == 0 {
        return Err(DbError::DocumentNotFound);
    }
    Ok(())
}

/// Execute an aggregation pipeline and drain the cursor.
///
/// # Errors
/// Driver failures, classified per the error taxonomy.
pub async fn aggregate(
    coll: &Collection<Document>,
    pipeline: Vec<Document>,
) -> Result<Vec<Document>, DbError> {
    let cursor = coll
        .aggregate(pipeline)
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    cursor
        .try_collect()
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))
}

/// Create an index. `keys` maps field names to `1`/`-1` directions.
///
/// # Errors
/// [`DbError::DuplicateIndex`] on a conflicting definition,
/// [`DbError::InvalidIndexOptions`] when the store rejects the spec.
pub async fn create_index(
    coll: &Collection<Document>,
    keys: Document,
    name: &str,
    unique: bool,
    ttl_seconds: Option<u64>,
) -> Result<(), DbError> {
    let mut options = IndexOptions::default();
    options.name = Some(name.to_owned());
    options.unique = Some(unique);
    options.expire_after = ttl_seconds.map(std::time::Duration::from_secs);
    let model = IndexModel::builder().keys(keys).options(options).build();
    coll.create_index(model)
        .await
        .map_err(|e| DbError::from_driver(&e, name))?;
    Ok(())
}

/// Drop an index by name.
///
/// # Errors
/// [`DbError::IndexNotFound`] when the name is unknown.
pub async fn drop_index(coll: &Collection<Document>, name: &str) -> Result<(), DbError> {
    coll.drop_index(name)
        .await
        .map_err(|e| DbError::from_driver(&e, name))
}

/// List the names of the collection's indexes.
///
/// # Errors
/// Driver failures.
pub async fn list_index_names(coll: &Collection<Document>) -> Result<Vec<String>, DbError> {
    coll.list_index_names()
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))
}

/// Storage-level metadata for one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub count: u64,
    pub size_bytes: i64,
    pub first_write: Option<bson::DateTime>,
    pub last_write: Option<bson::DateTime>,
    pub indexes: Vec<String>,
}

/// Gather counts, storage size, write bounds and index names.
///
/// Write bounds come from the `_created` stamps the document engine
/// maintains on every document.
///
/// # Errors
/// Driver failures.
pub async fn collection_stats(coll: &Collection<Document>) -> Result<CollectionStats, DbError> {
    let total = count(coll, doc! {}).await?;

    let size_bytes = match aggregate(coll, vec![doc! { "$collStats": { "storageStats": {} } }])
        .await
    {
        Ok(stats) => stats
            .first()
            .and_then(|d| d.get_document("storageStats").ok())
            .and_then(|s| match s.get("size") {
                Some(Bson::Int32(n)) => Some(i64::from(*n)),
                Some(Bson::Int64(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or_default(),
        // A collection that has never been written has no storage stats.
        Err(DbError::CollectionNotFound(_)) => 0,
        Err(e) => return Err(e),
    };

    let first = first_created(coll, 1).await?;
    let last = first_created(coll, -1).await?;
    let indexes = list_index_names(coll).await?;

    Ok(CollectionStats {
        count: total,
        size_bytes,
        first_write: first,
        last_write: last,
        indexes,
    })
}

async fn first_created(
    coll: &Collection<Document>,
    direction: i32,
) -> Result<Option<bson::DateTime>, DbError> {
    let found = coll
        .find_one(doc! {})
        .sort(doc! { "_created": direction })
        .await
        .map_err(|e| DbError::from_driver(&e, coll.name()))?;
    Ok(found.and_then(|d| match d.get("_created") {
        Some(Bson::DateTime(at)) => Some(*at),
        _ => None,
    }))
}
