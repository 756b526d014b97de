use bson::{doc, Document};

use nildb_nuc::Did;

use crate::domain::error::Error;
use crate::domain::model::{AclAction, AclEntry, CollectionRecord, CollectionType};

/// Compose the effective store filter for `(caller, collection, action)`.
///
/// Standard collections admit only their owner, with the user filter passed
/// through untouched. Owned collections fold an `$elemMatch` ACL predicate
/// into the user filter, so the store itself enforces per-document rights.
///
/// # Errors
/// `ResourceAccessDenied` when a standard collection is addressed by anyone
/// but its owner. Existence is never disclosed to non-owners.
pub fn effective_filter(
    caller: Did,
    collection: &CollectionRecord,
    action: AclAction,
    user_filter: Document,
) -> Result<Document, Error> {
    match collection.collection_type {
        CollectionType::Standard => {
            if collection.owner == caller {
                Ok(user_filter)
            } else {
                Err(Error::ResourceAccessDenied)
            }
        }
        CollectionType::Owned => {
            let mut grant_match = Document::new();
            grant_match.insert("grantee", caller.to_string());
            grant_match.insert(action.field(), true);
            let acl_predicate = doc! { "_acl": { "$elemMatch": grant_match } };
            if user_filter.is_empty() {
                Ok(acl_predicate)
            } else {
                Ok(doc! { "$and": [user_filter, acl_predicate] })
            }
        }
    }
}

/// Apply a grant to an owned document's ACL.
///
/// An existing entry for the grantee is replaced in place; the collection
/// owner's entry may never be downgraded to all-false.
///
/// # Errors
/// `DataValidation` when the grant would violate the owner invariant.
pub fn apply_grant(
    acl: &mut Vec<AclEntry>,
    collection_owner: Did,
    entry: AclEntry,
) -> Result<(), Error> {
    if entry.grantee == collection_owner && entry.is_all_false() {
        return Err(Error::data_validation(
            "collection owner access cannot be revoked",
        ));
    }
    match acl.iter_mut().find(|e| e.grantee == entry.grantee) {
        Some(existing) => *existing = entry,
        None => acl.push(entry),
    }
    Ok(())
}

/// Remove a grantee from an owned document's ACL.
///
/// # Errors
/// `DataValidation` when targeting the collection owner's entry,
/// `DocumentNotFound` when the grantee has no entry.
pub fn apply_revoke(
    acl: &mut Vec<AclEntry>,
    collection_owner: Did,
    grantee: Did,
) -> Result<(), Error> {
    if grantee == collection_owner {
        return Err(Error::data_validation(
            "collection owner access cannot be revoked",
        ));
    }
    let before = acl.len();
    acl.retain(|e| e.grantee != grantee);
    if acl.len() == before {
        return Err(Error::DocumentNotFound);
    }
    Ok(())
}

/// Serialize one ACL entry for storage.
#[must_use]
pub fn entry_bson(entry: &AclEntry) -> bson::Bson {
    bson::Bson::Document(doc! {
        "grantee": entry.grantee.to_string(),
        "read": entry.read,
        "write": entry.write,
        "execute": entry.execute,
    })
}

/// Parse a stored document's `_acl` array.
///
/// # Errors
/// `Database` on a malformed list; owned documents always carry one.
pub fn entries_from_document(document: &Document) -> Result<Vec<AclEntry>, Error> {
    use crate::infra::storage::fields;

    let Some(bson::Bson::Array(items)) = document.get("_acl") else {
        return Err(Error::Database("owned document is missing _acl".into()));
    };
    items
        .iter()
        .map(|item| match item {
            bson::Bson::Document(entry) => Ok(AclEntry {
                grantee: fields::req_did(entry, "grantee")?,
                read: fields::req_bool(entry, "read")?,
                write: fields::req_bool(entry, "write")?,
                execute: fields::req_bool(entry, "execute")?,
            }),
            _ => Err(Error::Database("malformed _acl entry".into())),
        })
        .collect()
}

/// Serialize a whole ACL for a `$set` update.
#[must_use]
pub fn entries_bson(entries: &[AclEntry]) -> bson::Bson {
    bson::Bson::Array(entries.iter().map(entry_bson).collect())
}
