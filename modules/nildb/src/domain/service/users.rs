use bson::{doc, Document};
use chrono::Utc;
use uuid::Uuid;

use nildb_db::ops;
use nildb_nuc::Did;

use crate::domain::acl;
use crate::domain::error::Error;
use crate::domain::model::{AclEntry, CollectionType, UserDataRef, UserRecord};
use crate::domain::service::Service;
use crate::infra::storage::fields;

impl Service {
    /// The caller's data index: one reference per owned document.
    #[must_use]
    pub fn list_user_data(&self, user: &UserRecord) -> Vec<UserDataRef> {
        user.data.clone()
    }

    /// Read one of the caller's own documents.
    ///
    /// # Errors
    /// `DocumentNotFound` unless the document exists and is owned by the
    /// caller.
    pub async fn read_user_document(
        &self,
        user: &UserRecord,
        collection: Uuid,
        document: Uuid,
    ) -> Result<Document, Error> {
        let filter = owner_filter(user.did, document);
        Ok(ops::find_one_required(&self.gateway.data_collection(&collection), filter).await?)
    }

    /// Delete one of the caller's own documents and its back-reference.
    ///
    /// # Errors
    /// `DocumentNotFound` unless owned by the caller.
    pub async fn delete_user_document(
        &self,
        user: &UserRecord,
        collection: Uuid,
        document: Uuid,
    ) -> Result<(), Error> {
        let filter = owner_filter(user.did, document);
        ops::delete_one_required(&self.gateway.data_collection(&collection), filter).await?;
        self.users
            .remove_ref(
                user.did,
                UserDataRef {
                    collection,
                    document,
                },
                Utc::now(),
            )
            .await?;
        tracing::debug!(user = %user.did, document = %document, "deleted owned document");
        Ok(())
    }

    /// Grant a grantee rights on one of the caller's documents.
    ///
    /// An existing entry for the grantee is replaced; the collection
    /// owner's entry can never be zeroed.
    ///
    /// # Errors
    /// `ResourceAccessDenied` when the caller does not own the document;
    /// `DataValidation` on owner-invariant violations.
    pub async fn grant_access(
        &self,
        user: &UserRecord,
        collection: Uuid,
        document: Uuid,
        entry: AclEntry,
    ) -> Result<(), Error> {
        self.mutate_acl(user, collection, document, |entries, owner| {
            acl::apply_grant(entries, owner, entry.clone())
        })
        .await
    }

    /// Revoke a grantee's entry on one of the caller's documents.
    ///
    /// # Errors
    /// As for grants, plus `DocumentNotFound` when the grantee has no entry.
    pub async fn revoke_access(
        &self,
        user: &UserRecord,
        collection: Uuid,
        document: Uuid,
        grantee: Did,
    ) -> Result<(), Error> {
        self.mutate_acl(user, collection, document, |entries, owner| {
            acl::apply_revoke(entries, owner, grantee)
        })
        .await
    }

    async fn mutate_acl<F>(
        &self,
        user: &UserRecord,
        collection_id: Uuid,
        document_id: Uuid,
        mutate: F,
    ) -> Result<(), Error>
    where
        F: Fn(&mut Vec<AclEntry>, Did) -> Result<(), Error>,
    {
        let collection = self.data_collection_record(collection_id).await?;
        if collection.collection_type != CollectionType::Owned {
            return Err(Error::data_validation(
                "collection documents carry no access lists",
            ));
        }

        let coll = self.gateway.data_collection(&collection_id);
        let stored =
            ops::find_one(&coll, doc! { "_id": fields::uuid_bson(document_id) }).await?;
        let Some(stored) = stored else {
            return Err(Error::DocumentNotFound);
        };
        // Only the document owner may change its access list.
        let owner = fields::req_did(&stored, "_owner")?;
        if owner != user.did {
            return Err(Error::ResourceAccessDenied);
        }

        let mut entries = acl::entries_from_document(&stored)?;
        mutate(&mut entries, collection.owner)?;

        ops::update_one_required(
            &coll,
            doc! { "_id": fields::uuid_bson(document_id) },
            doc! { "$set": {
                "_acl": acl::entries_bson(&entries),
                "_updated": fields::datetime_bson(Utc::now()),
            } },
        )
        .await?;
        Ok(())
    }
}

fn owner_filter(owner: Did, document: Uuid) -> Document {
    doc! { "_id": fields::uuid_bson(document), "_owner": owner.to_string() }
}
