use std::time::{Duration, Instant};

use dashmap::DashMap;

use nildb_nuc::Did;

use crate::domain::model::Builder;

/// Process-wide cache of builder records.
///
/// Any mutation that could change a cached field calls [`BuilderCache::taint`];
/// the next read then refreshes from the catalog. Reads may be stale only
/// between a mutation's commit and its taint.
#[derive(Debug, Default)]
pub struct BuilderCache {
    entries: DashMap<Did, Builder>,
}

impl BuilderCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, did: Did) -> Option<Builder> {
        self.entries.get(&did).map(|entry| entry.value().clone())
    }

    pub fn store(&self, builder: Builder) {
        self.entries.insert(builder.did, builder);
    }

    /// Invalidate one entry; the next read goes to the catalog.
    pub fn taint(&self, did: Did) {
        self.entries.remove(&did);
    }
}

/// Short-TTL cache in front of the revocation journal.
///
/// Reads are lock-free; both outcomes are cached so a hot token does not
/// hit the journal on every request.
#[derive(Debug)]
pub struct RevocationCache {
    entries: DashMap<String, (bool, Instant)>,
    ttl: Duration,
}

impl RevocationCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn get(&self, token_id: &str) -> Option<bool> {
        let entry = self.entries.get(token_id)?;
        let (revoked, stored_at) = *entry;
        if stored_at.elapsed() >= self.ttl {
            drop(entry);
            self.entries.remove(token_id);
            return None;
        }
        Some(revoked)
    }

    pub fn store(&self, token_id: String, revoked: bool) {
        self.entries.insert(token_id, (revoked, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nildb_nuc::Keypair;

    fn builder(name: &str) -> Builder {
        Builder {
            did: Keypair::generate().did(),
            name: name.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            collections: vec![],
        }
    }

    #[test]
    fn taint_forces_a_reload() {
        let cache = BuilderCache::new();
        let record = builder("a");
        let did = record.did;
        cache.store(record);
        assert!(cache.get(did).is_some());
        cache.taint(did);
        assert!(cache.get(did).is_none());
    }

    #[test]
    fn revocation_entries_expire() {
        let cache = RevocationCache::new(Duration::ZERO);
        cache.store("t1".into(), true);
        // TTL zero: immediately stale.
        assert_eq!(cache.get("t1"), None);

        let cache = RevocationCache::new(Duration::from_secs(60));
        cache.store("t2".into(), false);
        assert_eq!(cache.get("t2"), Some(false));
    }
}
