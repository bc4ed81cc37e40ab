use crate::{
    error::{GrantError, Result},
    models::*,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

mod postgres;

pub use postgres::PostgresGrantStore;

/// Storage interface for grants.
///
/// Only `begin_serializable` hands out a transaction; everything else is a
/// single statement against the store.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Open a transaction at SERIALIZABLE isolation.
    async fn begin_serializable(&self) -> Result<Box<dyn GrantTransaction>>;

    /// First live grant matching any pattern in the query.
    async fn find_live(&self, query: &CheckQuery) -> Result<Option<Grant>>;

    /// Delete every grant matching the filter exactly. Returns rows removed.
    async fn delete_matching(&self, filter: &RevokeFilter) -> Result<u64>;

    /// Delete grants with `expires_at <= now`. Returns rows removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// A serializable transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait GrantTransaction: Send {
    async fn find_live(&mut self, query: &CheckQuery) -> Result<Option<Grant>>;

    /// Remove a no-longer-live grant holding exactly this triple.
    async fn delete_stale(&mut self, triple: &GrantPattern, now: DateTime<Utc>) -> Result<u64>;

    async fn insert(&mut self, grant: &Grant) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

type GrantTable = BTreeMap<GrantPattern, Grant>;

/// In-memory grant store for testing and development.
///
/// Transactions hold the table lock from begin to commit, which makes them
/// serializable with respect to each other and to single statements.
#[derive(Clone, Default)]
pub struct InMemoryGrantStore {
    grants: Arc<Mutex<GrantTable>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, live or not.
    pub async fn all(&self) -> Vec<Grant> {
        self.grants.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.grants.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.grants.lock().await.is_empty()
    }

    fn first_match(table: &GrantTable, query: &CheckQuery) -> Option<Grant> {
        table.values().find(|grant| query.matches(grant)).cloned()
    }

    fn insert_unique(table: &mut GrantTable, grant: &Grant) -> Result<()> {
        let key = grant.triple();
        if table.contains_key(&key) {
            return Err(GrantError::StorageError(format!(
                "unique constraint violated for {}",
                key
            )));
        }
        table.insert(key, grant.clone());
        Ok(())
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn begin_serializable(&self) -> Result<Box<dyn GrantTransaction>> {
        let guard = self.grants.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }

    async fn find_live(&self, query: &CheckQuery) -> Result<Option<Grant>> {
        let table = self.grants.lock().await;
        Ok(Self::first_match(&table, query))
    }

    async fn delete_matching(&self, filter: &RevokeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(GrantError::invalid("refusing to delete without a filter"));
        }
        let mut table = self.grants.lock().await;
        let before = table.len();
        table.retain(|_, grant| !filter.matches(grant));
        Ok((before - table.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut table = self.grants.lock().await;
        let before = table.len();
        table.retain(|_, grant| grant.is_live_at(now));
        Ok((before - table.len()) as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Works on a copy of the table; `commit` swaps it in under the held lock.
pub struct InMemoryTransaction {
    guard: Option<OwnedMutexGuard<GrantTable>>,
    working: GrantTable,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.guard.is_none() {
            return Err(GrantError::StorageError("transaction already finished".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantTransaction for InMemoryTransaction {
    async fn find_live(&mut self, query: &CheckQuery) -> Result<Option<Grant>> {
        self.ensure_open()?;
        Ok(InMemoryGrantStore::first_match(&self.working, query))
    }

    async fn delete_stale(&mut self, triple: &GrantPattern, now: DateTime<Utc>) -> Result<u64> {
        self.ensure_open()?;
        let stale = self
            .working
            .get(triple)
            .map_or(false, |grant| !grant.is_live_at(now));
        if stale {
            self.working.remove(triple);
            return Ok(1);
        }
        Ok(0)
    }

    async fn insert(&mut self, grant: &Grant) -> Result<()> {
        self.ensure_open()?;
        InMemoryGrantStore::insert_unique(&mut self.working, grant)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| GrantError::StorageError("transaction already finished".to_string()))?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.guard = None;
        self.working.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(subject: &str, expires_at: Option<DateTime<Utc>>) -> Grant {
        Grant {
            subject: GrantField::from_stored(subject.to_string()),
            relation: GrantField::concrete("viewer").unwrap(),
            entity: GrantField::concrete("doc1").unwrap(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_transaction_commit_and_rollback() {
        let store = InMemoryGrantStore::new();

        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert(&grant("alice", None)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.is_empty().await, "rolled back insert must not be visible");

        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert(&grant("alice", None)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let store = InMemoryGrantStore::new();
        {
            let mut tx = store.begin_serializable().await.unwrap();
            tx.insert(&grant("alice", None)).await.unwrap();
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unique_triple_enforced() {
        let store = InMemoryGrantStore::new();
        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert(&grant("alice", None)).await.unwrap();
        let err = tx.insert(&grant("alice", None)).await.unwrap_err();
        assert!(matches!(err, GrantError::StorageError(_)));
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_rows() {
        let store = InMemoryGrantStore::new();
        let now = Utc::now();

        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert(&grant("alice", None)).await.unwrap();
        tx.insert(&grant("bob", Some(now - Duration::seconds(1)))).await.unwrap();
        tx.insert(&grant("carol", Some(now))).await.unwrap();
        tx.insert(&grant("dave", Some(now + Duration::hours(1)))).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.delete_expired(now).await.unwrap(), 2);
        let remaining: Vec<String> = store
            .all()
            .await
            .into_iter()
            .map(|g| g.subject.to_string())
            .collect();
        assert_eq!(remaining, vec!["alice".to_string(), "dave".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_matching_requires_filter() {
        let store = InMemoryGrantStore::new();
        let mut tx = store.begin_serializable().await.unwrap();
        tx.insert(&grant("alice", None)).await.unwrap();
        tx.insert(&grant("", None)).await.unwrap();
        tx.commit().await.unwrap();

        let err = store.delete_matching(&RevokeFilter::new()).await.unwrap_err();
        assert!(matches!(err, GrantError::InvalidArgument(_)));
        assert_eq!(store.len().await, 2);

        let removed = store
            .delete_matching(&RevokeFilter::new().subject(GrantField::Wildcard))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
