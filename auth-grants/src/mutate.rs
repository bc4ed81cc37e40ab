use crate::{
    check::build_check_query,
    clock::Clock,
    error::{GrantError, Result},
    models::*,
    repository::{GrantStore, GrantTransaction},
};
use chrono::SubsecRound;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts per create before a serialization conflict is returned.
pub const MAX_CREATE_ATTEMPTS: u32 = 5;

const CONFLICT_BACKOFF: Duration = Duration::from_millis(5);

/// Creates and revokes grants.
///
/// Creation is a check-then-insert inside one SERIALIZABLE transaction, so two
/// writers racing on the same or wildcard-overlapping triples cannot both
/// commit. The duplicate check reuses the check query: a live wildcard grant
/// that covers the requested triple counts as a duplicate.
pub struct GrantMutator {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
}

impl GrantMutator {
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a grant, or fail with [`GrantError::DuplicateGrant`] carrying the
    /// live grant that already covers it.
    ///
    /// A transaction the store aborts as a serialization conflict is re-run
    /// from the start, up to [`MAX_CREATE_ATTEMPTS`] times; the re-run sees
    /// whatever the competing writer committed.
    pub async fn create(&self, request: NewGrant) -> Result<Grant> {
        request.validate()?;

        let mut attempt = 1;
        loop {
            match self.try_create(&request).await {
                Err(err) if err.is_serialization_conflict() && attempt < MAX_CREATE_ATTEMPTS => {
                    debug!(
                        "Create of {} conflicted on attempt {}, retrying: {}",
                        request.triple(),
                        attempt,
                        err
                    );
                    tokio::time::sleep(CONFLICT_BACKOFF * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_create(&self, request: &NewGrant) -> Result<Grant> {
        // Stored timestamps have microsecond precision.
        let now = self.clock.now().trunc_subsecs(6);
        let triple = request.triple();
        let query = build_check_query(now, &triple)?;
        let grant = Grant {
            subject: request.subject.clone(),
            relation: request.relation.clone(),
            entity: request.entity.clone(),
            expires_at: request.expires_at.map(|at| at.trunc_subsecs(6)),
            created_at: now,
        };

        let mut tx = self.store.begin_serializable().await?;
        match Self::create_in(&mut *tx, &query, &grant).await {
            Ok(()) => {
                tx.commit().await?;
                info!("Granted {}", grant);
                Ok(grant)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed create of {} failed: {}", grant, rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn create_in(
        tx: &mut dyn GrantTransaction,
        query: &CheckQuery,
        grant: &Grant,
    ) -> Result<()> {
        if let Some(conflicting) = tx.find_live(query).await? {
            debug!("Create of {} blocked by {}", grant, conflicting);
            return Err(GrantError::DuplicateGrant {
                conflicting: Box::new(conflicting),
            });
        }

        // An expired row with the same triple would trip the unique index.
        let replaced = tx.delete_stale(&grant.triple(), query.now).await?;
        if replaced > 0 {
            debug!("Replacing expired grant for {}", grant.triple());
        }

        tx.insert(grant).await
    }

    /// Delete every grant matching the filter exactly. At least one column
    /// must be constrained; wildcards in the filter are not expanded.
    pub async fn revoke(&self, filter: &RevokeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(GrantError::invalid(
                "revoke requires at least one of subject, relation or entity",
            ));
        }
        let deleted = self.store.delete_matching(filter).await?;
        info!(
            "Revoked {} grants matching subject={:?} relation={:?} entity={:?}",
            deleted,
            filter.subject.as_ref().map(ToString::to_string),
            filter.relation.as_ref().map(ToString::to_string),
            filter.entity.as_ref().map(ToString::to_string),
        );
        Ok(deleted)
    }
}
