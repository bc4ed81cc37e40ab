use crate::{
    check::GrantChecker,
    clock::{Clock, SystemClock},
    error::{GrantError, Result},
    models::*,
    mutate::GrantMutator,
    reaper::{ExpiryReaper, ReaperFailurePolicy},
    repository::GrantStore,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// Default deadline for a single check, create or revoke.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Entry point for checking, granting and revoking permissions.
///
/// The engine owns no state besides the store handle and clock it was built
/// with; clone the `Arc` around it to share across request handlers.
pub struct GrantEngine {
    /// Storage for grants
    store: Arc<dyn GrantStore>,

    clock: Arc<dyn Clock>,

    checker: GrantChecker,

    mutator: GrantMutator,

    /// Deadline applied to every store-touching operation
    timeout: Duration,
}

impl GrantEngine {
    /// Create an engine over the given store using the system clock.
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self::with_parts(store, Arc::new(SystemClock), DEFAULT_OPERATION_TIMEOUT)
    }

    fn with_parts(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            checker: GrantChecker::new(store.clone(), clock.clone()),
            mutator: GrantMutator::new(store.clone(), clock.clone()),
            store,
            clock,
            timeout,
        }
    }

    /// Replace the clock used for liveness and expiry decisions.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::with_parts(self.store, clock, self.timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn GrantStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // =============================================================================
    // Core Operations
    // =============================================================================

    /// The live grant authorizing `subject relation entity`, if any.
    pub async fn check(&self, subject: &str, relation: &str, entity: &str) -> Result<Option<Grant>> {
        self.with_deadline(self.checker.check(subject, relation, entity))
            .await
    }

    pub async fn is_allowed(&self, subject: &str, relation: &str, entity: &str) -> Result<bool> {
        Ok(self.check(subject, relation, entity).await?.is_some())
    }

    /// Create a grant. Fails with [`GrantError::DuplicateGrant`] if a live
    /// grant already covers the triple.
    pub async fn create(&self, grant: NewGrant) -> Result<Grant> {
        self.with_deadline(self.mutator.create(grant)).await
    }

    /// Delete grants matching the filter exactly. Returns how many were removed.
    pub async fn revoke(&self, filter: &RevokeFilter) -> Result<u64> {
        self.with_deadline(self.mutator.revoke(filter)).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.with_deadline(self.store.ping()).await
    }

    // =============================================================================
    // Expiry
    // =============================================================================

    pub fn expiry_reaper(&self) -> ExpiryReaper {
        ExpiryReaper::new(self.store.clone(), self.clock.clone())
    }

    /// Run the expiry reaper until `shutdown` fires, or until a sweep fails
    /// under [`ReaperFailurePolicy::Halt`].
    pub async fn run_expiry_reaper(
        &self,
        interval: Duration,
        policy: ReaperFailurePolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.expiry_reaper()
            .with_interval(interval)
            .with_policy(policy)
            .run(shutdown)
            .await
    }

    /// Dropping the inner future on timeout drops any open transaction with
    /// it, which rolls the transaction back.
    async fn with_deadline<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Operation exceeded deadline of {:?}", self.timeout);
                Err(GrantError::Timeout(self.timeout))
            }
        }
    }
}
