use crate::{
    clock::Clock,
    error::{GrantError, Result},
    expand::expand_patterns,
    models::*,
    repository::GrantStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Answers "does subject have relation on entity" against live grants.
pub struct GrantChecker {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
}

impl GrantChecker {
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns the matching grant, or `None` when nothing live authorizes the triple.
    ///
    /// All three arguments must be non-empty; the empty string is the stored
    /// wildcard and is never a valid check input.
    pub async fn check(&self, subject: &str, relation: &str, entity: &str) -> Result<Option<Grant>> {
        let triple = concrete_triple(subject, relation, entity)?;
        let query = build_check_query(self.clock.now(), &triple)?;
        let found = self.store.find_live(&query).await?;
        debug!(
            "Check {} -> {}",
            triple,
            if found.is_some() { "allowed" } else { "denied" }
        );
        Ok(found)
    }
}

/// Validate check arguments into a fully concrete triple.
pub fn concrete_triple(subject: &str, relation: &str, entity: &str) -> Result<GrantPattern> {
    if subject.is_empty() || relation.is_empty() || entity.is_empty() {
        return Err(GrantError::invalid("empty check arguments"));
    }
    Ok(GrantPattern::new(
        GrantField::concrete(subject)?,
        GrantField::concrete(relation)?,
        GrantField::concrete(entity)?,
    ))
}

/// Liveness at `now` conjoined with every pattern that could authorize `triple`.
pub fn build_check_query(now: DateTime<Utc>, triple: &GrantPattern) -> Result<CheckQuery> {
    let patterns = expand_patterns(&triple.subject, &triple.relation, &triple.entity)?;
    Ok(CheckQuery { now, patterns })
}
