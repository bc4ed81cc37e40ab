use crate::error::{GrantError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One position of a grant triple.
///
/// A stored `Wildcard` matches any concrete value in that position. Concrete
/// values are never empty; the store layer is the only place where the
/// wildcard is encoded (as the empty string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "Option<String>")]
pub enum GrantField {
    Concrete(String),
    Wildcard,
}

impl GrantField {
    /// Build a concrete value, rejecting the empty string.
    pub fn concrete(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(GrantError::invalid("concrete grant field must not be empty"));
        }
        Ok(Self::Concrete(value))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    pub fn as_concrete(&self) -> Option<&str> {
        match self {
            Self::Concrete(value) => Some(value),
            Self::Wildcard => None,
        }
    }

    /// Column representation: the wildcard is stored as `""`.
    pub fn as_stored(&self) -> &str {
        match self {
            Self::Concrete(value) => value,
            Self::Wildcard => "",
        }
    }

    pub fn from_stored(value: String) -> Self {
        if value.is_empty() {
            Self::Wildcard
        } else {
            Self::Concrete(value)
        }
    }
}

impl fmt::Display for GrantField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(value) => write!(f, "{}", value),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

impl TryFrom<Option<String>> for GrantField {
    type Error = GrantError;

    fn try_from(value: Option<String>) -> Result<Self> {
        match value {
            Some(value) => Self::concrete(value),
            None => Ok(Self::Wildcard),
        }
    }
}

impl From<GrantField> for Option<String> {
    fn from(field: GrantField) -> Self {
        match field {
            GrantField::Concrete(value) => Some(value),
            GrantField::Wildcard => None,
        }
    }
}

/// A (subject, relation, entity) combination matched field-for-field
/// against stored grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantPattern {
    pub subject: GrantField,
    pub relation: GrantField,
    pub entity: GrantField,
}

impl GrantPattern {
    pub fn new(subject: GrantField, relation: GrantField, entity: GrantField) -> Self {
        Self {
            subject,
            relation,
            entity,
        }
    }

    pub fn is_all_wildcard(&self) -> bool {
        self.subject.is_wildcard() && self.relation.is_wildcard() && self.entity.is_wildcard()
    }

    /// Exact equality with the grant's stored triple.
    pub fn matches(&self, grant: &Grant) -> bool {
        self.subject == grant.subject
            && self.relation == grant.relation
            && self.entity == grant.entity
    }
}

impl fmt::Display for GrantPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.relation, self.entity)
    }
}

/// A stored permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub subject: GrantField,
    pub relation: GrantField,
    pub entity: GrantField,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Live at `now` iff it never expires or expires strictly later.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }

    pub fn triple(&self) -> GrantPattern {
        GrantPattern::new(
            self.subject.clone(),
            self.relation.clone(),
            self.entity.clone(),
        )
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.entity)?;
        if let Some(expires_at) = self.expires_at {
            write!(f, " (expires {})", expires_at.to_rfc3339())?;
        }
        Ok(())
    }
}

/// Request to create a grant. Any field may be a wildcard, but not all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrant {
    pub subject: GrantField,
    pub relation: GrantField,
    pub entity: GrantField,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewGrant {
    pub fn new(subject: GrantField, relation: GrantField, entity: GrantField) -> Self {
        Self {
            subject,
            relation,
            entity,
            expires_at: None,
        }
    }

    /// Shorthand for a fully concrete grant.
    pub fn concrete(subject: &str, relation: &str, entity: &str) -> Result<Self> {
        Ok(Self::new(
            GrantField::concrete(subject)?,
            GrantField::concrete(relation)?,
            GrantField::concrete(entity)?,
        ))
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn triple(&self) -> GrantPattern {
        GrantPattern::new(
            self.subject.clone(),
            self.relation.clone(),
            self.entity.clone(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        for field in [&self.subject, &self.relation, &self.entity] {
            if let GrantField::Concrete(value) = field {
                if value.is_empty() {
                    return Err(GrantError::invalid("concrete grant field must not be empty"));
                }
            }
        }
        if self.triple().is_all_wildcard() {
            return Err(GrantError::invalid(
                "a grant must name at least one of subject, relation or entity",
            ));
        }
        Ok(())
    }
}

/// Exact-match filter for revocation. `None` leaves a column unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeFilter {
    pub subject: Option<GrantField>,
    pub relation: Option<GrantField>,
    pub entity: Option<GrantField>,
}

impl RevokeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: GrantField) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn relation(mut self, relation: GrantField) -> Self {
        self.relation = Some(relation);
        self
    }

    pub fn entity(mut self, entity: GrantField) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.relation.is_none() && self.entity.is_none()
    }

    pub fn matches(&self, grant: &Grant) -> bool {
        let column = |filter: &Option<GrantField>, value: &GrantField| {
            filter.as_ref().map_or(true, |wanted| wanted == value)
        };
        column(&self.subject, &grant.subject)
            && column(&self.relation, &grant.relation)
            && column(&self.entity, &grant.entity)
    }
}

/// Liveness condition plus pattern disjunction, evaluated as one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckQuery {
    pub now: DateTime<Utc>,
    pub patterns: Vec<GrantPattern>,
}

impl CheckQuery {
    pub fn matches(&self, grant: &Grant) -> bool {
        grant.is_live_at(self.now) && self.patterns.iter().any(|pattern| pattern.matches(grant))
    }
}
