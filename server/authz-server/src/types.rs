use auth_grants::{Grant, GrantField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grant as shown to HTTP callers. Wildcard fields are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantView {
    pub user: Option<String>,
    pub relation: Option<String>,
    pub entity: Option<String>,
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Grant> for GrantView {
    fn from(grant: Grant) -> Self {
        Self {
            user: grant.subject.into(),
            relation: grant.relation.into(),
            entity: grant.entity.into(),
            expire_at: grant.expires_at,
            created_at: grant.created_at,
        }
    }
}

/// Body of `POST /grants`. An absent, `null` or `"*"` field is a wildcard.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CreateGrantRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

/// RFC 7231 HTTP-date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Literal used for the wildcard in request bodies and query strings.
pub const WILDCARD: &str = "*";

/// A create field: absent or `*` is the wildcard, anything else must be non-empty.
pub fn create_field(value: Option<String>) -> auth_grants::Result<GrantField> {
    match value {
        Some(value) if value == WILDCARD => Ok(GrantField::Wildcard),
        other => GrantField::try_from(other),
    }
}

/// `*` in a filter selects stored wildcard rows; anything else must be non-empty.
pub fn filter_field(value: Option<String>) -> auth_grants::Result<Option<GrantField>> {
    match value {
        None => Ok(None),
        Some(value) if value == WILDCARD => Ok(Some(GrantField::Wildcard)),
        Some(value) => GrantField::concrete(value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_format() {
        let at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_create_field() {
        assert_eq!(create_field(None).unwrap(), GrantField::Wildcard);
        assert_eq!(create_field(Some("*".into())).unwrap(), GrantField::Wildcard);
        assert_eq!(
            create_field(Some("bob".into())).unwrap(),
            GrantField::concrete("bob").unwrap()
        );
        assert!(create_field(Some(String::new())).is_err());
    }

    #[test]
    fn test_filter_field() {
        assert_eq!(filter_field(None).unwrap(), None);
        assert_eq!(filter_field(Some("*".into())).unwrap(), Some(GrantField::Wildcard));
        assert!(filter_field(Some(String::new())).is_err());
    }
}
