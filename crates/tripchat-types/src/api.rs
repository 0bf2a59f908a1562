use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Registered claims carried by every token the chat core issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub nbf: i64,
    pub exp: i64,
    #[serde(default)]
    pub jti: String,
}

impl RegisteredClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// Access token claims. `userID` is the only identity the chat core trusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

impl AccessClaims {
    pub fn token_id(&self) -> &str {
        &self.registered.jti
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.registered.expires_at()
    }
}

/// Invitation token claims, consumed by the surrounding invitation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationClaims {
    #[serde(rename = "invitationID", default)]
    pub invitation_id: String,
    #[serde(rename = "tripID", default)]
    pub trip_id: String,
    #[serde(rename = "inviteeEmail", default, skip_serializing_if = "Option::is_none")]
    pub invitee_email: Option<String>,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

// -- Pagination --

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    pub fn new(limit: u32, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Limit clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

// -- Requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageContentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub reaction: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LastReadRequest {
    pub message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 1)]
    #[case::normal(25, 25)]
    #[case::over(10_000, MAX_PAGE_LIMIT)]
    fn clamps_page_limit(#[case] limit: u32, #[case] expected: u32) {
        assert_eq!(PageRequest::new(limit, 0).effective_limit(), expected);
    }

    #[test]
    fn access_claims_flatten_registered_fields() {
        let raw = r#"{"userID":"u1","iss":"tripchat","sub":"u1","iat":1,"nbf":1,"exp":2,"jti":"j"}"#;
        let claims: AccessClaims = serde_json::from_str(raw).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.registered.exp, 2);
        assert_eq!(claims.token_id(), "j");
        assert!(claims.email.is_none());
    }

    #[test]
    fn missing_user_id_defaults_to_empty() {
        let raw = r#"{"sub":"u1","exp":2}"#;
        let claims: AccessClaims = serde_json::from_str(raw).unwrap();
        assert!(claims.user_id.is_empty());
    }
}
