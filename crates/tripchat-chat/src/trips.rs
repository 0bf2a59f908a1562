//! Trip Authorization Adapter: the only source of truth for a user's role
//! on a trip.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use tripchat_types::models::TripRole;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TripAccessError {
    #[error("trip service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TripDirectory: Send + Sync {
    /// The user's role on the trip. `TripRole::None` when the user is not a
    /// member or the trip does not exist; `Err` only for transport failures.
    async fn role_of(&self, trip_id: &str, user_id: &str) -> Result<TripRole, TripAccessError>;
}

/// In-memory directory, loaded from configuration or populated by tests.
#[derive(Default)]
pub struct StaticTripDirectory {
    roles: RwLock<HashMap<(String, String), TripRole>>,
}

impl StaticTripDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `trip:user:role` entries separated by commas.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let directory = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':').map(str::trim);
            let (Some(trip_id), Some(user_id), Some(role), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(format!("expected trip:user:role, got '{entry}'"));
            };
            if trip_id.is_empty() || user_id.is_empty() {
                return Err(format!("empty trip or user in '{entry}'"));
            }
            let role: TripRole = role.parse()?;
            directory.grant(trip_id, user_id, role);
        }
        Ok(directory)
    }

    pub fn with_role(self, trip_id: &str, user_id: &str, role: TripRole) -> Self {
        self.grant(trip_id, user_id, role);
        self
    }

    pub fn grant(&self, trip_id: &str, user_id: &str, role: TripRole) {
        let mut roles = self.roles.write().unwrap_or_else(PoisonError::into_inner);
        if role == TripRole::None {
            roles.remove(&(trip_id.to_string(), user_id.to_string()));
        } else {
            roles.insert((trip_id.to_string(), user_id.to_string()), role);
        }
    }

    pub fn revoke(&self, trip_id: &str, user_id: &str) {
        self.grant(trip_id, user_id, TripRole::None);
    }

    pub fn len(&self) -> usize {
        self.roles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TripDirectory for StaticTripDirectory {
    async fn role_of(&self, trip_id: &str, user_id: &str) -> Result<TripRole, TripAccessError> {
        let roles = self.roles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(roles
            .get(&(trip_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(TripRole::None))
    }
}

#[derive(Deserialize)]
struct MembershipDto {
    #[serde(default)]
    role: String,
}

/// Directory backed by the external trip service:
/// `GET {base}/trips/{trip_id}/members/{user_id}` returning `{"role": "..."}`.
pub struct HttpTripDirectory {
    client: Client,
    base: Url,
}

impl HttpTripDirectory {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn member_url(&self, trip_id: &str, user_id: &str) -> Result<Url, TripAccessError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TripAccessError::Unavailable(format!("unusable base URL {}", self.base)))?
            .pop_if_empty()
            .extend(["trips", trip_id, "members", user_id]);
        Ok(url)
    }
}

#[async_trait]
impl TripDirectory for HttpTripDirectory {
    async fn role_of(&self, trip_id: &str, user_id: &str) -> Result<TripRole, TripAccessError> {
        let url = self.member_url(trip_id, user_id)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(TripRole::None),
            status if !status.is_success() => {
                return Err(TripAccessError::Unavailable(format!(
                    "trip service returned status {}",
                    status.as_u16()
                )));
            }
            _ => {}
        }

        let body: MembershipDto = response.json().await.map_err(map_transport_error)?;
        body.role.parse().or_else(|e: String| {
            warn!(trip_id, user_id, "unrecognised trip role: {}", e);
            Ok(TripRole::None)
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> TripAccessError {
    if error.is_timeout() {
        TripAccessError::Unavailable(format!("timed out: {error}"))
    } else {
        TripAccessError::Unavailable(error.to_string())
    }
}
