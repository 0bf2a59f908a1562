use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use tripchat_types::models::UserProfile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Optional user directory used to decorate payloads and message views.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, ProfileError>;
}

#[derive(Default)]
pub struct StaticProfiles {
    profiles: HashMap<String, UserProfile>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }
}

#[async_trait]
impl ProfileLookup for StaticProfiles {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, ProfileError> {
        Ok(self.profiles.get(user_id).cloned())
    }
}
