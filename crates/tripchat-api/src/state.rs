use std::sync::Arc;
use std::time::Duration;

use tripchat_auth::TokenAuthority;
use tripchat_chat::{ChatService, RequestContext};
use tripchat_types::api::AccessClaims;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: Arc<ChatService>,
    pub tokens: Arc<TokenAuthority>,
    /// Deadline applied to every request's service call.
    pub request_timeout: Duration,
}

impl AppStateInner {
    pub fn context(&self, claims: AccessClaims) -> RequestContext {
        RequestContext::new(claims).with_timeout(self.request_timeout)
    }
}
