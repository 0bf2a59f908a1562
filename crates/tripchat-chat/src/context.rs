use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tripchat_types::api::{AccessClaims, RegisteredClaims};

use crate::error::ChatError;

/// Caller identity plus the cancellation signal and deadline for one call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    claims: AccessClaims,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(claims: AccessClaims) -> Self {
        Self {
            claims,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Context for a bare user id, with no other token claims.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self::new(AccessClaims {
            registered: RegisteredClaims {
                sub: user_id.clone(),
                ..RegisteredClaims::default()
            },
            user_id,
            email: None,
        })
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.claims.user_id
    }

    pub fn claims(&self) -> &AccessClaims {
        &self.claims
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails fast if the call is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(deadline_exceeded());
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the call is cancelled or its deadline
    /// passes first. On either, `fut` is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, ChatError>>,
    {
        self.check()?;

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(cancelled()),
                result = fut => result,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .unwrap_or_else(|_| Err(deadline_exceeded())),
            None => guarded.await,
        }
    }
}

fn cancelled() -> ChatError {
    ChatError::Unavailable("cancelled".into())
}

fn deadline_exceeded() -> ChatError {
    ChatError::Unavailable("deadline exceeded".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_passes_through_result() {
        let ctx = RequestContext::for_user("u1");
        assert_eq!(ctx.run(async { Ok::<_, ChatError>(7) }).await, Ok(7));
        assert_eq!(ctx.user_id(), "u1");
        assert_eq!(ctx.claims().registered.sub, "u1");
    }

    #[tokio::test]
    async fn cancelled_context_rejects_before_running() {
        let cancel = CancellationToken::new();
        let ctx = RequestContext::for_user("u1").with_cancellation(cancel.clone());
        cancel.cancel();

        let result = ctx.run(async { Ok::<_, ChatError>(()) }).await;
        assert_eq!(result, Err(ChatError::Unavailable("cancelled".into())));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_work() {
        let cancel = CancellationToken::new();
        let ctx = RequestContext::for_user("u1").with_cancellation(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(ChatError::Unavailable("cancelled".into())));
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_work() {
        let ctx = RequestContext::for_user("u1").with_timeout(Duration::from_millis(10));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(ChatError::Unavailable("deadline exceeded".into())));
    }
}
