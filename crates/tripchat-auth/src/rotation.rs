use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::authority::TokenAuthority;

/// Owns the background rotation task.
pub struct RotationHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RotationHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("rotation task ended abnormally: {}", e);
        }
    }
}

/// Rotate the authority's secret every `period` until `cancel` fires.
///
/// The first rotation happens one full period after the call.
pub fn spawn_rotation(
    authority: Arc<TokenAuthority>,
    period: Duration,
    cancel: CancellationToken,
) -> RotationHandle {
    let period = period.max(Duration::from_millis(1));
    let task = tokio::spawn(run_rotation_loop(authority, period, cancel.clone()));
    RotationHandle { cancel, task }
}

async fn run_rotation_loop(
    authority: Arc<TokenAuthority>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!("JWT secret rotation every {:?}", period);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("JWT secret rotation stopped");
                return;
            }
            _ = interval.tick() => match authority.rotate() {
                Ok(()) => info!("JWT secret rotated"),
                Err(e) => error!("JWT secret rotation failed: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_authority() -> (Arc<TokenAuthority>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let authority = TokenAuthority::new("initial-secret", "tripchat")
            .unwrap()
            .with_generator(Arc::new(move || -> Result<String, TokenError> {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("secret-{n}"))
            }));
        (Arc::new(authority), calls)
    }

    #[tokio::test]
    async fn loop_rotates_until_stopped() {
        let (authority, calls) = counted_authority();
        let handle = spawn_rotation(
            authority.clone(),
            Duration::from_millis(20),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.stop().await;

        let rotations = calls.load(Ordering::SeqCst);
        assert!(rotations >= 2, "expected at least two rotations, got {rotations}");
        assert_eq!(authority.current_secret(), format!("secret-{rotations}"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), rotations);
    }

    #[tokio::test]
    async fn parent_cancellation_stops_loop() {
        let (authority, calls) = counted_authority();
        let shutdown = CancellationToken::new();
        let handle = spawn_rotation(authority, Duration::from_secs(3600), shutdown.child_token());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
