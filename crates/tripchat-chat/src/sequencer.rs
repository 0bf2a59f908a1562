use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Entries beyond this many trigger a sweep of idle slots.
const SWEEP_THRESHOLD: usize = 1024;

/// One async lock per group. Holding a group's turn from before `BEGIN`
/// until the event is handed off makes emission order match commit order.
#[derive(Default)]
pub struct GroupSequencer {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive turn for one group. Released on drop.
pub struct GroupTurn {
    _guard: OwnedMutexGuard<()>,
}

impl GroupSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, group_id: &str) -> GroupTurn {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() > SWEEP_THRESHOLD {
                // Only the map holds idle slots.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(group_id.to_string()).or_default().clone()
        };
        GroupTurn {
            _guard: slot.lock_owned().await,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_group_waits_for_turn() {
        let sequencer = Arc::new(GroupSequencer::new());
        let first = sequencer.acquire("g1").await;

        let waiter = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                let _turn = sequencer.acquire("g1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_groups_do_not_block() {
        let sequencer = GroupSequencer::new();
        let _a = sequencer.acquire("g1").await;
        tokio::time::timeout(Duration::from_secs(1), sequencer.acquire("g2"))
            .await
            .unwrap();
        assert_eq!(sequencer.len(), 2);
    }

    #[tokio::test]
    async fn idle_slots_are_swept() {
        let sequencer = GroupSequencer::new();
        for i in 0..=SWEEP_THRESHOLD {
            drop(sequencer.acquire(&format!("g{i}")).await);
        }
        let _held = sequencer.acquire("held").await;
        assert_eq!(sequencer.len(), 1);
    }
}
