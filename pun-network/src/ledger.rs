//! Immunity token ledger.
//!
//! Each child may hold immunity tokens. A delivery for a child with a token
//! consumes one and short-circuits. All balances are cleared on a schedule
//! (daily at midnight by default).

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::schedule::{CronSchedule, ScheduledTask, Scheduler};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The entity holds no tokens
    #[error("No immunity token available for {entity}")]
    NoTokenAvailable { entity: String },
}

/// Token operations used by the delivery orchestrator.
pub trait ImmunityLedger: Send + Sync {
    /// Current balance, `0` for unknown entities.
    fn get_balance(&self, entity: &str) -> u32;

    /// Add one token.
    fn award_token(&self, entity: &str, reason: &str);

    /// Atomically consume one token, returning the remaining balance.
    fn use_token(&self, entity: &str) -> Result<u32, LedgerError>;
}

/// In-memory ledger of immunity token balances.
pub struct ImmunityTokenLedger {
    /// Balance per entity
    balances: Arc<DashMap<String, u32>>,
    /// Scheduled reset, if running
    reset_task: Mutex<Option<ScheduledTask>>,
}

impl ImmunityTokenLedger {
    /// Create a ledger without a reset schedule.
    pub fn new() -> Self {
        Self {
            balances: Arc::new(DashMap::new()),
            reset_task: Mutex::new(None),
        }
    }

    /// Create a ledger whose balances are cleared every time `schedule` fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(schedule: CronSchedule, scheduler: &Scheduler) -> Self {
        let ledger = Self::new();
        let balances = Arc::clone(&ledger.balances);

        let task = scheduler.every(schedule, move || {
            let cleared = clear_all(&balances);
            info!(cleared, "Reset immunity token balances");
        });

        ledger.set_reset_task(Some(task));
        ledger
    }

    /// Clear every balance now.
    pub fn reset(&self) -> usize {
        let cleared = clear_all(&self.balances);
        info!(cleared, "Reset immunity token balances");
        cleared
    }

    /// Stop the scheduled reset.
    pub fn shutdown(&self) {
        if let Some(task) = self.take_reset_task() {
            task.cancel();
            debug!("Immunity token reset task stopped");
        }
    }

    /// Whether a scheduled reset is running.
    pub fn has_reset_schedule(&self) -> bool {
        self.reset_task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Number of entities with a recorded balance.
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Whether no balances are recorded.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    fn set_reset_task(&self, task: Option<ScheduledTask>) {
        if let Ok(mut slot) = self.reset_task.lock() {
            *slot = task;
        }
    }

    fn take_reset_task(&self) -> Option<ScheduledTask> {
        self.reset_task.lock().ok().and_then(|mut slot| slot.take())
    }
}

fn clear_all(balances: &DashMap<String, u32>) -> usize {
    let cleared = balances.len();
    balances.clear();
    cleared
}

impl Default for ImmunityTokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmunityLedger for ImmunityTokenLedger {
    fn get_balance(&self, entity: &str) -> u32 {
        self.balances.get(entity).map(|balance| *balance).unwrap_or(0)
    }

    fn award_token(&self, entity: &str, reason: &str) {
        info!(entity = %entity, reason = %reason, "Awarding immunity token to {} because {}", entity, reason);
        let mut balance = self.balances.entry(entity.to_string()).or_insert(0);
        *balance = balance.saturating_add(1);
    }

    fn use_token(&self, entity: &str) -> Result<u32, LedgerError> {
        let no_token = || LedgerError::NoTokenAvailable {
            entity: entity.to_string(),
        };

        // The entry guard holds the shard lock, so check and decrement are one step.
        match self.balances.entry(entity.to_string()) {
            Entry::Occupied(mut occupied) => {
                let balance = occupied.get_mut();
                if *balance == 0 {
                    return Err(no_token());
                }
                *balance -= 1;
                debug!(entity = %entity, remaining = *balance, "Used immunity token");
                Ok(*balance)
            }
            Entry::Vacant(_) => Err(no_token()),
        }
    }
}

impl Drop for ImmunityTokenLedger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn test_unknown_entity_has_zero_balance() {
        let ledger = ImmunityTokenLedger::new();
        assert_eq!(ledger.get_balance("Alice"), 0);

        assert_eq!(
            ledger.use_token("Alice"),
            Err(LedgerError::NoTokenAvailable {
                entity: "Alice".to_string()
            })
        );
        assert_eq!(ledger.get_balance("Alice"), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_award_then_use() {
        let ledger = ImmunityTokenLedger::new();
        ledger.award_token("Bob", "good behavior");
        ledger.award_token("Bob", "cleaned room");
        assert_eq!(ledger.get_balance("Bob"), 2);

        assert_eq!(ledger.use_token("Bob"), Ok(1));
        assert_eq!(ledger.use_token("Bob"), Ok(0));
        assert!(ledger.use_token("Bob").is_err());
        assert_eq!(ledger.get_balance("Bob"), 0);
    }

    #[test]
    fn test_award_saturates_at_max() {
        let ledger = ImmunityTokenLedger::new();
        ledger.balances.insert("Erin".to_string(), u32::MAX);

        ledger.award_token("Erin", "one more");
        assert_eq!(ledger.get_balance("Erin"), u32::MAX);
        assert_eq!(ledger.use_token("Erin"), Ok(u32::MAX - 1));
    }

    #[test]
    fn test_reset_clears_everyone() {
        let ledger = ImmunityTokenLedger::new();
        ledger.award_token("Alice", "a");
        ledger.award_token("Bob", "b");
        assert_eq!(ledger.reset(), 2);
        assert_eq!(ledger.get_balance("Alice"), 0);
        assert_eq!(ledger.get_balance("Bob"), 0);
    }

    #[test]
    fn test_concurrent_use_never_overdraws() {
        let ledger = Arc::new(ImmunityTokenLedger::new());
        for _ in 0..50 {
            ledger.award_token("Carol", "chores");
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut used = 0;
                    while ledger.use_token("Carol").is_ok() {
                        used += 1;
                    }
                    used
                })
            })
            .collect();

        let used: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(used, 50);
        assert_eq!(ledger.get_balance("Carol"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_reset_fires_at_midnight() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 14, 23, 59, 30).unwrap());
        let scheduler = Scheduler::new(Arc::new(clock));
        let ledger = ImmunityTokenLedger::start(CronSchedule::daily_midnight(), &scheduler);
        assert!(ledger.has_reset_schedule());

        ledger.award_token("Dave", "walked the dog");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ledger.get_balance("Dave"), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(ledger.get_balance("Dave"), 0);

        ledger.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ledger.has_reset_schedule());
    }
}
