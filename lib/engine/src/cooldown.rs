//! Per-trigger cooldown gate.
//!
//! Admission and the `last_fired` update are a single check-and-set under
//! the table lock, so concurrent deliveries for the same trigger cannot both
//! be admitted inside one window. Entries live for the process lifetime;
//! memory is bounded by the number of gated triggers in the catalog.

use chrono::{DateTime, Duration, Utc};
use homeflow_core::WorkflowId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Identifies one trigger of one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    /// The workflow.
    pub workflow_id: WorkflowId,
    /// The trigger node within the workflow.
    pub trigger_node_id: String,
}

impl CooldownKey {
    /// Creates a key.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, trigger_node_id: impl Into<String>) -> Self {
        Self {
            workflow_id,
            trigger_node_id: trigger_node_id.into(),
        }
    }
}

/// The cooldown table.
pub struct CooldownTable {
    last_fired: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether a firing is admitted at `now`.
    ///
    /// `cooldown_sec <= 0` always admits without recording. Otherwise the
    /// firing is admitted iff the window has elapsed since the previous
    /// admitted firing, and admission atomically records `now`.
    pub fn admit(&self, key: &CooldownKey, cooldown_sec: i64, now: DateTime<Utc>) -> bool {
        if cooldown_sec <= 0 {
            return true;
        }

        let mut last_fired = self.last_fired.lock().expect("cooldown lock poisoned");
        let admitted = match last_fired.get(key) {
            Some(last) => now - *last >= Duration::seconds(cooldown_sec),
            None => true,
        };
        if admitted {
            last_fired.insert(key.clone(), now);
        }
        admitted
    }

    /// Seeds `last_fired = now` for a trigger that has never fired.
    ///
    /// Used when the engine first subscribes, so a burst of retained
    /// deliveries cannot bypass cooldowns that were meant to rate-limit.
    pub fn warm(&self, key: CooldownKey, now: DateTime<Utc>) {
        self.last_fired
            .lock()
            .expect("cooldown lock poisoned")
            .entry(key)
            .or_insert(now);
    }
}

impl Default for CooldownTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cooldown_always_admits() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let now = Utc::now();

        assert!(table.admit(&key, 0, now));
        assert!(table.admit(&key, 0, now));
        assert!(table.admit(&key, -5, now));
    }

    #[test]
    fn window_blocks_until_elapsed() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let start = Utc::now();

        assert!(table.admit(&key, 10, start));
        assert!(!table.admit(&key, 10, start + Duration::seconds(5)));
        assert!(!table.admit(&key, 10, start + Duration::seconds(9)));
        assert!(table.admit(&key, 10, start + Duration::seconds(10)));
    }

    #[test]
    fn admission_resets_the_window() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let start = Utc::now();

        assert!(table.admit(&key, 10, start));
        assert!(table.admit(&key, 10, start + Duration::seconds(10)));
        // Window restarts from the second admission.
        assert!(!table.admit(&key, 10, start + Duration::seconds(19)));
    }

    #[test]
    fn rejection_does_not_reset_the_window() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let start = Utc::now();

        assert!(table.admit(&key, 10, start));
        assert!(!table.admit(&key, 10, start + Duration::seconds(9)));
        assert!(table.admit(&key, 10, start + Duration::seconds(10)));
    }

    #[test]
    fn triggers_are_gated_independently() {
        let table = CooldownTable::new();
        let workflow_id = WorkflowId::new();
        let key_a = CooldownKey::new(workflow_id, "t1");
        let key_b = CooldownKey::new(workflow_id, "t2");
        let now = Utc::now();

        assert!(table.admit(&key_a, 10, now));
        assert!(table.admit(&key_b, 10, now));
    }

    #[test]
    fn warming_blocks_the_first_window() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let start = Utc::now();

        table.warm(key.clone(), start);
        assert!(!table.admit(&key, 10, start + Duration::seconds(1)));
        assert!(table.admit(&key, 10, start + Duration::seconds(10)));
    }

    #[test]
    fn warming_never_overwrites_an_existing_entry() {
        let table = CooldownTable::new();
        let key = CooldownKey::new(WorkflowId::new(), "t1");
        let start = Utc::now();

        assert!(table.admit(&key, 10, start));
        table.warm(key.clone(), start + Duration::seconds(9));
        // The original admission time still governs the window.
        assert!(table.admit(&key, 10, start + Duration::seconds(10)));
    }
}
