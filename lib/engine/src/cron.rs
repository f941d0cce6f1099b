//! Cron reconciler: materializes schedule triggers into timer tasks.
//!
//! Entries are keyed by `(workflow_id, trigger_node_id)`. On each reload the
//! expected entry set is diffed against the current one: new keys spawn a
//! timer, changed expressions drop and re-add, stale keys are removed. Each
//! timer computes the next fire time from its six-field seconds-precision
//! expression and sends a [`CronFire`] to the engine's dispatcher, which
//! applies the cooldown gate before starting a run.
//!
//! An invalid expression is logged once at reconcile time and its trigger
//! simply never fires; the workflow stays eligible for its other triggers.

use crate::snapshot::ScheduleEntry;
use chrono::Utc;
use cron::Schedule;
use homeflow_core::WorkflowId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A schedule trigger firing, handed to the engine's dispatcher.
#[derive(Debug, Clone)]
pub struct CronFire {
    /// The workflow to trigger.
    pub workflow_id: WorkflowId,
    /// The schedule trigger node that fired.
    pub trigger_node_id: String,
    /// The expression that fired, captured on the trigger event.
    pub cron: String,
    /// Cooldown for the gate, from the trigger config.
    pub cooldown_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    workflow_id: WorkflowId,
    trigger_node_id: String,
}

struct CronEntry {
    cron: String,
    /// Absent when the expression failed to parse.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CronEntry {
    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// The set of live schedule timers.
pub struct CronScheduler {
    fires: mpsc::Sender<CronFire>,
    entries: Mutex<HashMap<EntryKey, CronEntry>>,
}

impl CronScheduler {
    /// Creates a scheduler that reports firings on `fires`.
    #[must_use]
    pub fn new(fires: mpsc::Sender<CronFire>) -> Self {
        Self {
            fires,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles the live timers against the expected entry set.
    pub fn reconcile(&self, expected: &[ScheduleEntry]) {
        let expected_by_key: HashMap<EntryKey, &ScheduleEntry> = expected
            .iter()
            .map(|entry| {
                (
                    EntryKey {
                        workflow_id: entry.workflow_id,
                        trigger_node_id: entry.trigger_node_id.clone(),
                    },
                    entry,
                )
            })
            .collect();

        let mut entries = self.entries.lock().expect("cron lock poisoned");

        // Drop stale keys and keys whose expression changed.
        entries.retain(|key, entry| {
            let keep = expected_by_key
                .get(key)
                .is_some_and(|expected| expected.cron == entry.cron);
            if !keep {
                tracing::debug!(
                    workflow_id = %key.workflow_id,
                    trigger_node_id = %key.trigger_node_id,
                    "removing schedule timer"
                );
                entry.abort();
            }
            keep
        });

        for (key, expected) in expected_by_key {
            if !entries.contains_key(&key) {
                entries.insert(key, self.spawn_entry(expected));
            }
        }
    }

    fn spawn_entry(&self, entry: &ScheduleEntry) -> CronEntry {
        let schedule = match Schedule::from_str(&entry.cron) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!(
                    workflow_id = %entry.workflow_id,
                    trigger_node_id = %entry.trigger_node_id,
                    cron = %entry.cron,
                    error = %e,
                    "invalid cron expression, trigger will not fire"
                );
                return CronEntry {
                    cron: entry.cron.clone(),
                    task: None,
                };
            }
        };

        tracing::debug!(
            workflow_id = %entry.workflow_id,
            trigger_node_id = %entry.trigger_node_id,
            cron = %entry.cron,
            "adding schedule timer"
        );

        let fires = self.fires.clone();
        let fire = CronFire {
            workflow_id: entry.workflow_id,
            trigger_node_id: entry.trigger_node_id.clone(),
            cron: entry.cron.clone(),
            cooldown_sec: entry.cooldown_sec,
        };
        let task = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;
                if fires.send(fire.clone()).await.is_err() {
                    break;
                }
            }
        });

        CronEntry {
            cron: entry.cron.clone(),
            task: Some(task),
        }
    }

    /// Aborts every live timer.
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock().expect("cron lock poisoned");
        for entry in entries.values() {
            entry.abort();
        }
        entries.clear();
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(workflow_id: WorkflowId, node: &str, cron: &str) -> ScheduleEntry {
        ScheduleEntry {
            workflow_id,
            trigger_node_id: node.to_string(),
            cron: cron.to_string(),
            cooldown_sec: 0,
        }
    }

    fn crons(scheduler: &CronScheduler) -> Vec<(String, String, bool)> {
        let entries = scheduler.entries.lock().unwrap();
        let mut result: Vec<_> = entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.trigger_node_id.clone(),
                    entry.cron.clone(),
                    entry.task.is_some(),
                )
            })
            .collect();
        result.sort();
        result
    }

    #[tokio::test]
    async fn reconcile_adds_and_removes_entries() {
        let (tx, _rx) = mpsc::channel(8);
        let scheduler = CronScheduler::new(tx);
        let workflow_id = WorkflowId::new();

        scheduler.reconcile(&[
            entry(workflow_id, "s1", "0 0 * * * *"),
            entry(workflow_id, "s2", "0 30 * * * *"),
        ]);
        assert_eq!(crons(&scheduler).len(), 2);

        scheduler.reconcile(&[entry(workflow_id, "s2", "0 30 * * * *")]);
        let remaining = crons(&scheduler);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, "s2");
    }

    #[tokio::test]
    async fn expression_change_drops_and_readds() {
        let (tx, _rx) = mpsc::channel(8);
        let scheduler = CronScheduler::new(tx);
        let workflow_id = WorkflowId::new();

        scheduler.reconcile(&[entry(workflow_id, "s1", "0 0 * * * *")]);
        scheduler.reconcile(&[entry(workflow_id, "s1", "0 15 * * * *")]);

        let entries = crons(&scheduler);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "0 15 * * * *");
    }

    #[tokio::test]
    async fn invalid_expression_gets_no_timer() {
        let (tx, _rx) = mpsc::channel(8);
        let scheduler = CronScheduler::new(tx);
        let workflow_id = WorkflowId::new();

        scheduler.reconcile(&[entry(workflow_id, "s1", "every tuesday")]);

        let entries = crons(&scheduler);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].2, "invalid expression must not spawn a timer");
    }

    #[tokio::test(start_paused = true)]
    async fn every_second_schedule_fires() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = CronScheduler::new(tx);
        let workflow_id = WorkflowId::new();

        scheduler.reconcile(&[entry(workflow_id, "s1", "* * * * * *")]);

        let fire = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timer should fire")
            .expect("channel open");
        assert_eq!(fire.workflow_id, workflow_id);
        assert_eq!(fire.trigger_node_id, "s1");
        assert_eq!(fire.cron, "* * * * * *");
    }

    #[tokio::test]
    async fn shutdown_clears_entries() {
        let (tx, _rx) = mpsc::channel(8);
        let scheduler = CronScheduler::new(tx);
        scheduler.reconcile(&[entry(WorkflowId::new(), "s1", "0 0 * * * *")]);

        scheduler.shutdown();
        assert!(crons(&scheduler).is_empty());
    }
}
