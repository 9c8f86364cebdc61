//! Anti-flood admission: batch-level caps checked first (all-or-nothing),
//! then per-item validation, then creation of whatever survived.

use crate::error::Result;
use crate::store::{NewReminder, ReminderStore};

pub const DEFAULT_MAX_ACTIVE: i64 = 200;
pub const DEFAULT_MAX_PER_MINUTE: i64 = 20;

const RATE_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    pub max_active: i64,
    pub max_per_minute: i64,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE,
            max_per_minute: DEFAULT_MAX_PER_MINUTE,
        }
    }
}

/// Result for one candidate that made it past the batch-level caps.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Created { id: i32, task_text: String },
    Rejected { task_text: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// The whole batch was refused before any item was looked at.
    BatchRejected(String),
    /// Per-item verdicts, in batch order.
    Processed(Vec<ItemOutcome>),
}

pub struct AdmissionPolicy {
    limits: AdmissionLimits,
}

impl AdmissionPolicy {
    pub fn new(limits: AdmissionLimits) -> Self {
        Self { limits }
    }

    /// Admits a parsed batch for one owner. Batch caps reject everything at
    /// once; item-level problems (bad recurrence interval, past due time for
    /// a one-shot) reject only the offending item, with a reason the caller
    /// can show verbatim.
    pub async fn admit(
        &self,
        store: &ReminderStore,
        owner: &str,
        batch: Vec<NewReminder>,
        now: i64,
    ) -> Result<AdmissionOutcome> {
        let active = store.count_active(owner).await?;
        if active >= self.limits.max_active {
            return Ok(AdmissionOutcome::BatchRejected(format!(
                "you already have {active} active reminders (limit {})",
                self.limits.max_active
            )));
        }

        let recent = store
            .count_created_since(owner, RATE_WINDOW_SECS, now)
            .await?;
        if recent >= self.limits.max_per_minute {
            return Ok(AdmissionOutcome::BatchRejected(format!(
                "too many reminders created in the last minute ({recent}), slow down"
            )));
        }

        if active + batch.len() as i64 > self.limits.max_active {
            return Ok(AdmissionOutcome::BatchRejected(format!(
                "this batch of {} would exceed your limit of {} active reminders",
                batch.len(),
                self.limits.max_active
            )));
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for candidate in batch {
            if let Some(reason) = validate_item(&candidate, now) {
                tracing::debug!(owner, task = %candidate.task_text, %reason, "reminder rejected");
                outcomes.push(ItemOutcome::Rejected {
                    task_text: candidate.task_text,
                    reason,
                });
                continue;
            }
            let id = store.create(&candidate, now).await?;
            tracing::info!(owner, id, task = %candidate.task_text, "reminder created");
            outcomes.push(ItemOutcome::Created {
                id,
                task_text: candidate.task_text,
            });
        }
        Ok(AdmissionOutcome::Processed(outcomes))
    }
}

fn validate_item(candidate: &NewReminder, now: i64) -> Option<String> {
    match &candidate.recurrence {
        Some(recurrence) => recurrence.validate().err(),
        None if candidate.due_at <= now => {
            Some("that date and time already passed".to_string())
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::{Recurrence, RecurrenceKind};
    use crate::store::ReminderStore;

    async fn temp_store() -> (tempfile::TempDir, ReminderStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("reminders.db");
        let store = ReminderStore::new(db_path.to_string_lossy())
            .await
            .expect("store");
        (dir, store)
    }

    fn candidate(task: &str, due_at: i64) -> NewReminder {
        NewReminder {
            owner: "u1".to_string(),
            task_text: task.to_string(),
            due_at,
            original_context: None,
            recurrence: None,
        }
    }

    async fn fill_active(store: &ReminderStore, owner: &str, count: usize, now: i64) {
        for n in 0..count {
            store
                .create(&candidate(&format!("task {n}"), now + 86_400), now - 3_600)
                .await
                .expect("seed create");
        }
        assert_eq!(
            store.count_active(owner).await.expect("seed count"),
            count as i64
        );
    }

    #[tokio::test]
    async fn near_capacity_batch_arithmetic() {
        let (_dir, store) = temp_store().await;
        let now = 1_750_000_000_i64;
        fill_active(&store, "u1", 198, now).await;

        let policy = AdmissionPolicy::new(AdmissionLimits {
            max_active: 200,
            max_per_minute: 1_000,
        });

        let five: Vec<NewReminder> = (0..5)
            .map(|n| candidate(&format!("batch {n}"), now + 600))
            .collect();
        match policy
            .admit(&store, "u1", five, now)
            .await
            .expect("admit five")
        {
            AdmissionOutcome::BatchRejected(reason) => {
                assert!(reason.contains("exceed"), "reason: {reason}");
            }
            AdmissionOutcome::Processed(_) => panic!("198 + 5 > 200 must reject the whole batch"),
        }
        assert_eq!(store.count_active("u1").await.expect("unchanged"), 198);

        let two: Vec<NewReminder> = (0..2)
            .map(|n| candidate(&format!("batch {n}"), now + 600))
            .collect();
        match policy
            .admit(&store, "u1", two, now)
            .await
            .expect("admit two")
        {
            AdmissionOutcome::Processed(outcomes) => {
                assert_eq!(outcomes.len(), 2);
                assert!(outcomes
                    .iter()
                    .all(|o| matches!(o, ItemOutcome::Created { .. })));
            }
            AdmissionOutcome::BatchRejected(reason) => {
                panic!("198 + 2 fits under 200, rejected with: {reason}")
            }
        }
        assert_eq!(store.count_active("u1").await.expect("grew"), 200);
    }

    #[tokio::test]
    async fn full_owner_rejects_before_looking_at_items() {
        let (_dir, store) = temp_store().await;
        let now = 1_750_000_000_i64;
        fill_active(&store, "u1", 3, now).await;

        let policy = AdmissionPolicy::new(AdmissionLimits {
            max_active: 3,
            max_per_minute: 1_000,
        });
        let outcome = policy
            .admit(&store, "u1", vec![candidate("one more", now + 600)], now)
            .await
            .expect("admit");
        assert!(matches!(outcome, AdmissionOutcome::BatchRejected(_)));
    }

    #[tokio::test]
    async fn creation_rate_is_capped_per_minute() {
        let (_dir, store) = temp_store().await;
        let now = 1_750_000_000_i64;
        // Two rows created 10s ago land inside the one-minute window.
        for n in 0..2 {
            store
                .create(&candidate(&format!("recent {n}"), now + 600), now - 10)
                .await
                .expect("seed");
        }

        let policy = AdmissionPolicy::new(AdmissionLimits {
            max_active: 100,
            max_per_minute: 2,
        });
        let outcome = policy
            .admit(&store, "u1", vec![candidate("burst", now + 600)], now)
            .await
            .expect("admit");
        match outcome {
            AdmissionOutcome::BatchRejected(reason) => {
                assert!(reason.contains("last minute"), "reason: {reason}")
            }
            AdmissionOutcome::Processed(_) => panic!("rate cap must reject"),
        }
    }

    #[tokio::test]
    async fn bad_items_are_rejected_individually() {
        let (_dir, store) = temp_store().await;
        let now = 1_750_000_000_i64;
        let policy = AdmissionPolicy::new(AdmissionLimits::default());

        let mut too_often = candidate("blink", now + 600);
        too_often.recurrence = Some(Recurrence::new(RecurrenceKind::Minutely, 2_000));

        let batch = vec![
            candidate("fine", now + 600),
            too_often,
            candidate("yesterday", now - 600),
        ];
        let outcome = policy
            .admit(&store, "u1", batch, now)
            .await
            .expect("admit");

        let AdmissionOutcome::Processed(outcomes) = outcome else {
            panic!("batch caps were not hit");
        };
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ItemOutcome::Created { .. }));
        match &outcomes[1] {
            ItemOutcome::Rejected { reason, .. } => assert!(reason.contains("too long")),
            other => panic!("expected interval rejection, got {other:?}"),
        }
        match &outcomes[2] {
            ItemOutcome::Rejected { reason, .. } => assert!(reason.contains("passed")),
            other => panic!("expected past-due rejection, got {other:?}"),
        }

        assert_eq!(store.count_active("u1").await.expect("count"), 1);
    }
}
