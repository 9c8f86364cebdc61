//! The poll-detect-deliver-reschedule loop.
//!
//! One `DeliveryJob` tick reads the due reminders, delivers each through the
//! channel, then advances recurring ones in place or marks one-shots
//! delivered. A send failure leaves the row untouched so the next tick
//! retries; a flavor-generator failure degrades to a fixed line; and no
//! per-item error ever aborts the rest of the tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock;
use crate::error::Result;
use crate::interfaces::scheduler::ScheduledJob;
use crate::interfaces::services::{DeliveryChannel, FlavorGenerator};
use crate::store::{DueReminder, ReminderStore};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

const FALLBACK_FLAVOR: &str = "⏰ It's time! You've got this 💪";
const CONTEXT_EXCERPT_MAX: usize = 100;

pub struct DeliveryJob {
    store: Arc<ReminderStore>,
    channel: Arc<dyn DeliveryChannel>,
    flavor: Arc<dyn FlavorGenerator>,
    interval: Duration,
}

impl DeliveryJob {
    pub fn new(
        store: Arc<ReminderStore>,
        channel: Arc<dyn DeliveryChannel>,
        flavor: Arc<dyn FlavorGenerator>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            channel,
            flavor,
            interval,
        }
    }

    pub async fn tick(&self, now: i64) -> Result<()> {
        let due = self.store.get_due(now).await?;
        if due.is_empty() {
            return Ok(());
        }
        tracing::info!(count = due.len(), "due reminders found");

        for reminder in &due {
            if let Err(err) = self.process_one(reminder, now).await {
                tracing::error!(
                    id = reminder.id,
                    owner = %reminder.owner,
                    error = %err,
                    "failed to process due reminder"
                );
            }
        }
        Ok(())
    }

    async fn process_one(&self, reminder: &DueReminder, now: i64) -> Result<()> {
        // Snapshot the recurrence before delivering so the reschedule step
        // does not depend on reading the row again mid-flight.
        let recurrence = self.store.recurrence_of(reminder.id).await?;

        let text = self.compose_message(reminder).await;
        // An undelivered reminder stays due and unadvanced; the next tick
        // retries it.
        self.channel.send(&reminder.owner, &text).await?;

        match recurrence {
            Some(recurrence) => {
                let advanced = self
                    .store
                    .advance_or_retire(reminder.id, &recurrence, now)
                    .await?;
                if advanced {
                    tracing::info!(id = reminder.id, "recurring reminder rescheduled");
                } else {
                    tracing::info!(id = reminder.id, "recurring reminder reached its end date");
                }
            }
            None => {
                self.store.mark_delivered(&[reminder.id], now).await?;
                tracing::info!(id = reminder.id, "one-shot reminder delivered");
            }
        }
        Ok(())
    }

    async fn compose_message(&self, reminder: &DueReminder) -> String {
        let mut text = format!("🔔 REMINDER 🔔\n\n📌 {}\n", capitalize(&reminder.task_text));

        if let Some(context) = reminder
            .original_context
            .as_deref()
            .and_then(|context| relevant_context(context, &reminder.task_text))
        {
            text.push_str(&format!("💬 {context}\n"));
        }

        let flavor = match self
            .flavor
            .flavor_line(&reminder.task_text, reminder.original_context.as_deref())
            .await
        {
            Ok(line) if !line.trim().is_empty() => line,
            Ok(_) => FALLBACK_FLAVOR.to_string(),
            Err(err) => {
                tracing::warn!(id = reminder.id, error = %err, "flavor generator failed, using fallback");
                FALLBACK_FLAVOR.to_string()
            }
        };
        text.push('\n');
        text.push_str(&flavor);
        text
    }
}

#[async_trait]
impl ScheduledJob for DeliveryJob {
    fn name(&self) -> &str {
        "reminder-delivery"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        self.tick(clock::now_utc()).await
    }
}

/// Picks the part of the user's original phrasing that adds information
/// beyond the task text, anchored at a connective ("for the exam next week"
/// out of "study biology for the exam next week"). Capped at 100 chars.
fn relevant_context(original: &str, task: &str) -> Option<String> {
    let context = original.trim();
    if context.is_empty() || context.eq_ignore_ascii_case(task.trim()) {
        return None;
    }

    let lowered = context.to_lowercase();
    for keyword in ["for the", "for", "about", "before", "after", "with", "at the"] {
        if let Some(idx) = lowered.find(&format!(" {keyword} ")) {
            // Indexing into the original text is only safe while lowering
            // preserved byte offsets.
            if let Some(fragment) = context.get(idx + 1..) {
                return Some(truncate_excerpt(fragment.trim()));
            }
        }
    }

    Some(format!("Context: {}", truncate_excerpt(context)))
}

fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= CONTEXT_EXCERPT_MAX {
        return text.to_string();
    }
    let cut: String = text.chars().take(CONTEXT_EXCERPT_MAX - 3).collect();
    format!("{cut}...")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
