//! Seams to the external collaborators: the chat channel reminders are
//! delivered through, the flavor-line generator, and the natural-language
//! intent extractor. The store and the delivery loop only ever see these
//! traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::recurrence::Recurrence;

/// Outbound message transport (`send` only; receiving is the conversation
/// layer's problem).
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, owner: &str, text: &str) -> Result<()>;
}

/// Produces the short auxiliary line appended to a delivered reminder. A
/// failure here must never block delivery; callers fall back to a fixed
/// neutral string.
#[async_trait]
pub trait FlavorGenerator: Send + Sync {
    async fn flavor_line(&self, task: &str, context: Option<&str>) -> Result<String>;
}

/// One candidate reminder extracted from free text. Times are local civil
/// strings; `time` is `None` when the user never said when, in which case
/// the conversation layer must ask before anything reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedReminder {
    pub task_text: String,
    /// `YYYY-MM-DD`, local civil date of the first occurrence.
    pub date: String,
    /// `HH:MM:SS`, or `None` when unspecified.
    pub time: Option<String>,
    pub original_context: Option<String>,
    pub recurrence: Option<Recurrence>,
}

impl ExtractedReminder {
    pub fn is_fully_specified(&self) -> bool {
        self.time.is_some()
    }
}

/// Extractor verdict: either one-or-many candidates, or a clarification
/// request to bounce back to the user (no store mutation happens then).
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Reminders(Vec<ExtractedReminder>),
    Ambiguous(String),
}

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// `now_local` is the formatted current local time, given to the model
    /// so relative phrases ("tomorrow", "in two hours") resolve correctly.
    async fn extract(&self, text: &str, now_local: &str) -> Result<Extraction>;
}
