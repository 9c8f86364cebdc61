//! Gemini-backed implementations of the intent extractor and the flavor
//! generator. Both go through `generateContent` with a strict-JSON prompt;
//! the response parser tolerates fenced code blocks and surrounding prose
//! since models do not always obey "JSON only".

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::clock;
use crate::error::{RemembotError, Result};
use crate::interfaces::services::{
    ExtractedReminder, Extraction, FlavorGenerator, IntentExtractor,
};
use crate::recurrence::Recurrence;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, GEMINI_API_BASE)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RemembotError::Http(format!("gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemembotError::Http(format!(
                "gemini returned {status}: {body}"
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| RemembotError::Serialization(e.to_string()))?;
        data.get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.get("parts"))
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .map(|text| text.to_string())
            .ok_or_else(|| {
                RemembotError::Serialization("gemini response carried no text part".to_string())
            })
    }

    fn extraction_prompt(&self, text: &str, now_local: &str) -> String {
        format!(
            r#"You are an assistant that schedules reminders.
The current local date and time is: {now_local}
User text: "{text}"

Respond with a JSON object (or a JSON array when the text contains several
reminders) with EXACTLY these fields per reminder:

- task_text: full task description (string)
- date: date of the first occurrence, 'YYYY-MM-DD' (string)
- time: time of day, 'HH:MM:SS', or the string "unspecified" when the user
  gave no time (string)
- original_context: the user's complete original wording (string)
- recurrence: null, or an object with:
    - kind: one of 'minutely', 'hourly', 'daily', 'weekly', 'monthly', 'yearly'
    - interval: positive integer (every 2 weeks -> 2)
    - days_of_week: array of integers 0-6 (0 = Monday), weekly only, else null
    - end_at: cutoff 'YYYY-MM-DD HH:MM:SS' or null

If you cannot understand the request, respond with:
{{"error": "<short clarification question for the user>"}}

Respond ONLY with the JSON, no extra formatting or commentary."#
        )
    }

    fn flavor_prompt(&self, task: &str, context: Option<&str>) -> String {
        let context_line = context
            .map(|c| format!("Original user wording: \"{c}\""))
            .unwrap_or_default();
        format!(
            r#"You are a friendly, slightly cheeky assistant. Write ONE very short
line (20 words max) of encouraging humor to accompany a reminder.

Reminder: "{task}"
{context_line}

Rules: stay strictly on the reminder's topic, use a fitting emoji or two,
never use quotation marks, reply with the line only."#
        )
    }

    fn parse_extraction(raw: &str) -> Result<Extraction> {
        let Some(block) = extract_json_block(raw) else {
            return Err(RemembotError::Serialization(format!(
                "no JSON found in extractor reply: {raw}"
            )));
        };
        let value: Value = serde_json::from_str(block)
            .map_err(|e| RemembotError::Serialization(format!("bad extractor JSON: {e}")))?;

        if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
            return Ok(Extraction::Ambiguous(error.to_string()));
        }

        let wires: Vec<WireReminder> = if value.is_array() {
            serde_json::from_value(value)
                .map_err(|e| RemembotError::Serialization(format!("bad reminder list: {e}")))?
        } else {
            vec![serde_json::from_value(value)
                .map_err(|e| RemembotError::Serialization(format!("bad reminder object: {e}")))?]
        };

        let mut reminders = Vec::with_capacity(wires.len());
        for wire in wires {
            match wire.into_extracted() {
                Ok(reminder) => reminders.push(reminder),
                // The model produced something outside the contract (for
                // instance an unknown recurrence kind): ask the user to
                // rephrase instead of storing a guess.
                Err(err) => return Ok(Extraction::Ambiguous(format!("{err}"))),
            }
        }
        if reminders.is_empty() {
            return Ok(Extraction::Ambiguous(
                "I could not find a reminder in that, can you be more specific?".to_string(),
            ));
        }
        Ok(Extraction::Reminders(reminders))
    }
}

#[async_trait]
impl IntentExtractor for GeminiClient {
    async fn extract(&self, text: &str, now_local: &str) -> Result<Extraction> {
        let prompt = self.extraction_prompt(text, now_local);
        let reply = self.generate(&prompt).await?;
        tracing::debug!(reply = %reply, "extractor reply");
        Self::parse_extraction(&reply)
    }
}

#[async_trait]
impl FlavorGenerator for GeminiClient {
    async fn flavor_line(&self, task: &str, context: Option<&str>) -> Result<String> {
        let prompt = self.flavor_prompt(task, context);
        let line = self.generate(&prompt).await?;
        Ok(line.trim().trim_matches(&['"', '\''][..]).to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WireReminder {
    task_text: String,
    date: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    original_context: Option<String>,
    #[serde(default)]
    recurrence: Option<WireRecurrence>,
}

#[derive(Debug, Deserialize)]
struct WireRecurrence {
    kind: String,
    #[serde(default = "default_interval")]
    interval: u32,
    #[serde(default)]
    days_of_week: Option<Vec<u8>>,
    #[serde(default)]
    end_at: Option<String>,
}

fn default_interval() -> u32 {
    1
}

impl WireReminder {
    fn into_extracted(self) -> Result<ExtractedReminder> {
        let time = self
            .time
            .filter(|t| !t.trim().is_empty() && t != "unspecified");

        let recurrence = match self.recurrence {
            Some(wire) => {
                let end_at = match wire.end_at.as_deref().map(split_datetime) {
                    Some(Some((date, time))) => Some(clock::parse_local(date, time)?),
                    Some(None) => {
                        return Err(RemembotError::Validation(
                            "recurrence end date was not in 'YYYY-MM-DD HH:MM:SS' form"
                                .to_string(),
                        ))
                    }
                    None => None,
                };
                Some(Recurrence {
                    kind: wire.kind.parse()?,
                    interval: wire.interval,
                    days_of_week: wire.days_of_week,
                    end_at,
                })
            }
            None => None,
        };

        Ok(ExtractedReminder {
            task_text: self.task_text,
            date: self.date,
            time,
            original_context: self.original_context,
            recurrence,
        })
    }
}

fn split_datetime(raw: &str) -> Option<(&str, &str)> {
    raw.trim().split_once([' ', 'T'])
}

/// Finds the JSON payload inside a possibly fenced / chatty model reply.
fn extract_json_block(text: &str) -> Option<&str> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .map(|t| t.strip_suffix("```").unwrap_or(t))
        .unwrap_or(text)
        .trim();

    let (open, close) = match (text.find('{'), text.find('[')) {
        (Some(obj), Some(arr)) if arr < obj => ('[', ']'),
        (None, Some(_)) => ('[', ']'),
        _ => ('{', '}'),
    };
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
