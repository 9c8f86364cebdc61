//! Conversions between the bot's fixed civil timezone and the UTC epoch
//! seconds used everywhere in storage. The deployment is single-locale
//! (Buenos Aires, UTC-3); changing `LOCAL_OFFSET_HOURS` is the one place a
//! future multi-region build would touch.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};

use crate::error::RemembotError;
use crate::Result;

pub const LOCAL_OFFSET_HOURS: i32 = -3;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn local_offset() -> FixedOffset {
    // -3h is always a valid offset.
    FixedOffset::east_opt(LOCAL_OFFSET_HOURS * 3600).unwrap_or_else(|| Utc.fix())
}

pub fn now_utc() -> i64 {
    Utc::now().timestamp()
}

/// Current civil time in the bot's locale, without timezone info.
pub fn now_local() -> NaiveDateTime {
    Utc::now().with_timezone(&local_offset()).naive_local()
}

/// Interprets a naive civil time as local and returns UTC epoch seconds.
pub fn local_to_utc(local: NaiveDateTime) -> Result<i64> {
    local
        .and_local_timezone(local_offset())
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| RemembotError::Validation(format!("ambiguous local time: {local}")))
}

/// Converts stored UTC epoch seconds back to local civil time.
pub fn utc_to_local(ts: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_default()
        .with_timezone(&local_offset())
        .naive_local()
}

pub fn format_local(ts: i64) -> String {
    utc_to_local(ts).format(DISPLAY_FORMAT).to_string()
}

pub fn format_local_now() -> String {
    now_local().format(DISPLAY_FORMAT).to_string()
}

/// Parses a user-facing `YYYY-MM-DD` + `HH:MM:SS` pair (local civil time)
/// into UTC epoch seconds ready for storage.
pub fn parse_local(date: &str, time: &str) -> Result<i64> {
    let combined = format!("{date} {time}");
    let local = NaiveDateTime::parse_from_str(&combined, DISPLAY_FORMAT)
        .map_err(|e| RemembotError::Validation(format!("invalid date/time '{combined}': {e}")))?;
    local_to_utc(local)
}
