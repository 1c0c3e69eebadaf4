//! Typed input payloads.
//!
//! The engine consumes already-fetched JSON documents — it never talks to
//! the upstream provider. Each source arrives as a sequence of loosely
//! structured records; individual records are parsed into the typed shapes
//! here one at a time, so a single malformed record degrades to a warning
//! instead of failing the source.
//!
//! Unknown upstream fields are not inspected; the record id flows through
//! as the interaction's opaque `raw_ref`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;

/// The current user, as the caller knows them. Needed for the self-filter
/// and the organiser/outbound checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// All inputs for one run. A `None` source means "no interactions from
/// that source" — never an error.
#[derive(Debug, Clone)]
pub struct EnginePayloads {
    pub user: UserIdentity,
    pub calendar: Option<Vec<Value>>,
    pub chat: Option<Vec<Value>>,
    pub file_shares: Option<Vec<Value>>,
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

/// A dateTime + timeZone pair, as calendar providers emit them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatusRecord {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventRecord {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub start: DateTimeTimeZone,
    #[serde(default)]
    pub end: Option<DateTimeTimeZone>,
    #[serde(default)]
    pub organizer: Option<Recipient>,
    #[serde(default)]
    pub attendees: Vec<Recipient>,
    #[serde(default)]
    pub is_cancelled: bool,
    /// "occurrence" / "seriesMaster" etc. — anything series-flavoured
    /// counts as recurring.
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub series_master_id: Option<String>,
    /// The current user's own response to the invite.
    #[serde(default)]
    pub response_status: Option<ResponseStatusRecord>,
}

impl CalendarEventRecord {
    pub fn is_recurring(&self) -> bool {
        if self.series_master_id.is_some() {
            return true;
        }
        matches!(
            self.event_type.as_deref(),
            Some("occurrence") | Some("seriesMaster") | Some("exception")
        )
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMemberRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Per-thread chat summary. Metadata only — the engine never sees
/// message bodies.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThreadRecord {
    pub thread_id: String,
    /// "oneOnOne" or "group".
    #[serde(default)]
    pub chat_type: Option<String>,
    #[serde(default)]
    pub members: Vec<ChatMemberRecord>,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default)]
    pub sent_by_user_count: u32,
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub has_attachments: bool,
}

impl ChatThreadRecord {
    pub fn is_one_on_one(&self) -> bool {
        self.chat_type.as_deref() == Some("oneOnOne")
    }
}

// ---------------------------------------------------------------------------
// File shares
// ---------------------------------------------------------------------------

/// One outbound share event. Inbound shares must not be included; if a
/// record is marked inbound anyway it is ignored without a warning.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShareRecord {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub shared_at: DateTime<Utc>,
    #[serde(default)]
    pub shared_with: Vec<ChatMemberRecord>,
    #[serde(default)]
    pub audience_size: Option<u32>,
    /// "direct", "small_group", or "broadcast".
    #[serde(default)]
    pub share_type: Option<String>,
    #[serde(default)]
    pub inbound: bool,
}

// ---------------------------------------------------------------------------
// Timestamp normalisation
// ---------------------------------------------------------------------------

/// Normalise a dateTime + timeZone pair to UTC.
///
/// Accepts offset-bearing ISO-8601 directly; a naive dateTime is resolved
/// through its IANA zone name. Unresolvable zones fall back to UTC —
/// downstream classification and decay never see local time.
pub fn parse_event_time(dt: &DateTimeTimeZone) -> Option<DateTime<Utc>> {
    let raw = dt.date_time.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    match dt.time_zone.as_deref().and_then(|z| Tz::from_str(z).ok()) {
        Some(tz) => naive
            .and_local_timezone(tz)
            .earliest()
            .map(|local| local.with_timezone(&Utc)),
        None => Some(DateTime::from_naive_utc_and_offset(naive, Utc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dtz(date_time: &str, zone: Option<&str>) -> DateTimeTimeZone {
        DateTimeTimeZone {
            date_time: date_time.to_string(),
            time_zone: zone.map(|z| z.to_string()),
        }
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let t = parse_event_time(&dtz("2026-08-12T09:00:00-07:00", None)).unwrap();
        assert_eq!(t.to_rfc3339(), "2026-08-12T16:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_with_iana_zone() {
        let t = parse_event_time(&dtz("2026-08-12T09:00:00.0000000", Some("America/Los_Angeles")))
            .unwrap();
        assert_eq!(t.to_rfc3339(), "2026-08-12T16:00:00+00:00");
    }

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        let t = parse_event_time(&dtz("2026-08-12T09:00:00", Some("Pacific Standard Time")))
            .unwrap();
        assert_eq!(t.to_rfc3339(), "2026-08-12T09:00:00+00:00");
    }

    #[test]
    fn test_garbage_datetime_is_none() {
        assert!(parse_event_time(&dtz("yesterday-ish", None)).is_none());
    }

    #[test]
    fn test_calendar_record_from_json() {
        let json = serde_json::json!({
            "id": "evt-1",
            "subject": "Roadmap sync",
            "start": {"dateTime": "2026-08-12T09:00:00", "timeZone": "UTC"},
            "organizer": {"emailAddress": {"name": "Ana", "address": "ana@x.com"}},
            "attendees": [
                {"emailAddress": {"name": "Me", "address": "me@x.com"}},
                {"emailAddress": {"name": "Ana", "address": "ana@x.com"}}
            ],
            "isCancelled": false,
            "type": "occurrence",
            "futureField": {"ignored": true}
        });
        let rec: CalendarEventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(rec.attendees.len(), 2);
        assert!(rec.is_recurring());
        assert!(!rec.is_cancelled);
    }

    #[test]
    fn test_chat_record_defaults() {
        let json = serde_json::json!({
            "threadId": "t1",
            "chatType": "oneOnOne",
            "lastMessageAt": "2026-08-12T10:00:00Z"
        });
        let rec: ChatThreadRecord = serde_json::from_value(json).unwrap();
        assert!(rec.is_one_on_one());
        assert_eq!(rec.message_count, 0);
        assert!(!rec.has_attachments);
    }
}
