//! Signal extractors: three independent producers with one output shape.
//!
//! Each extractor consumes one source's raw records and emits typed
//! `Interaction`s. Extractors never fail past their boundary — a malformed
//! record becomes a warning and the run continues; a missing source is
//! simply "no interactions". The only error they surface is `Cancelled`,
//! checked between records.

mod calendar;
mod chat;
mod files;

pub use calendar::extract_calendar;
pub use chat::extract_chat;
pub use files::extract_file_shares;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{EngineError, Warning};
use crate::identity::{normalize_name, IdentityResolver};
use crate::payload::UserIdentity;
use crate::types::{Interaction, PersonId, Source, WeightInputs};

/// Shared state threaded through all three extractors.
pub struct ExtractContext<'a> {
    pub resolver: &'a mut IdentityResolver,
    pub user: &'a UserIdentity,
    pub now: DateTime<Utc>,
    /// Lower bound of the lookback window; older records are out of scope.
    pub window_start: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ExtractContext<'_> {
    /// Deadline check between records. On deadline the whole extraction is
    /// discarded — no partial result is ever emitted.
    pub fn check_deadline(&self, stage: &'static str) -> Result<(), EngineError> {
        match self.deadline {
            Some(deadline) if Utc::now() > deadline => Err(EngineError::Cancelled(stage)),
            _ => Ok(()),
        }
    }

    /// True when the timestamp falls inside the lookback window. Future
    /// timestamps (today's later meetings) are kept; decay clamps their
    /// age to zero.
    pub fn in_window(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.window_start
    }
}

/// What one extractor produced, with enough bookkeeping for the
/// source-degradation rule.
#[derive(Debug, Default)]
pub struct ExtractorOutput {
    pub interactions: Vec<Interaction>,
    pub warnings: Vec<Warning>,
    /// Structurally unreadable records.
    pub invalid: usize,
    /// All records seen, valid or not.
    pub total: usize,
}

/// Collapse near-identical interactions: same counterparty, same calendar
/// day, same (normalised) subject. Chat interactions carry no subject, so
/// they key on the thread id instead — two distinct threads with the same
/// person on one day are two interactions, not duplicates. The richest
/// record survives and carries the duplicate count.
pub fn dedup_interactions(items: Vec<Interaction>) -> Vec<Interaction> {
    let mut kept: Vec<Interaction> = Vec::with_capacity(items.len());
    let mut index: HashMap<(PersonId, NaiveDate, Option<String>), usize> = HashMap::new();

    for item in items {
        let discriminant = match item.source {
            Source::Chat => Some(item.raw_ref.clone()),
            _ => item.subject_hint.as_deref().map(normalize_name),
        };
        let key = (item.person, item.timestamp.date_naive(), discriminant);
        match index.get(&key) {
            Some(&slot) => {
                if richness(&item) > richness(&kept[slot]) {
                    let mut item = item;
                    item.duplicate_count += kept[slot].duplicate_count + 1;
                    kept[slot] = item;
                } else {
                    kept[slot].duplicate_count += item.duplicate_count + 1;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(item);
            }
        }
    }
    kept
}

/// Ad-hoc richness metric for duplicate resolution: prefer the record
/// carrying more information.
fn richness(item: &Interaction) -> f64 {
    match &item.weight_inputs {
        WeightInputs::Calendar {
            duration_minutes,
            attendee_count,
            ..
        } => *duration_minutes as f64 + *attendee_count as f64,
        WeightInputs::Chat {
            messages_outbound,
            messages_inbound,
            ..
        } => (*messages_outbound + *messages_inbound) as f64,
        WeightInputs::FileShare { audience, .. } => match audience {
            crate::types::ShareAudience::Direct => 3.0,
            crate::types::ShareAudience::SmallGroup => 2.0,
            crate::types::ShareAudience::Broadcast => 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, ResponseStatus};
    use chrono::{Datelike, TimeZone};

    fn event(day: u32, hour: u32, subject: &str, duration: u32) -> Interaction {
        Interaction {
            person: PersonId(0),
            source: Source::Calendar,
            timestamp: Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap(),
            direction: Direction::Inbound,
            weight_inputs: WeightInputs::Calendar {
                attendee_count: 2,
                is_organizer: false,
                response: ResponseStatus::Accepted,
                is_recurring: false,
                duration_minutes: duration,
            },
            subject_hint: Some(subject.to_string()),
            raw_ref: format!("evt-{day}-{hour}"),
            duplicate_count: 0,
            context: None,
        }
    }

    #[test]
    fn test_dedup_same_day_same_subject() {
        let out = dedup_interactions(vec![
            event(1, 9, "Sync", 30),
            event(1, 14, "sync", 60),
            event(2, 9, "Sync", 30),
        ]);
        assert_eq!(out.len(), 2);
        let merged = out
            .iter()
            .find(|i| i.timestamp.date_naive().day() == 1)
            .unwrap();
        assert_eq!(merged.duplicate_count, 1);
        // The richer (longer) record survived.
        assert!(matches!(
            merged.weight_inputs,
            WeightInputs::Calendar {
                duration_minutes: 60,
                ..
            }
        ));
    }

    #[test]
    fn test_dedup_keeps_distinct_subjects() {
        let out = dedup_interactions(vec![event(1, 9, "Sync", 30), event(1, 10, "Design", 30)]);
        assert_eq!(out.len(), 2);
    }

    fn chat(hour: u32, thread: &str, messages: u32) -> Interaction {
        Interaction {
            person: PersonId(0),
            source: Source::Chat,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).unwrap(),
            direction: Direction::Outbound,
            weight_inputs: WeightInputs::Chat {
                messages_outbound: messages,
                messages_inbound: 0,
                is_one_on_one: true,
                has_attachments: false,
            },
            subject_hint: None,
            raw_ref: thread.to_string(),
            duplicate_count: 0,
            context: None,
        }
    }

    #[test]
    fn test_dedup_keeps_distinct_chat_threads_same_day() {
        // No subject on chat; distinct threads must not collapse.
        let out = dedup_interactions(vec![chat(9, "t1", 4), chat(14, "t2", 2)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|i| i.duplicate_count == 0));
    }

    #[test]
    fn test_dedup_merges_same_chat_thread_same_day() {
        let out = dedup_interactions(vec![chat(9, "t1", 4), chat(14, "t1", 2)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].duplicate_count, 1);
    }

    #[test]
    fn test_deadline_in_past_cancels() {
        let mut resolver = IdentityResolver::new(None, "me@x.com");
        let user = UserIdentity {
            id: None,
            email: "me@x.com".into(),
            display_name: None,
        };
        let now = Utc::now();
        let ctx = ExtractContext {
            resolver: &mut resolver,
            user: &user,
            now,
            window_start: now - chrono::Duration::days(90),
            deadline: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(matches!(
            ctx.check_deadline("test"),
            Err(EngineError::Cancelled(_))
        ));
    }
}
