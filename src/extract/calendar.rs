//! Calendar signal extraction.
//!
//! One `Interaction` per non-self attendee per event. Direction is
//! outbound when the current user organised the event. Cancelled events
//! are skipped; malformed records degrade to warnings.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{EngineError, Warning};
use crate::identity::{normalize_email, PersonRef};
use crate::payload::{parse_event_time, CalendarEventRecord, Recipient};
use crate::types::{Direction, Interaction, ResponseStatus, Source, WeightInputs};

use super::{dedup_interactions, ExtractContext, ExtractorOutput};

pub fn extract_calendar(
    records: &[Value],
    ctx: &mut ExtractContext<'_>,
) -> Result<ExtractorOutput, EngineError> {
    let mut out = ExtractorOutput::default();
    let mut interactions = Vec::new();

    for raw in records {
        ctx.check_deadline("calendar extraction")?;
        out.total += 1;

        let event: CalendarEventRecord = match serde_json::from_value(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                out.invalid += 1;
                out.warnings.push(Warning::invalid_record("calendar", e));
                continue;
            }
        };

        if event.is_cancelled {
            continue;
        }

        let Some(start) = parse_event_time(&event.start) else {
            out.invalid += 1;
            out.warnings.push(Warning::invalid_record(
                "calendar",
                format!("event {}: unreadable start time", event.id),
            ));
            continue;
        };
        if !ctx.in_window(start) {
            continue;
        }

        let duration_minutes = event
            .end
            .as_ref()
            .and_then(parse_event_time)
            .map(|end| (end - start).num_minutes().max(0) as u32)
            .unwrap_or(0);

        let organizer_email = event
            .organizer
            .as_ref()
            .and_then(|o| o.email_address.address.as_deref())
            .map(normalize_email);
        let user_email = normalize_email(&ctx.user.email);
        let is_organizer = organizer_email.as_deref() == Some(user_email.as_str());
        let direction = if is_organizer {
            Direction::Outbound
        } else {
            Direction::Inbound
        };
        let response = if is_organizer {
            ResponseStatus::Accepted
        } else {
            parse_response(&event)
        };

        let attendee_count = effective_attendee_count(&event, organizer_email.as_deref());

        // The organiser is a counterparty too when someone else invited
        // the user and is not already on the attendee list.
        let mut counterparties: Vec<&Recipient> = event.attendees.iter().collect();
        if let Some(organizer) = event.organizer.as_ref() {
            let listed = event.attendees.iter().any(|a| {
                a.email_address.address.as_deref().map(normalize_email)
                    == organizer.email_address.address.as_deref().map(normalize_email)
            });
            if !listed {
                counterparties.push(organizer);
            }
        }

        let mut seen: HashSet<_> = HashSet::new();
        for attendee in counterparties {
            let reference = PersonRef::new(
                None,
                attendee.email_address.address.clone(),
                attendee.email_address.name.clone(),
            );
            let Some(person) = ctx.resolver.resolve(&reference) else {
                continue; // self or empty
            };
            if !seen.insert(person) {
                continue;
            }
            interactions.push(Interaction {
                person,
                source: Source::Calendar,
                timestamp: start,
                direction,
                weight_inputs: WeightInputs::Calendar {
                    attendee_count,
                    is_organizer,
                    response,
                    is_recurring: event.is_recurring(),
                    duration_minutes,
                },
                subject_hint: event.subject.clone(),
                raw_ref: event.id.clone(),
                duplicate_count: 0,
                context: None,
            });
        }
    }

    out.interactions = dedup_interactions(interactions);
    Ok(out)
}

/// Attendee count for size bucketing, organiser included even when the
/// payload leaves them off the attendee list.
fn effective_attendee_count(event: &CalendarEventRecord, organizer_email: Option<&str>) -> u32 {
    let mut count = event.attendees.len() as u32;
    if let Some(organizer) = organizer_email {
        let listed = event.attendees.iter().any(|a| {
            a.email_address
                .address
                .as_deref()
                .map(normalize_email)
                .as_deref()
                == Some(organizer)
        });
        if !listed {
            count += 1;
        }
    }
    count
}

fn parse_response(event: &CalendarEventRecord) -> ResponseStatus {
    match event
        .response_status
        .as_ref()
        .and_then(|r| r.response.as_deref())
    {
        Some("accepted") | Some("organizer") => ResponseStatus::Accepted,
        Some("tentativelyAccepted") | Some("tentative") => ResponseStatus::Tentative,
        Some("declined") => ResponseStatus::Declined,
        _ => ResponseStatus::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityResolver;
    use crate::payload::UserIdentity;
    use chrono::{Duration, TimeZone, Utc};

    fn user() -> UserIdentity {
        UserIdentity {
            id: Some("me-id".into()),
            email: "me@x.com".into(),
            display_name: Some("Me".into()),
        }
    }

    fn run(records: Vec<Value>) -> (ExtractorOutput, IdentityResolver) {
        let mut resolver = IdentityResolver::new(Some("me-id"), "me@x.com");
        let user = user();
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap();
        let mut ctx = ExtractContext {
            resolver: &mut resolver,
            user: &user,
            now,
            window_start: now - Duration::days(90),
            deadline: None,
        };
        let out = extract_calendar(&records, &mut ctx).expect("no deadline");
        (out, resolver)
    }

    fn event_json(id: &str, subject: &str, attendees: &[(&str, &str)]) -> Value {
        serde_json::json!({
            "id": id,
            "subject": subject,
            "start": {"dateTime": "2026-08-18T09:00:00", "timeZone": "UTC"},
            "end": {"dateTime": "2026-08-18T09:30:00", "timeZone": "UTC"},
            "organizer": {"emailAddress": {"name": "Me", "address": "me@x.com"}},
            "attendees": attendees.iter().map(|(name, addr)| serde_json::json!(
                {"emailAddress": {"name": name, "address": addr}}
            )).collect::<Vec<_>>(),
            "isCancelled": false
        })
    }

    #[test]
    fn test_one_interaction_per_non_self_attendee() {
        let (out, resolver) = run(vec![event_json(
            "e1",
            "Pairing",
            &[("Me", "me@x.com"), ("Ana", "ana@x.com")],
        )]);
        assert_eq!(out.interactions.len(), 1);
        let i = &out.interactions[0];
        assert_eq!(
            resolver.key(i.person).email.as_deref(),
            Some("ana@x.com")
        );
        // User organised: outbound, and the count covers both attendees.
        assert_eq!(i.direction, Direction::Outbound);
        assert!(matches!(
            i.weight_inputs,
            WeightInputs::Calendar {
                attendee_count: 2,
                is_organizer: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cancelled_event_skipped() {
        let mut event = event_json("e1", "Pairing", &[("Ana", "ana@x.com")]);
        event["isCancelled"] = Value::Bool(true);
        let (out, _) = run(vec![event]);
        assert!(out.interactions.is_empty());
        assert_eq!(out.invalid, 0);
    }

    #[test]
    fn test_malformed_record_warns_and_continues() {
        let (out, _) = run(vec![
            serde_json::json!({"garbage": true}),
            event_json("e2", "Pairing", &[("Ana", "ana@x.com")]),
        ]);
        assert_eq!(out.invalid, 1);
        assert_eq!(out.total, 2);
        assert_eq!(out.interactions.len(), 1);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_external_organizer_is_counterparty_and_inbound() {
        let event = serde_json::json!({
            "id": "e3",
            "subject": "Review",
            "start": {"dateTime": "2026-08-18T10:00:00", "timeZone": "UTC"},
            "organizer": {"emailAddress": {"name": "Bo", "address": "bo@x.com"}},
            "attendees": [
                {"emailAddress": {"name": "Me", "address": "me@x.com"}}
            ],
            "responseStatus": {"response": "declined"}
        });
        let (out, resolver) = run(vec![event]);
        assert_eq!(out.interactions.len(), 1);
        let i = &out.interactions[0];
        assert_eq!(resolver.key(i.person).email.as_deref(), Some("bo@x.com"));
        assert_eq!(i.direction, Direction::Inbound);
        assert!(matches!(
            i.weight_inputs,
            WeightInputs::Calendar {
                response: ResponseStatus::Declined,
                attendee_count: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_old_event_outside_window_skipped() {
        let event = serde_json::json!({
            "id": "e4",
            "subject": "Ancient",
            "start": {"dateTime": "2025-01-01T10:00:00", "timeZone": "UTC"},
            "attendees": [{"emailAddress": {"name": "Ana", "address": "ana@x.com"}}]
        });
        let (out, _) = run(vec![event]);
        assert!(out.interactions.is_empty());
        assert_eq!(out.invalid, 0);
    }
}
