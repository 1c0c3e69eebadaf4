//! Core data model for the collaborator discovery engine.
//!
//! Everything the pipeline passes between stages lives here: canonical
//! person identities, interaction events, meeting contexts, per-person
//! scores, dormancy annotations, and the final ranked result. Wire-facing
//! types serialize as camelCase JSON; engine-internal handles
//! (`PersonId`, `Interaction`) never leave the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Warning;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Dense per-run handle for a canonical person. Assigned by the identity
/// resolver; stable for the duration of one run. Merges reuse the surviving
/// key's id — ids are never reassigned, so an `Interaction` minted before a
/// merge still points at the right person afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonId(pub(crate) u32);

impl PersonId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Canonical identity of a person, reconciled across calendar, chat, and
/// file-sharing references. At most one `PersonKey` per human per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonKey {
    /// Upstream directory object id, when any source carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    /// Normalised email: lower-cased, trimmed. The local part is never
    /// altered (no plus-tag stripping — that would cross-attribute).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Best-effort display name, as last seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// True if this key ever absorbed a name-only reference (rule 3 merge).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_confidence_merge: bool,
}

impl PersonKey {
    /// Label used in sorts and logs: name, else email, else upstream id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.upstream_id.as_deref())
            .unwrap_or("(unknown)")
    }
}

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

/// Which upstream source produced an interaction. Ordering matters: the
/// normalised interaction stream sorts by (timestamp, source, raw_ref).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Calendar,
    Chat,
    FileShare,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Chat => "chat",
            Self::FileShare => "file_share",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
    Bidirectional,
}

impl Direction {
    /// Outbound or bidirectional — the user actively reached out.
    pub fn is_outbound(&self) -> bool {
        matches!(self, Self::Outbound | Self::Bidirectional)
    }
}

/// Calendar response status of the current user, as far as the payload says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseStatus {
    #[default]
    None,
    Accepted,
    Tentative,
    Declined,
}

/// Audience bucket of an outbound file share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAudience {
    Direct,
    SmallGroup,
    Broadcast,
}

/// Source-specific raw inputs to scoring. Extractors fill these; the
/// scoring engine turns them into weighted contributions.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightInputs {
    Calendar {
        attendee_count: u32,
        is_organizer: bool,
        response: ResponseStatus,
        is_recurring: bool,
        duration_minutes: u32,
    },
    Chat {
        messages_outbound: u32,
        messages_inbound: u32,
        is_one_on_one: bool,
        has_attachments: bool,
    },
    FileShare {
        audience: ShareAudience,
        file_name: String,
    },
}

/// One unit of evidence: the current user interacted with `person` once,
/// through one source, at one instant. Immutable once extracted.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub person: PersonId,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub weight_inputs: WeightInputs,
    /// Short subject text, used only for classification and dedup — the
    /// engine never analyses message content.
    pub subject_hint: Option<String>,
    /// Opaque handle back to the source record, for audit only.
    pub raw_ref: String,
    /// Near-identical records collapsed into this one (same counterparty,
    /// day, and subject).
    pub duplicate_count: u32,
    /// Meeting context, attached by the context classifier. Calendar only.
    pub context: Option<MeetingContext>,
}

impl Interaction {
    /// Sort key for the normalised stream: scoring is a pure fold over
    /// this order, which keeps floating-point sums reproducible.
    pub fn stream_key(&self) -> (DateTime<Utc>, Source, &str) {
        (self.timestamp, self.source, &self.raw_ref)
    }
}

// ---------------------------------------------------------------------------
// Meeting context
// ---------------------------------------------------------------------------

/// Size bucket of a calendar event, by attendee count (including self).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    /// Exactly two attendees.
    OneOnOne,
    /// Up to 10 attendees.
    SmallGroup,
    /// 11–50 attendees.
    TeamMeeting,
    /// More than 50 attendees — near-zero collaboration signal.
    Broadcast,
}

/// Classification of a calendar interaction, attached by the context
/// classifier and consumed by scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingContext {
    OneOnOne,
    SmallGroup,
    TeamMeeting,
    Broadcast,
    /// Recurring series with the same subject seen repeatedly; keeps the
    /// size weight but discounted.
    StandingRecurring(SizeBucket),
    /// Holiday calendars, room bookings, automated organisers. Zero weight.
    HolidayOrAutomated,
}

impl MeetingContext {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OneOnOne => "one_on_one",
            Self::SmallGroup => "small_group",
            Self::TeamMeeting => "team_meeting",
            Self::Broadcast => "broadcast",
            Self::StandingRecurring(_) => "standing_recurring",
            Self::HolidayOrAutomated => "holiday_or_automated",
        }
    }

    /// True for a 1:1, including a standing 1:1 — direct evidence either way.
    pub fn is_one_on_one(&self) -> bool {
        matches!(
            self,
            Self::OneOnOne | Self::StandingRecurring(SizeBucket::OneOnOne)
        )
    }

    /// True when this calendar evidence is broadcast-shaped.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::Broadcast | Self::StandingRecurring(SizeBucket::Broadcast)
        )
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Per-source decayed score sums. The system-account demotion multiplier
/// is applied inside each subscore, so `final_score == sum()` holds exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSubscores {
    pub calendar: f64,
    pub chat: f64,
    pub file_share: f64,
}

impl SourceSubscores {
    pub fn sum(&self) -> f64 {
        self.calendar + self.chat + self.file_share
    }

    /// Number of sources with a positive subscore.
    pub fn distinct_sources(&self) -> u32 {
        [self.calendar, self.chat, self.file_share]
            .iter()
            .filter(|s| **s > 0.0)
            .count() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFlag {
    /// Evidence from chat only.
    ChatOnly,
    /// Evidence from file shares only.
    DocumentOnly,
    /// Matched a distribution-list pattern; score soft-demoted.
    SystemAccountSuspected,
    /// Identity includes a name-only merge.
    LowConfidenceIdentity,
}

/// One evidence entry in a person's trace: the top contributing
/// interactions, deduplicated per (day, subject). Subjects are preserved
/// verbatim for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSummary {
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Decayed contribution of this interaction to the final score.
    pub contribution: f64,
    pub raw_ref: String,
}

/// Aggregated score for one candidate collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonScore {
    pub person: PersonKey,
    pub final_score: f64,
    pub subscores: SourceSubscores,
    pub evidence: Vec<InteractionSummary>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// 0–1. Strictly positive iff `final_score > 0`; monotone in added
    /// direct evidence.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ScoreFlag>,
}

// ---------------------------------------------------------------------------
// Dormancy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DormancyStatus {
    Active,
    Cooling,
    Dormant,
    HighRisk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTier {
    TouchBase,
    Reconnect,
    UrgentMeeting,
}

/// Re-engagement annotation computed from the last interaction timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DormancyAnnotation {
    pub status: DormancyStatus,
    pub days_since_last_interaction: i64,
    pub last_interaction_source: Source,
    /// Absent for active relationships touched within the last two weeks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action_tier: Option<ActionTier>,
}

// ---------------------------------------------------------------------------
// Engine output
// ---------------------------------------------------------------------------

/// One ranked person: score plus dormancy annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    #[serde(flatten)]
    pub score: PersonScore,
    pub dormancy: DormancyAnnotation,
}

/// The engine's output record. Produced fresh per run, written once,
/// read many times; later runs supersede rather than mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_days: u32,
    /// Stable hash over the normalised interaction stream — the cache
    /// equivalence key across semantically-equal inputs.
    pub input_fingerprint: String,
    pub active: Vec<RankedEntry>,
    pub dormant: Vec<RankedEntry>,
    /// Every degraded condition from the run. Silent data loss is not
    /// an option: skipped records always leave a trace here.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscores_sum_and_sources() {
        let s = SourceSubscores {
            calendar: 10.0,
            chat: 0.0,
            file_share: 5.0,
        };
        assert_eq!(s.sum(), 15.0);
        assert_eq!(s.distinct_sources(), 2);
    }

    #[test]
    fn test_context_one_on_one_includes_standing() {
        assert!(MeetingContext::OneOnOne.is_one_on_one());
        assert!(MeetingContext::StandingRecurring(SizeBucket::OneOnOne).is_one_on_one());
        assert!(!MeetingContext::SmallGroup.is_one_on_one());
    }

    #[test]
    fn test_source_ordering_is_stable() {
        // Stream ordering depends on this: calendar < chat < file_share.
        assert!(Source::Calendar < Source::Chat);
        assert!(Source::Chat < Source::FileShare);
    }

    #[test]
    fn test_person_key_label_fallback() {
        let key = PersonKey {
            email: Some("a@b.c".into()),
            ..Default::default()
        };
        assert_eq!(key.label(), "a@b.c");
        assert_eq!(PersonKey::default().label(), "(unknown)");
    }
}
