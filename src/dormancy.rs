//! Dormancy analysis: partition collaborators by how long they have been
//! quiet, and recommend a re-engagement tier.
//!
//! Thresholds are policy (30/60/90 days by default), not natural law.
//! Persons with zero interactions in the window never reach this stage —
//! they were never collaborators in scope.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::types::{ActionTier, DormancyAnnotation, DormancyStatus, Interaction, Source};

/// Annotate one person from their most recent interaction.
pub fn annotate(
    last_seen: DateTime<Utc>,
    last_source: Source,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> DormancyAnnotation {
    let days = (now - last_seen).num_days().max(0);
    let t = &config.thresholds;

    let status = if days < t.cooling {
        DormancyStatus::Active
    } else if days < t.dormant {
        DormancyStatus::Cooling
    } else if days < t.high_risk {
        DormancyStatus::Dormant
    } else {
        DormancyStatus::HighRisk
    };

    let recommended_action_tier = match status {
        DormancyStatus::Active => {
            // A recently touched relationship needs no nudge.
            (days >= config.touch_base_min_days).then_some(ActionTier::TouchBase)
        }
        DormancyStatus::Cooling => Some(ActionTier::TouchBase),
        DormancyStatus::Dormant => Some(ActionTier::Reconnect),
        DormancyStatus::HighRisk => Some(ActionTier::UrgentMeeting),
    };

    DormancyAnnotation {
        status,
        days_since_last_interaction: days,
        last_interaction_source: last_source,
        recommended_action_tier,
    }
}

/// The interaction that counts as "last contact": latest timestamp, with
/// (source, raw_ref) as deterministic tie-breaks.
pub fn last_interaction<'a>(interactions: &[&'a Interaction]) -> Option<&'a Interaction> {
    interactions.iter().copied().max_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.raw_ref.cmp(&b.raw_ref))
    })
}
