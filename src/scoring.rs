//! Multi-factor weighted scoring with temporal decay.
//!
//! Aggregates one person's interactions into a `PersonScore`: per-source
//! weighted contributions, uniform exponential decay from the run's `now`,
//! a compact evidence trace, and a confidence value. The caller hands in
//! interactions already sorted by (timestamp, source, raw_ref) so the fold
//! is reproducible to floating-point precision.

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::filter::Disposition;
use crate::types::{
    Interaction, InteractionSummary, PersonKey, PersonScore, ResponseStatus, ScoreFlag,
    ShareAudience, Source, SourceSubscores, WeightInputs,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

// Confidence blend. Policy constants: base per source count, direct
// evidence, and clearing the floor score.
const CONFIDENCE_BASE: f64 = 0.2;
const CONFIDENCE_PER_EXTRA_SOURCE: f64 = 0.15;
const CONFIDENCE_DIRECT: f64 = 0.25;
const CONFIDENCE_CLEARS_FLOOR: f64 = 0.2;

/// Undecayed base contribution of one interaction.
pub fn base_contribution(interaction: &Interaction, config: &EngineConfig) -> f64 {
    let w = &config.weights;
    match &interaction.weight_inputs {
        WeightInputs::Calendar {
            is_organizer,
            response,
            ..
        } => {
            let context_weight = interaction
                .context
                .map(|c| c.weight(w))
                .unwrap_or(0.0);
            let organizer_mult = if *is_organizer {
                w.organizer_multiplier
            } else {
                1.0
            };
            let response_mult = match response {
                ResponseStatus::Tentative | ResponseStatus::Declined => {
                    w.declined_response_multiplier
                }
                _ => 1.0,
            };
            context_weight * organizer_mult * response_mult
        }
        WeightInputs::Chat {
            messages_outbound,
            messages_inbound,
            is_one_on_one,
            has_attachments,
        } => {
            let mut score = *messages_outbound as f64 * w.chat_outbound_message
                + *messages_inbound as f64 * w.chat_inbound_message;
            if *is_one_on_one {
                score += w.chat_one_on_one_bonus;
            }
            if *has_attachments {
                score += w.chat_attachment_bonus;
            }
            score
        }
        WeightInputs::FileShare { audience, .. } => match audience {
            ShareAudience::Direct => w.share_direct,
            ShareAudience::SmallGroup => w.share_small_group,
            ShareAudience::Broadcast => w.share_broadcast,
        },
    }
}

/// Decay factor for an interaction at `timestamp`, seen from `now`.
/// Future timestamps (today's later meetings) clamp to age zero.
pub fn decay_factor(timestamp: DateTime<Utc>, now: DateTime<Utc>, config: &EngineConfig) -> f64 {
    let age_days = ((now - timestamp).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    (-age_days / config.decay_half_life_days).exp()
}

/// One interaction's decayed contribution.
pub fn contribution(
    interaction: &Interaction,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> f64 {
    base_contribution(interaction, config) * decay_factor(interaction.timestamp, now, config)
}

/// Direct evidence: a 1:1 meeting (standing included), an outbound chat,
/// or an outbound share to named recipients. Broadcast shares are
/// outbound but not named — they do not count.
pub fn is_direct_evidence(interaction: &Interaction) -> bool {
    match interaction.source {
        Source::Calendar => interaction
            .context
            .map(|c| c.is_one_on_one())
            .unwrap_or(false),
        Source::Chat => interaction.direction.is_outbound(),
        Source::FileShare => {
            interaction.direction.is_outbound()
                && !matches!(
                    interaction.weight_inputs,
                    WeightInputs::FileShare {
                        audience: ShareAudience::Broadcast,
                        ..
                    }
                )
        }
    }
}

pub fn has_direct_evidence(interactions: &[&Interaction]) -> bool {
    interactions.iter().any(|i| is_direct_evidence(i))
}

/// Aggregate one person's interactions into a `PersonScore`.
///
/// `disposition` must not be `Rejected` — rejected keys never reach
/// scoring. The soft-demotion multiplier is folded into each subscore so
/// that `final_score == subscores.sum()` holds exactly.
pub fn score_person(
    key: &PersonKey,
    interactions: &[&Interaction],
    disposition: Disposition,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Option<PersonScore> {
    if interactions.is_empty() {
        return None;
    }

    let multiplier = match disposition {
        Disposition::Candidate => 1.0,
        Disposition::SoftDemoted { multiplier } => multiplier,
        Disposition::Rejected(_) => return None,
    };

    let mut subscores = SourceSubscores::default();
    let mut first_seen = interactions[0].timestamp;
    let mut last_seen = interactions[0].timestamp;

    for interaction in interactions {
        let value = contribution(interaction, now, config) * multiplier;
        match interaction.source {
            Source::Calendar => subscores.calendar += value,
            Source::Chat => subscores.chat += value,
            Source::FileShare => subscores.file_share += value,
        }
        first_seen = first_seen.min(interaction.timestamp);
        last_seen = last_seen.max(interaction.timestamp);
    }

    let final_score = subscores.sum();
    let direct = has_direct_evidence(interactions);
    let confidence = confidence_of(final_score, &subscores, direct, config);

    let mut flags = Vec::new();
    let sources_present: Vec<Source> = {
        let mut s: Vec<Source> = interactions.iter().map(|i| i.source).collect();
        s.sort_unstable();
        s.dedup();
        s
    };
    if sources_present == [Source::Chat] {
        flags.push(ScoreFlag::ChatOnly);
    }
    if sources_present == [Source::FileShare] {
        flags.push(ScoreFlag::DocumentOnly);
    }
    if matches!(disposition, Disposition::SoftDemoted { .. }) {
        flags.push(ScoreFlag::SystemAccountSuspected);
    }
    if key.low_confidence_merge {
        flags.push(ScoreFlag::LowConfidenceIdentity);
    }

    Some(PersonScore {
        person: key.clone(),
        final_score,
        subscores,
        evidence: build_evidence(interactions, multiplier, now, config),
        first_seen,
        last_seen,
        confidence,
        flags,
    })
}

/// Confidence blend: sources exhibiting evidence, direct evidence
/// presence, and clearing the floor score. Strictly positive iff the
/// score is, and monotone non-decreasing under added direct evidence.
fn confidence_of(
    final_score: f64,
    subscores: &SourceSubscores,
    direct: bool,
    config: &EngineConfig,
) -> f64 {
    if final_score <= 0.0 {
        return 0.0;
    }
    let extra_sources = subscores.distinct_sources().saturating_sub(1) as f64;
    let mut confidence = CONFIDENCE_BASE + CONFIDENCE_PER_EXTRA_SOURCE * extra_sources;
    if direct {
        confidence += CONFIDENCE_DIRECT;
    }
    if final_score >= config.floor_score {
        confidence += CONFIDENCE_CLEARS_FLOOR;
    }
    confidence.min(1.0)
}

/// Top-K contributing interactions, deduplicated per (day, subject) to
/// keep the trace compact but explanatory. Every source with a positive
/// subscore keeps at least one entry — its best one — so no subscore is
/// left untraceable; the remaining slots fill by global contribution.
/// Subjects stay verbatim except for the configured length cap.
fn build_evidence(
    interactions: &[&Interaction],
    multiplier: f64,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<InteractionSummary> {
    let mut ranked: Vec<(&Interaction, f64)> = interactions
        .iter()
        .map(|i| (*i, contribution(i, now, config) * multiplier))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.timestamp.cmp(&a.0.timestamp))
            .then_with(|| a.0.raw_ref.cmp(&b.0.raw_ref))
    });

    let dedup_key = |i: &Interaction| {
        (
            i.timestamp.date_naive(),
            i.subject_hint.clone().unwrap_or_else(|| i.raw_ref.clone()),
        )
    };

    let mut seen = std::collections::HashSet::new();
    let mut covered = std::collections::HashSet::new();
    let mut selected: Vec<(&Interaction, f64)> = Vec::new();

    // First pass: the best positive entry of each source, so a small chat
    // or share subscore is not crowded out by a long run of meetings.
    for (interaction, value) in &ranked {
        if selected.len() >= config.evidence_k || *value <= 0.0 {
            break;
        }
        if covered.contains(&interaction.source) {
            continue;
        }
        if !seen.insert(dedup_key(interaction)) {
            continue;
        }
        covered.insert(interaction.source);
        selected.push((*interaction, *value));
    }
    // Second pass: fill remaining slots by global rank.
    for (interaction, value) in &ranked {
        if selected.len() >= config.evidence_k {
            break;
        }
        if !seen.insert(dedup_key(interaction)) {
            continue;
        }
        selected.push((*interaction, *value));
    }
    selected.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.timestamp.cmp(&a.0.timestamp))
            .then_with(|| a.0.raw_ref.cmp(&b.0.raw_ref))
    });

    selected
        .into_iter()
        .map(|(interaction, value)| InteractionSummary {
            timestamp: interaction.timestamp,
            source: interaction.source,
            direction: interaction.direction,
            subject: interaction
                .subject_hint
                .as_deref()
                .map(|s| truncate_chars(s, config.evidence_subject_max_len)),
            context: interaction.context.map(|c| c.label().to_string()),
            contribution: value,
            raw_ref: interaction.raw_ref.clone(),
        })
        .collect()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}
