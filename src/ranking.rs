//! Final ranking, output assembly, and the input fingerprint.
//!
//! Active collaborators are sorted by (score desc, last seen desc, name
//! asc) and capped at top-N; the dormant list keeps everyone above the
//! floor score who has gone quiet. The fingerprint is a stable SHA-256
//! over the normalised interaction stream, so semantically-equal inputs
//! hash identically whatever order the payloads arrived in.

use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::types::{
    DormancyAnnotation, DormancyStatus, Interaction, PersonKey, PersonScore, RankedEntry,
    WeightInputs,
};

/// One fully annotated person, ready for ranking.
pub struct ScoredPerson {
    pub score: PersonScore,
    pub dormancy: DormancyAnnotation,
    pub direct_evidence: bool,
}

/// Split scored persons into the active and dormant output lists.
pub fn rank(
    mut people: Vec<ScoredPerson>,
    config: &EngineConfig,
) -> (Vec<RankedEntry>, Vec<RankedEntry>) {
    people.sort_by(|a, b| {
        b.score
            .final_score
            .partial_cmp(&a.score.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.score.last_seen.cmp(&a.score.last_seen))
            .then_with(|| name_key(&a.score.person).cmp(&name_key(&b.score.person)))
    });

    let mut active = Vec::new();
    let mut dormant = Vec::new();

    for person in people {
        if person.score.final_score < config.floor_score {
            continue;
        }
        match person.dormancy.status {
            DormancyStatus::Active => {
                // Membership in active[] additionally demands direct
                // evidence: broadcast-only contact never ranks.
                if person.direct_evidence && active.len() < config.top_n_active {
                    active.push(RankedEntry {
                        score: person.score,
                        dormancy: person.dormancy,
                    });
                }
            }
            _ => dormant.push(RankedEntry {
                score: person.score,
                dormancy: person.dormancy,
            }),
        }
    }

    (active, dormant)
}

fn name_key(person: &PersonKey) -> String {
    person.label().to_lowercase()
}

/// Stable hash over the normalised interaction stream. Each line carries
/// the canonical person identity (never the run-local id), so two runs
/// over shuffled payloads produce the same fingerprint. Every
/// score-bearing field is folded in — a changed response status, message
/// count, or share audience must change the fingerprint, or the cache
/// would serve a stale score for semantically different inputs.
pub fn input_fingerprint(interactions: &[Interaction], keys: &[PersonKey]) -> String {
    let mut lines: Vec<String> = interactions
        .iter()
        .map(|i| {
            let person = &keys[i.person.index()];
            format!(
                "{}|{}|{}|{:?}|{}|{}|{}|{}",
                i.timestamp.to_rfc3339(),
                i.source.as_str(),
                person
                    .email
                    .as_deref()
                    .or(person.upstream_id.as_deref())
                    .unwrap_or(person.label()),
                i.direction,
                i.subject_hint.as_deref().unwrap_or(""),
                i.raw_ref,
                weight_inputs_key(&i.weight_inputs),
                i.duplicate_count,
            )
        })
        .collect();
    lines.sort_unstable();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Canonical text form of an interaction's score-bearing inputs.
fn weight_inputs_key(inputs: &WeightInputs) -> String {
    match inputs {
        WeightInputs::Calendar {
            attendee_count,
            is_organizer,
            response,
            is_recurring,
            duration_minutes,
        } => format!(
            "cal:{attendee_count},{},{:?},{},{duration_minutes}",
            *is_organizer as u8, response, *is_recurring as u8
        ),
        WeightInputs::Chat {
            messages_outbound,
            messages_inbound,
            is_one_on_one,
            has_attachments,
        } => format!(
            "chat:{messages_outbound},{messages_inbound},{},{}",
            *is_one_on_one as u8, *has_attachments as u8
        ),
        WeightInputs::FileShare { audience, file_name } => {
            format!("share:{audience:?},{file_name}")
        }
    }
}
