//! File-share signal extraction.
//!
//! Only outbound shares count: the user choosing to share a document with
//! named recipients is strong collaboration intent. An inbound share
//! (someone sharing with the user) says nothing about the user's intent
//! and is dropped without comment.

use serde_json::Value;

use crate::error::{EngineError, Warning};
use crate::identity::PersonRef;
use crate::payload::FileShareRecord;
use crate::types::{Direction, Interaction, ShareAudience, Source, WeightInputs};

use super::{dedup_interactions, ExtractContext, ExtractorOutput};

pub fn extract_file_shares(
    records: &[Value],
    ctx: &mut ExtractContext<'_>,
) -> Result<ExtractorOutput, EngineError> {
    let mut out = ExtractorOutput::default();
    let mut interactions = Vec::new();

    for raw in records {
        ctx.check_deadline("file share extraction")?;
        out.total += 1;

        let share: FileShareRecord = match serde_json::from_value(raw.clone()) {
            Ok(share) => share,
            Err(e) => {
                out.invalid += 1;
                out.warnings.push(Warning::invalid_record("file_share", e));
                continue;
            }
        };

        if share.inbound {
            continue;
        }
        if !ctx.in_window(share.shared_at) {
            continue;
        }

        let audience = audience_of(&share);
        let file_name = share.file_name.clone().unwrap_or_default();

        for recipient in &share.shared_with {
            let reference = PersonRef::new(
                recipient.id.clone(),
                recipient.email.clone(),
                recipient.display_name.clone(),
            );
            let Some(person) = ctx.resolver.resolve(&reference) else {
                continue;
            };
            interactions.push(Interaction {
                person,
                source: Source::FileShare,
                timestamp: share.shared_at,
                direction: Direction::Outbound,
                weight_inputs: WeightInputs::FileShare {
                    audience,
                    file_name: file_name.clone(),
                },
                subject_hint: share.file_name.clone(),
                raw_ref: share.file_id.clone(),
                duplicate_count: 0,
                context: None,
            });
        }
    }

    out.interactions = dedup_interactions(interactions);
    Ok(out)
}

/// Audience bucket: the explicit shareType wins, else the audience size,
/// else the recipient count.
fn audience_of(share: &FileShareRecord) -> ShareAudience {
    match share.share_type.as_deref() {
        Some("direct") => return ShareAudience::Direct,
        Some("small_group") => return ShareAudience::SmallGroup,
        Some("broadcast") => return ShareAudience::Broadcast,
        _ => {}
    }
    let size = share
        .audience_size
        .unwrap_or(share.shared_with.len() as u32);
    match size {
        0 | 1 => ShareAudience::Direct,
        2..=10 => ShareAudience::SmallGroup,
        _ => ShareAudience::Broadcast,
    }
}
