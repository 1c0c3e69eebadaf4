//! Chat signal extraction.
//!
//! Each thread summary becomes one `Interaction` per non-self participant,
//! dated at the last message. Metadata only — message bodies never reach
//! the engine.

use serde_json::Value;

use crate::error::{EngineError, Warning};
use crate::identity::PersonRef;
use crate::payload::ChatThreadRecord;
use crate::types::{Direction, Interaction, Source, WeightInputs};

use super::{dedup_interactions, ExtractContext, ExtractorOutput};

pub fn extract_chat(
    records: &[Value],
    ctx: &mut ExtractContext<'_>,
) -> Result<ExtractorOutput, EngineError> {
    let mut out = ExtractorOutput::default();
    let mut interactions = Vec::new();

    for raw in records {
        ctx.check_deadline("chat extraction")?;
        out.total += 1;

        let thread: ChatThreadRecord = match serde_json::from_value(raw.clone()) {
            Ok(thread) => thread,
            Err(e) => {
                out.invalid += 1;
                out.warnings.push(Warning::invalid_record("chat", e));
                continue;
            }
        };

        if !ctx.in_window(thread.last_message_at) {
            continue;
        }
        if thread.message_count == 0 {
            // An empty thread carries no interaction evidence.
            continue;
        }

        let messages_outbound = thread.sent_by_user_count.min(thread.message_count);
        let messages_inbound = thread.message_count - messages_outbound;
        let direction = match (messages_outbound, messages_inbound) {
            (0, _) => Direction::Inbound,
            (_, 0) => Direction::Outbound,
            _ => Direction::Bidirectional,
        };

        for member in &thread.members {
            let reference = PersonRef::new(
                member.id.clone(),
                member.email.clone(),
                member.display_name.clone(),
            );
            let Some(person) = ctx.resolver.resolve(&reference) else {
                continue;
            };
            interactions.push(Interaction {
                person,
                source: Source::Chat,
                timestamp: thread.last_message_at,
                direction,
                weight_inputs: WeightInputs::Chat {
                    messages_outbound,
                    messages_inbound,
                    is_one_on_one: thread.is_one_on_one(),
                    has_attachments: thread.has_attachments,
                },
                subject_hint: None,
                raw_ref: thread.thread_id.clone(),
                duplicate_count: 0,
                context: None,
            });
        }
    }

    out.interactions = dedup_interactions(interactions);
    Ok(out)
}
