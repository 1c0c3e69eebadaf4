//! System-account filtering: human collaborator candidate vs
//! automated/bulk/system actor.
//!
//! Pure pattern + ratio rules, no AI. The filter fails closed (rejects)
//! only on strong signals — silently dropping a real collaborator is the
//! primary observed failure mode, so anything short of a hard trigger is
//! at most soft-demoted and stays in the candidate pool with a reduced
//! score.

use regex::Regex;

use crate::config::EngineConfig;
use crate::identity::normalize_name;
use crate::types::{Interaction, MeetingContext, PersonKey, Source};

/// Why a key was rejected, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// Display name carries a blocklisted token.
    BlocklistToken,
    /// Too large a share of interactions classified holiday/automated.
    AutomatedRatio,
    /// Every piece of evidence is an inbound broadcast.
    InboundBroadcastOnly,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlocklistToken => "blocklist_token",
            Self::AutomatedRatio => "automated_ratio",
            Self::InboundBroadcastOnly => "inbound_broadcast_only",
        }
    }
}

/// Filter verdict for one person.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition {
    Candidate,
    /// Kept, but every subscore is multiplied by this factor (< 1).
    SoftDemoted { multiplier: f64 },
    Rejected(RejectionReason),
}

pub struct SystemAccountFilter {
    blocklist: Vec<String>,
    dl_patterns: Vec<Regex>,
    n_min_auto: u32,
    p_auto: f64,
    demotion: f64,
}

impl SystemAccountFilter {
    /// Build from validated config. Patterns that fail to compile were
    /// already rejected by `EngineConfig::validate`, so they are skipped
    /// here rather than propagated.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            blocklist: config
                .blocklist_tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            dl_patterns: config
                .dl_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            n_min_auto: config.n_min_auto,
            p_auto: config.p_auto,
            demotion: config.system_account_demotion,
        }
    }

    /// Classify one person given all of their interactions for the run.
    pub fn classify(&self, key: &PersonKey, interactions: &[&Interaction]) -> Disposition {
        if let Some(name) = key.display_name.as_deref() {
            if self.name_hits_blocklist(name) {
                log::debug!("rejecting {:?}: blocklisted name token", key.label());
                return Disposition::Rejected(RejectionReason::BlocklistToken);
            }
        }

        let total = interactions.len() as u32;
        if total >= self.n_min_auto && self.n_min_auto > 0 {
            let automated = interactions
                .iter()
                .filter(|i| i.context == Some(MeetingContext::HolidayOrAutomated))
                .count() as f64;
            if automated / total as f64 >= self.p_auto {
                log::debug!(
                    "rejecting {:?}: {automated} of {total} interactions automated",
                    key.label()
                );
                return Disposition::Rejected(RejectionReason::AutomatedRatio);
            }
        }

        if !interactions.is_empty() && self.all_inbound_broadcast(interactions) {
            return Disposition::Rejected(RejectionReason::InboundBroadcastOnly);
        }

        if let Some(name) = key.display_name.as_deref() {
            if self.dl_patterns.iter().any(|re| re.is_match(name)) {
                return Disposition::SoftDemoted {
                    multiplier: self.demotion,
                };
            }
        }

        Disposition::Candidate
    }

    /// Whole-token match against the normalised display name, with
    /// punctuation treated as separators ("HR Notifications Bot",
    /// "svc-deploy", "Team.Calendar").
    fn name_hits_blocklist(&self, name: &str) -> bool {
        let normalised = normalize_name(name);
        normalised
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|t| !t.is_empty())
            .any(|token| {
                self.blocklist.iter().any(|b| b == token)
                    || token
                        .split('-')
                        .any(|part| self.blocklist.iter().any(|b| b == part))
            })
    }

    fn all_inbound_broadcast(&self, interactions: &[&Interaction]) -> bool {
        interactions.iter().all(|i| {
            !i.direction.is_outbound()
                && i.source == Source::Calendar
                && i.context.map(|c| c.is_broadcast()).unwrap_or(false)
        })
    }
}
