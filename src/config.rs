//! Runtime policy configuration.
//!
//! Every tunable the engine honours lives here: scoring weights, decay,
//! dormancy thresholds, blocklists, and cache policy. Algorithm versioning
//! lives in this struct, not in code paths — two deployments that disagree
//! about weights run the same engine with different `EngineConfig` values.
//!
//! All values carry defaults, so `EngineConfig::default()` is a complete,
//! valid policy. Out-of-range values are rejected by `validate()` before
//! any extraction happens.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Dormancy day thresholds. Policy, not natural law.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DormancyThresholds {
    /// Below this many days since last interaction: active.
    pub cooling: i64,
    pub dormant: i64,
    pub high_risk: i64,
}

impl Default for DormancyThresholds {
    fn default() -> Self {
        Self {
            cooling: 30,
            dormant: 60,
            high_risk: 90,
        }
    }
}

/// Scoring weights for all three sources plus the context multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weights {
    // Calendar context weights
    pub one_on_one: f64,
    pub small_group: f64,
    pub team_meeting: f64,
    pub broadcast: f64,
    /// Standing recurring meetings keep their size weight, discounted.
    pub standing_recurring_multiplier: f64,
    /// Applied when the user organised the meeting.
    pub organizer_multiplier: f64,
    /// Applied when the user declined or answered tentative.
    pub declined_response_multiplier: f64,

    // Chat
    pub chat_outbound_message: f64,
    pub chat_inbound_message: f64,
    pub chat_one_on_one_bonus: f64,
    pub chat_attachment_bonus: f64,

    // Outbound file shares
    pub share_direct: f64,
    pub share_small_group: f64,
    pub share_broadcast: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            one_on_one: 25.0,
            small_group: 6.0,
            team_meeting: 2.0,
            broadcast: 0.5,
            standing_recurring_multiplier: 0.6,
            organizer_multiplier: 1.5,
            declined_response_multiplier: 0.3,
            chat_outbound_message: 2.0,
            chat_inbound_message: 0.8,
            chat_one_on_one_bonus: 5.0,
            chat_attachment_bonus: 2.0,
            share_direct: 15.0,
            share_small_group: 10.0,
            share_broadcast: 1.0,
        }
    }
}

/// Complete engine policy. Deserializable from JSON so a wrapping CLI or
/// service can load it from a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Interaction lookback window in days.
    pub window_days: u32,
    /// τ in the decay factor `exp(-age_days / τ)`.
    pub decay_half_life_days: f64,
    pub thresholds: DormancyThresholds,
    /// An active relationship only gets a touch-base nudge after this
    /// many quiet days.
    pub touch_base_min_days: i64,
    pub weights: Weights,

    /// Display-name tokens that mark an account as automated/bulk/system.
    /// Matched case-insensitively against whole tokens of the name.
    pub blocklist_tokens: Vec<String>,
    /// Regex patterns for distribution-list style names. Matching names
    /// are kept but soft-demoted.
    pub dl_patterns: Vec<String>,
    /// Regex patterns marking holiday/automated meeting subjects.
    pub holiday_patterns: Vec<String>,
    /// Organiser emails known to be automated (room systems, schedulers).
    pub automated_organizers: Vec<String>,
    /// Subscore multiplier for soft-demoted accounts. In (0, 1).
    pub system_account_demotion: f64,

    /// Minimum interactions before the automated-ratio rule can reject.
    pub n_min_auto: u32,
    /// Fraction of holiday/automated interactions that triggers rejection.
    pub p_auto: f64,
    /// Prior same-subject occurrences before a recurrence counts as a
    /// standing meeting.
    pub r_min: u32,
    /// Fraction of invalid records at which a source is treated as absent.
    pub p_bad: f64,

    /// Maximum evidence entries retained per person.
    pub evidence_k: usize,
    /// Evidence subject text is truncated to this many characters.
    pub evidence_subject_max_len: usize,
    pub top_n_active: usize,
    /// Minimum score for membership in the output partitions.
    pub floor_score: f64,
    /// Cached results older than this are recomputed.
    pub cache_max_age_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            decay_half_life_days: 60.0,
            thresholds: DormancyThresholds::default(),
            touch_base_min_days: 14,
            weights: Weights::default(),
            blocklist_tokens: default_blocklist_tokens(),
            dl_patterns: default_dl_patterns(),
            holiday_patterns: default_holiday_patterns(),
            automated_organizers: Vec::new(),
            system_account_demotion: 0.25,
            n_min_auto: 3,
            p_auto: 0.7,
            r_min: 3,
            p_bad: 0.5,
            evidence_k: 8,
            evidence_subject_max_len: 120,
            top_n_active: 20,
            floor_score: 20.0,
            cache_max_age_hours: 24,
        }
    }
}

fn default_blocklist_tokens() -> Vec<String> {
    [
        "bot",
        "noreply",
        "no-reply",
        "donotreply",
        "automated",
        "notifications",
        "notification",
        "holidays",
        "holiday",
        "calendar",
        "scheduler",
        "mailer-daemon",
        "svc",
        "system",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dl_patterns() -> Vec<String> {
    [
        r"(?i)^(dl|dg|all|grp|group|team|dept)[-_. ]",
        r"(?i)\b(distribution|everyone|all[- ]hands|shared mailbox)\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_holiday_patterns() -> Vec<String> {
    [
        r"(?i)\b(public )?holiday\b",
        r"(?i)\bout of office\b",
        r"(?i)\booo\b",
        r"(?i)\bbirthday\b",
        r"(?i)\bwork anniversary\b",
        r"(?i)\boffice closed\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl EngineConfig {
    /// Check every policy value. Fatal at engine construction, before any
    /// extraction — a run never starts with a half-valid policy.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window_days == 0 {
            return Err(EngineError::Config("window_days must be positive".into()));
        }
        if !(self.decay_half_life_days.is_finite() && self.decay_half_life_days > 0.0) {
            return Err(EngineError::Config(format!(
                "decay_half_life_days must be a positive number, got {}",
                self.decay_half_life_days
            )));
        }
        let t = &self.thresholds;
        if !(0 < t.cooling && t.cooling < t.dormant && t.dormant < t.high_risk) {
            return Err(EngineError::Config(format!(
                "dormancy thresholds must be strictly increasing and positive, got {}/{}/{}",
                t.cooling, t.dormant, t.high_risk
            )));
        }
        if self.touch_base_min_days < 0 {
            return Err(EngineError::Config(
                "touch_base_min_days must not be negative".into(),
            ));
        }
        self.validate_weights()?;
        if !(0.0..=1.0).contains(&self.p_auto) {
            return Err(EngineError::Config(format!(
                "p_auto must be within [0, 1], got {}",
                self.p_auto
            )));
        }
        if !(self.p_bad > 0.0 && self.p_bad <= 1.0) {
            return Err(EngineError::Config(format!(
                "p_bad must be within (0, 1], got {}",
                self.p_bad
            )));
        }
        if !(self.system_account_demotion > 0.0 && self.system_account_demotion < 1.0) {
            return Err(EngineError::Config(format!(
                "system_account_demotion must be within (0, 1), got {}",
                self.system_account_demotion
            )));
        }
        if self.evidence_k == 0 {
            return Err(EngineError::Config("evidence_k must be positive".into()));
        }
        if self.top_n_active == 0 {
            return Err(EngineError::Config("top_n_active must be positive".into()));
        }
        if !(self.floor_score.is_finite() && self.floor_score >= 0.0) {
            return Err(EngineError::Config(format!(
                "floor_score must not be negative, got {}",
                self.floor_score
            )));
        }
        if self.cache_max_age_hours < 0 {
            return Err(EngineError::Config(
                "cache_max_age_hours must not be negative".into(),
            ));
        }
        for pattern in self.dl_patterns.iter().chain(&self.holiday_patterns) {
            regex::Regex::new(pattern).map_err(|e| {
                EngineError::Config(format!("invalid pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }

    fn validate_weights(&self) -> Result<(), EngineError> {
        let w = &self.weights;
        let named = [
            ("one_on_one", w.one_on_one),
            ("small_group", w.small_group),
            ("team_meeting", w.team_meeting),
            ("broadcast", w.broadcast),
            ("standing_recurring_multiplier", w.standing_recurring_multiplier),
            ("organizer_multiplier", w.organizer_multiplier),
            ("declined_response_multiplier", w.declined_response_multiplier),
            ("chat_outbound_message", w.chat_outbound_message),
            ("chat_inbound_message", w.chat_inbound_message),
            ("chat_one_on_one_bonus", w.chat_one_on_one_bonus),
            ("chat_attachment_bonus", w.chat_attachment_bonus),
            ("share_direct", w.share_direct),
            ("share_small_group", w.share_small_group),
            ("share_broadcast", w.share_broadcast),
        ];
        for (name, value) in named {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::Config(format!(
                    "weights.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
