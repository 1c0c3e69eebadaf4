//! Meeting context classification for calendar interactions.
//!
//! Pattern priority: holiday/automated overrides everything, the
//! standing-recurring check overrides the plain size bucket, and the size
//! bucket is the fallback. Weights for each context come from config, not
//! from code.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{EngineConfig, Weights};
use crate::identity::normalize_email;
use crate::types::{MeetingContext, SizeBucket};

pub struct ContextClassifier {
    holiday_patterns: Vec<Regex>,
    automated_organizers: HashSet<String>,
    r_min: u32,
}

impl ContextClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            holiday_patterns: config
                .holiday_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            automated_organizers: config
                .automated_organizers
                .iter()
                .map(|e| normalize_email(e))
                .collect(),
            r_min: config.r_min,
        }
    }

    /// Classify one calendar event.
    ///
    /// `series_occurrences` is how many events with the same normalised
    /// subject appear in the payload, this one included; a recurrence only
    /// becomes "standing" once it has enough prior occurrences.
    pub fn classify(
        &self,
        attendee_count: u32,
        is_recurring: bool,
        subject: Option<&str>,
        organizer_email: Option<&str>,
        series_occurrences: u32,
    ) -> MeetingContext {
        if self.is_holiday_or_automated(subject, organizer_email) {
            return MeetingContext::HolidayOrAutomated;
        }

        let bucket = size_bucket(attendee_count);
        if is_recurring && series_occurrences.saturating_sub(1) >= self.r_min {
            return MeetingContext::StandingRecurring(bucket);
        }

        match bucket {
            SizeBucket::OneOnOne => MeetingContext::OneOnOne,
            SizeBucket::SmallGroup => MeetingContext::SmallGroup,
            SizeBucket::TeamMeeting => MeetingContext::TeamMeeting,
            SizeBucket::Broadcast => MeetingContext::Broadcast,
        }
    }

    fn is_holiday_or_automated(&self, subject: Option<&str>, organizer_email: Option<&str>) -> bool {
        if let Some(subject) = subject {
            if self.holiday_patterns.iter().any(|re| re.is_match(subject)) {
                return true;
            }
        }
        if let Some(email) = organizer_email {
            if self.automated_organizers.contains(&normalize_email(email)) {
                return true;
            }
        }
        false
    }
}

/// Attendee-count bucket, self included.
pub fn size_bucket(attendee_count: u32) -> SizeBucket {
    match attendee_count {
        0..=2 => SizeBucket::OneOnOne,
        3..=10 => SizeBucket::SmallGroup,
        11..=50 => SizeBucket::TeamMeeting,
        _ => SizeBucket::Broadcast,
    }
}

impl MeetingContext {
    /// The context weight scoring multiplies into a calendar contribution.
    pub fn weight(&self, w: &Weights) -> f64 {
        match self {
            Self::OneOnOne => w.one_on_one,
            Self::SmallGroup => w.small_group,
            Self::TeamMeeting => w.team_meeting,
            Self::Broadcast => w.broadcast,
            Self::StandingRecurring(bucket) => {
                let base = match bucket {
                    SizeBucket::OneOnOne => w.one_on_one,
                    SizeBucket::SmallGroup => w.small_group,
                    SizeBucket::TeamMeeting => w.team_meeting,
                    SizeBucket::Broadcast => w.broadcast,
                };
                base * w.standing_recurring_multiplier
            }
            Self::HolidayOrAutomated => 0.0,
        }
    }
}
