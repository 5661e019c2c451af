use chrono::{Days, NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn validate_stay(stay: &StaySpan) -> Result<(), EngineError> {
    if stay.start >= stay.end {
        return Err(EngineError::InvalidRange("check-in must precede check-out"));
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Authoring-time policy bounds for rule ranges, relative to `today`.
/// Business policy, not a correctness invariant.
pub fn validate_rule_range(range: &DateRange, today: NaiveDate) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::InvalidRange(
            "rule range start must precede its end",
        ));
    }
    if let Some(horizon) = today.checked_sub_days(Days::new(RULE_MAX_PAST_DAYS as u64))
        && range.end < horizon {
            return Err(EngineError::LimitExceeded(
                "rule range ends more than a year in the past",
            ));
        }
    if let Some(horizon) = today.checked_add_days(Days::new(RULE_MAX_FUTURE_DAYS as u64))
        && range.start > horizon {
            return Err(EngineError::LimitExceeded(
                "rule range starts more than five years out",
            ));
        }
    Ok(())
}

/// Decide whether a candidate rate rule may be persisted on a room.
///
/// Conflict iff an existing rule (other than `exclude`, the candidate's
/// own id on updates) has an intersecting date range, a matching channel
/// (exact, or either side unset), and at least one shared weekday. Since
/// a general rule spans all seven weekdays, it collides with every other
/// rule on overlapping dates — which is what keeps the "at most one
/// general rule per night" assumption true.
pub fn check_rule_conflict(
    room: &RoomState,
    candidate: &RateRule,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for existing in &room.rules {
        if existing.id == candidate.id || Some(existing.id) == exclude {
            continue;
        }
        if existing.range.intersects(&candidate.range)
            && existing.channel_conflicts_with(candidate.channel)
            && existing.weekdays.intersects(&candidate.weekdays)
        {
            return Err(EngineError::RuleConflict(existing.id));
        }
    }
    Ok(())
}
