use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Shape-only checks: ordering and width. Used for calendar windows, which
/// may reach into the past.
pub(crate) fn validate_window(range: &DateRange) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::InvalidRange("end date must be after start date"));
    }
    if range.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Checks a stay request: ordered, not in the past, bounded length and lead time.
/// Every failure is `InvalidRange`, for booking and availability alike.
pub(crate) fn validate_range(range: &DateRange, today: NaiveDate) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::InvalidRange("check-out must be after check-in"));
    }
    if range.start < today {
        return Err(EngineError::InvalidRange("check-in is in the past"));
    }
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::InvalidRange("stay too long"));
    }
    if (range.start - today).num_days() > MAX_ADVANCE_DAYS {
        return Err(EngineError::InvalidRange("check-in too far ahead"));
    }
    Ok(())
}

/// Fails with `Conflict` naming the first active reservation that overlaps
/// `range`. `exclude` skips the caller's own reservation.
pub(crate) fn check_no_conflict(
    ls: &ListingState,
    range: &DateRange,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match ls
        .overlapping(range)
        .find(|r| Some(r.booking_id) != exclude)
    {
        Some(r) => Err(EngineError::Conflict(r.booking_id)),
        None => Ok(()),
    }
}
