use ulid::Ulid;

use crate::limits::*;
use crate::model::{operating_hours, DaySchedule, Reservation, ReservationRequest, TimeWindow};

use super::BookingError;

/// `start < end`, checked before anything touches persistent state.
pub(crate) fn validate_range(window: &TimeWindow) -> Result<(), BookingError> {
    if window.start >= window.end {
        return Err(BookingError::InvalidRange);
    }
    Ok(())
}

pub(crate) fn validate_hours(window: &TimeWindow) -> Result<(), BookingError> {
    let hours = operating_hours();
    if window.start < hours.start || window.end > hours.end {
        return Err(BookingError::OutOfHours);
    }
    Ok(())
}

pub(crate) fn validate_request(req: &ReservationRequest) -> Result<(), BookingError> {
    validate_range(&req.window)?;
    validate_hours(&req.window)?;
    if req.requester.is_empty() || req.requester.len() > MAX_REQUESTER_LEN {
        return Err(BookingError::LimitExceeded("requester id length"));
    }
    if let Some(ref notes) = req.notes
        && notes.len() > MAX_NOTES_LEN {
            return Err(BookingError::LimitExceeded("notes too long"));
        }
    Ok(())
}

/// First confirmed reservation overlapping `window`, ignoring `exclude`
/// (so an update never conflicts with itself). Cancelled and completed
/// rows never count.
pub(crate) fn find_conflict<'a>(
    day: &'a DaySchedule,
    window: &TimeWindow,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    day.overlapping(window)
        .find(|r| r.status.is_confirmed() && exclude != Some(r.id))
}

pub(crate) fn check_no_conflict(
    day: &DaySchedule,
    window: &TimeWindow,
    exclude: Option<Ulid>,
) -> Result<(), BookingError> {
    if let Some(existing) = find_conflict(day, window, exclude) {
        return Err(BookingError::Conflict {
            with: existing.id,
            window: existing.window,
        });
    }
    Ok(())
}
