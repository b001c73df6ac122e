use chrono::{NaiveDate, TimeDelta};
use ulid::Ulid;

use crate::model::{close_time, open_time, Slot, TimeWindow};

use super::{BookingError, Engine};

pub const DEFAULT_SLOT_MINUTES: u32 = 30;

/// Walk the operating-hours window in fixed-width steps, marking each
/// slot booked iff a confirmed window overlaps it. Runs over one
/// pre-fetched snapshot — no per-slot store queries.
pub fn mark_slots(confirmed: &[TimeWindow], granularity_minutes: u32) -> Vec<Slot> {
    let step = TimeDelta::minutes(granularity_minutes as i64);
    let close = close_time();
    let mut slots = Vec::new();
    let mut cursor = open_time();

    loop {
        let (end, wrapped) = cursor.overflowing_add_signed(step);
        // Only emit the slot if its end does not exceed closing time.
        if wrapped != 0 || end <= cursor || end > close {
            break;
        }
        let window = TimeWindow::new(cursor, end);
        let booked = confirmed.iter().any(|w| w.overlaps(&window));
        slots.push(Slot {
            start: window.start,
            end: window.end,
            booked,
        });
        cursor = end;
    }

    slots
}

impl Engine {
    /// Availability grid for one facility/date. One schedule read up
    /// front; every slot is tested against that snapshot.
    pub async fn slot_grid(
        &self,
        facility_id: Ulid,
        date: NaiveDate,
        granularity_minutes: u32,
    ) -> Result<Vec<Slot>, BookingError> {
        if granularity_minutes == 0 {
            return Err(BookingError::InvalidRange);
        }
        if self.get_facility(&facility_id).is_none() {
            return Err(BookingError::NotFound(facility_id));
        }

        let confirmed = match self.day_arc(&(facility_id, date)) {
            Some(day) => day.read().await.confirmed_windows(),
            None => Vec::new(),
        };
        Ok(mark_slots(&confirmed, granularity_minutes))
    }
}
