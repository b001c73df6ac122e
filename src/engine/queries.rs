use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Facility, Reservation, TimeWindow};

use super::conflict::{find_conflict, validate_range};
use super::{BookingError, Engine, SharedDaySchedule};

impl Engine {
    pub fn get_facility(&self, id: &Ulid) -> Option<Facility> {
        self.facilities.get(id).map(|e| e.value().clone())
    }

    pub fn list_facilities(&self) -> Vec<Facility> {
        let mut out: Vec<Facility> = self
            .facilities
            .iter()
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// True iff no confirmed reservation overlaps the window. The range
    /// is validated and the facility resolved before any schedule read,
    /// so bad input and unknown facilities fail with the clearer error.
    pub async fn check_availability(
        &self,
        facility_id: Ulid,
        date: NaiveDate,
        window: TimeWindow,
    ) -> Result<bool, BookingError> {
        validate_range(&window)?;
        if !self.facilities.contains_key(&facility_id) {
            return Err(BookingError::NotFound(facility_id));
        }
        let Some(day) = self.day_arc(&(facility_id, date)) else {
            return Ok(true);
        };
        let guard = day.read().await;
        Ok(find_conflict(&guard, &window, None).is_none())
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Result<Reservation, BookingError> {
        let key = self.day_key_of(id).ok_or(BookingError::NotFound(*id))?;
        let day = self.day_arc(&key).ok_or(BookingError::NotFound(*id))?;
        let guard = day.read().await;
        guard.get(id).cloned().ok_or(BookingError::NotFound(*id))
    }

    /// Every reservation regardless of status — the history view.
    /// Most recent first: date descending, then start time descending.
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        self.collect_reservations(|_| true).await
    }

    pub async fn list_reservations_by_requester(&self, requester: &str) -> Vec<Reservation> {
        self.collect_reservations(|r| r.requester == requester).await
    }

    async fn collect_reservations<F>(&self, keep: F) -> Vec<Reservation>
    where
        F: Fn(&Reservation) -> bool,
    {
        let days: Vec<SharedDaySchedule> =
            self.days.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for day in days {
            let guard = day.read().await;
            out.extend(guard.iter().filter(|r| keep(r)).cloned());
        }
        out.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(b.window.start.cmp(&a.window.start))
        });
        out
    }
}
